// Filter agent: classifies each detected text as worth translating
// (dialogue, narration, signs) or not (sound effects, watermarks, UI
// chrome). Biased toward KEEP: anything ambiguous stays in the chapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::agents::batch::BatchAgent;
use crate::agents::extract_json;
use crate::core::errors::AgentError;
use crate::core::types::{FilterDecision, FilterOutcome};
use crate::services::chat::ChatModel;

const SYSTEM_PROMPT: &str = "\
You are a manhwa localization assistant. You receive text snippets detected \
by OCR on comic panels and decide which ones a translator should handle.

KEEP: dialogue, narration, inner monologue, signs and labels that carry story \
meaning, chapter titles.
DROP: onomatopoeia and sound effects, scanlation watermarks, site URLs, page \
numbers, UI chrome, OCR garbage with no language content.

The `position` field tells you where on the page the snippet sits; \
watermarks and credits cluster at the very top and bottom.

When unsure, answer KEEP. Respond with JSON only, no prose.";

/// One snippet for classification: the detected text plus its vertical
/// position band on the canvas.
#[derive(Debug, Clone)]
pub struct FilterItem {
    pub text: String,
    pub position: &'static str,
}

impl FilterItem {
    /// Band the region by the vertical position of its center.
    pub fn new(text: impl Into<String>, y_center: i32, canvas_height: u32) -> Self {
        let third = (canvas_height / 3).max(1) as i32;
        let position = if y_center < third {
            "top"
        } else if y_center < 2 * third {
            "middle"
        } else {
            "bottom"
        };
        Self {
            text: text.into(),
            position,
        }
    }
}

pub struct FilterAgent {
    chat: Arc<dyn ChatModel>,
}

impl FilterAgent {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    fn batch_prompt(items: &[(usize, &FilterItem)]) -> String {
        let listing: Vec<Value> = items
            .iter()
            .map(|(id, item)| json!({ "id": id, "text": item.text, "position": item.position }))
            .collect();
        format!(
            "Classify each snippet. Reply with a JSON array of \
             {{\"id\", \"decision\" (KEEP or DROP), \"category\", \
             \"confidence\" (0.0-1.0), \"reasoning\"}} objects, one per \
             snippet, using the same ids.\n\n{}",
            Value::Array(listing)
        )
    }

    fn parse_element(element: &Value) -> Option<(usize, FilterOutcome)> {
        let id = element.get("id")?.as_u64()? as usize;
        Some((id, Self::outcome_from(element)))
    }

    /// Lenient per-element parse. A recognizable id with a garbled body
    /// still yields an outcome, and that outcome is KEEP.
    fn outcome_from(element: &Value) -> FilterOutcome {
        let decision = match element
            .get("decision")
            .and_then(Value::as_str)
            .map(str::to_uppercase)
            .as_deref()
        {
            Some("KEEP") => FilterDecision::Keep,
            Some("DROP") => FilterDecision::Drop,
            other => {
                warn!(?other, "unrecognized filter decision, keeping region");
                return FilterOutcome::keep("unrecognized decision in response");
            }
        };
        FilterOutcome {
            decision,
            category: element
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            confidence: element
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.5) as f32,
            reasoning: element
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[async_trait]
impl BatchAgent for FilterAgent {
    type Item = FilterItem;
    type Outcome = FilterOutcome;

    fn agent_name(&self) -> &'static str {
        "filter"
    }

    fn fallback_outcome(&self, _item: &FilterItem, note: &str) -> FilterOutcome {
        FilterOutcome::keep(note)
    }

    async fn submit_batch(
        &self,
        items: &[(usize, &FilterItem)],
    ) -> Result<Vec<(usize, FilterOutcome)>, AgentError> {
        let response = self
            .chat
            .complete(SYSTEM_PROMPT, &Self::batch_prompt(items))
            .await?;

        let payload = extract_json(&response, '[', ']')
            .ok_or_else(|| AgentError::MalformedResponse("no JSON array in response".into()))?;
        let elements: Vec<Value> = serde_json::from_str(payload)
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        Ok(elements.iter().filter_map(Self::parse_element).collect())
    }

    async fn submit_single(&self, item: &FilterItem) -> Result<FilterOutcome, AgentError> {
        let prompt = format!(
            "Classify this snippet. Reply with one JSON object \
             {{\"decision\" (KEEP or DROP), \"category\", \"confidence\", \
             \"reasoning\"}}.\n\n{}",
            json!({ "text": item.text, "position": item.position })
        );
        let response = self.chat.complete(SYSTEM_PROMPT, &prompt).await?;

        let payload = extract_json(&response, '{', '}')
            .ok_or_else(|| AgentError::MalformedResponse("no JSON object in response".into()))?;
        let element: Value = serde_json::from_str(payload)
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        Ok(Self::outcome_from(&element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::batch::run_with_fallback;
    use crate::core::config::AgentConfig;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct ScriptedChat {
        responses: Mutex<Vec<Result<String, AgentError>>>,
    }

    impl ScriptedChat {
        fn new(responses: Vec<Result<String, AgentError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, AgentError> {
            self.responses.lock().remove(0)
        }
    }

    fn items(texts: &[&str]) -> Vec<FilterItem> {
        texts
            .iter()
            .map(|t| FilterItem::new(*t, 500, 1000))
            .collect()
    }

    fn config() -> AgentConfig {
        AgentConfig {
            chunk_size: 5,
            chunk_pause: Duration::ZERO,
            context_window: 3,
            target_language: "English".to_string(),
        }
    }

    #[test]
    fn position_bands_split_the_canvas_in_thirds() {
        assert_eq!(FilterItem::new("a", 100, 900).position, "top");
        assert_eq!(FilterItem::new("a", 450, 900).position, "middle");
        assert_eq!(FilterItem::new("a", 880, 900).position, "bottom");
    }

    #[tokio::test]
    async fn classifies_a_clean_batch() {
        let chat = ScriptedChat::new(vec![Ok(r#"[
            {"id": 0, "decision": "KEEP", "category": "dialogue", "confidence": 0.95, "reasoning": "speech bubble"},
            {"id": 1, "decision": "DROP", "category": "sfx", "confidence": 0.9, "reasoning": "onomatopoeia"}
        ]"#
        .to_string())]);
        let agent = FilterAgent::new(chat);

        let out = run_with_fallback(&agent, &items(&["안녕하세요", "쿠르릉"]), &config()).await;

        assert_eq!(out[0].outcome.decision, FilterDecision::Keep);
        assert_eq!(out[1].outcome.decision, FilterDecision::Drop);
        assert_eq!(out[1].outcome.category, "sfx");
    }

    #[tokio::test]
    async fn garbled_decision_keeps_the_region() {
        let chat = ScriptedChat::new(vec![Ok(
            r#"[{"id": 0, "decision": "MAYBE", "category": "x"}]"#.to_string()
        )]);
        let agent = FilterAgent::new(chat);

        let out = run_with_fallback(&agent, &items(&["text"]), &config()).await;
        assert_eq!(out[0].outcome.decision, FilterDecision::Keep);
    }

    #[tokio::test]
    async fn prose_only_batch_falls_back_to_singles_then_keep() {
        let chat = ScriptedChat::new(vec![
            Ok("I can't classify these, sorry!".to_string()),
            Ok(r#"{"decision": "DROP", "category": "watermark", "confidence": 0.8, "reasoning": "url"}"#.to_string()),
        ]);
        let agent = FilterAgent::new(chat);

        let out =
            run_with_fallback(&agent, &items(&["scans.example.com"]), &config()).await;
        assert_eq!(out[0].outcome.decision, FilterDecision::Drop);
    }

    #[tokio::test]
    async fn total_failure_defaults_every_region_to_keep() {
        let chat = ScriptedChat::new(vec![
            Err(AgentError::MalformedResponse("boom".into())),
            Err(AgentError::MalformedResponse("boom".into())),
            Err(AgentError::MalformedResponse("boom".into())),
        ]);
        let agent = FilterAgent::new(chat);

        let out = run_with_fallback(&agent, &items(&["a", "b"]), &config()).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| o.outcome.decision == FilterDecision::Keep));
        assert!(out.iter().all(|o| o.degraded));
    }
}
