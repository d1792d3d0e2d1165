// Translation agent: turns kept source-language texts into the target
// language, with neighboring lines supplied as context so pronouns and
// tone survive the batch boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::batch::{run_with_fallback, BatchAgent};
use crate::agents::extract_json;
use crate::core::config::AgentConfig;
use crate::core::errors::AgentError;
use crate::core::types::TranslationOutcome;
use crate::services::chat::ChatModel;
use crate::services::memo::TranslationMemo;

/// One text to translate plus its reading-order neighbors.
#[derive(Debug, Clone)]
pub struct TranslationItem {
    pub text: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Build translation items from texts in reading order, attaching up to
/// `window` neighbors on each side.
pub fn build_items(texts: &[String], window: usize) -> Vec<TranslationItem> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| TranslationItem {
            text: text.clone(),
            before: texts[i.saturating_sub(window)..i].to_vec(),
            after: texts[i + 1..(i + 1 + window).min(texts.len())].to_vec(),
        })
        .collect()
}

/// Ordered outcomes for one `translate_all` call, plus how many of them
/// are passthrough fallbacks rather than model answers.
#[derive(Debug, Clone)]
pub struct TranslationRun {
    pub outcomes: Vec<TranslationOutcome>,
    pub fallback_count: usize,
}

pub struct TranslatorAgent {
    chat: Arc<dyn ChatModel>,
    target_language: String,
}

impl TranslatorAgent {
    pub fn new(chat: Arc<dyn ChatModel>, target_language: impl Into<String>) -> Self {
        Self {
            chat,
            target_language: target_language.into(),
        }
    }

    /// Translate `texts` in reading order, consulting the memo first and
    /// recording fresh translations back into it. Only memo misses reach
    /// the chat model, and only real model answers are memoized; a
    /// passthrough fallback stays out of the memo so the text is retried
    /// on the next run.
    pub async fn translate_all(
        &self,
        texts: &[String],
        memo: &TranslationMemo,
        config: &AgentConfig,
    ) -> TranslationRun {
        let items = build_items(texts, config.context_window);

        let mut outcomes: Vec<Option<TranslationOutcome>> = items
            .iter()
            .map(|item| memo.get(&item.text, &self.target_language))
            .collect();
        let misses: Vec<usize> = (0..items.len())
            .filter(|&i| outcomes[i].is_none())
            .collect();
        let miss_items: Vec<TranslationItem> =
            misses.iter().map(|&i| items[i].clone()).collect();

        let fresh = run_with_fallback(self, &miss_items, config).await;
        let mut fallback_count = 0;
        for (&i, delivery) in misses.iter().zip(fresh) {
            if delivery.degraded {
                fallback_count += 1;
            } else {
                memo.put(&items[i].text, &self.target_language, delivery.outcome.clone());
            }
            outcomes[i] = Some(delivery.outcome);
        }

        let outcomes = outcomes
            .into_iter()
            .zip(&items)
            .map(|(outcome, item)| {
                outcome.unwrap_or_else(|| {
                    TranslationOutcome::passthrough(&item.text, "no outcome delivered")
                })
            })
            .collect();
        TranslationRun {
            outcomes,
            fallback_count,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a professional comic translator working into {lang}. \
             Translate each snippet naturally, keeping honorifics readable \
             and matching the register of the surrounding lines. The \
             `before` and `after` fields are context only, never translate \
             them. Respond with JSON only, no prose.",
            lang = self.target_language
        )
    }

    fn batch_prompt(&self, items: &[(usize, &TranslationItem)]) -> String {
        let listing: Vec<Value> = items
            .iter()
            .map(|(id, item)| {
                json!({
                    "id": id,
                    "text": item.text,
                    "before": item.before,
                    "after": item.after,
                })
            })
            .collect();
        format!(
            "Translate each `text` into {lang}. Reply with a JSON array of \
             {{\"id\", \"translated\", \"tone\", \"notes\"}} objects using \
             the same ids.\n\n{listing}",
            lang = self.target_language,
            listing = Value::Array(listing)
        )
    }

    fn parse_element(element: &Value) -> Option<(usize, TranslationOutcome)> {
        let id = element.get("id")?.as_u64()? as usize;
        let translated = element.get("translated")?.as_str()?;
        if translated.trim().is_empty() {
            return None;
        }
        Some((
            id,
            TranslationOutcome {
                translated: translated.to_string(),
                tone: element
                    .get("tone")
                    .and_then(Value::as_str)
                    .unwrap_or("neutral")
                    .to_string(),
                notes: element
                    .get("notes")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        ))
    }
}

#[async_trait]
impl BatchAgent for TranslatorAgent {
    type Item = TranslationItem;
    type Outcome = TranslationOutcome;

    fn agent_name(&self) -> &'static str {
        "translator"
    }

    fn fallback_outcome(&self, item: &TranslationItem, note: &str) -> TranslationOutcome {
        TranslationOutcome::passthrough(&item.text, note)
    }

    async fn submit_batch(
        &self,
        items: &[(usize, &TranslationItem)],
    ) -> Result<Vec<(usize, TranslationOutcome)>, AgentError> {
        let response = self
            .chat
            .complete(&self.system_prompt(), &self.batch_prompt(items))
            .await?;

        let payload = extract_json(&response, '[', ']')
            .ok_or_else(|| AgentError::MalformedResponse("no JSON array in response".into()))?;
        let elements: Vec<Value> = serde_json::from_str(payload)
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        Ok(elements.iter().filter_map(Self::parse_element).collect())
    }

    async fn submit_single(&self, item: &TranslationItem) -> Result<TranslationOutcome, AgentError> {
        let prompt = format!(
            "Translate this `text` into {lang}. Reply with one JSON object \
             {{\"translated\", \"tone\", \"notes\"}}.\n\n{}",
            json!({ "text": item.text, "before": item.before, "after": item.after }),
            lang = self.target_language
        );
        let response = self.chat.complete(&self.system_prompt(), &prompt).await?;

        let payload = extract_json(&response, '{', '}')
            .ok_or_else(|| AgentError::MalformedResponse("no JSON object in response".into()))?;
        let element: Value = serde_json::from_str(payload)
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        let translated = element
            .get("translated")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AgentError::MalformedResponse("missing translated field".into()))?;

        Ok(TranslationOutcome {
            translated: translated.to_string(),
            tone: element
                .get("tone")
                .and_then(Value::as_str)
                .unwrap_or("neutral")
                .to_string(),
            notes: element
                .get("notes")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}
