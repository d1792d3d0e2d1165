// End-to-end pipeline runs against scripted collaborators: a fake OCR
// service and chat model, the real inpainter and stages, and a no-op
// renderer. No network, no fonts, no external processes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use parking_lot::Mutex;

use manhwa_translate::core::config::{
    AcquireConfig, AgentConfig, Config, InpaintConfig, LlmConfig, MemoConfig, OcrConfig,
    RenderConfig, SplitConfig,
};
use manhwa_translate::orchestration::{Pipeline, RunInput, RunStatus, Stage, StageArtifact};
use manhwa_translate::services::NeighborFillInpainter;
use manhwa_translate::stages::layout_solver::Layout;
use manhwa_translate::{
    AgentError, ChatModel, OcrEngine, OcrError, PipelineError, Rect, RenderError, TextRegion,
    TextRenderer, ValidationError,
};

fn test_config() -> Config {
    Config {
        log_level: tracing::Level::INFO,
        llm: LlmConfig {
            api_base: "http://unused.invalid".to_string(),
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            max_retries: 0,
            request_timeout: Duration::from_secs(5),
        },
        ocr: OcrConfig {
            endpoint: "http://unused.invalid".to_string(),
            confidence_threshold: 0.6,
        },
        split: SplitConfig {
            max_subpanels: 100,
            min_margin_from_text: 50,
            min_whitespace_height: 20,
            white_row_fraction: 0.95,
            white_luma_cutoff: 240,
        },
        agent: AgentConfig {
            chunk_size: 5,
            chunk_pause: Duration::ZERO,
            context_window: 3,
            target_language: "English".to_string(),
        },
        acquire: AcquireConfig {
            download_retries: 1,
            download_timeout: Duration::from_secs(5),
            max_concurrent_downloads: 2,
        },
        inpaint: InpaintConfig {
            mask_dilation: 2,
            fill_passes: 8,
        },
        render: RenderConfig {
            font_dir: "fonts".to_string(),
            size_multiplier: 0.8,
            min_font_size: 12,
            max_font_size: 100,
            stroke_width: 2,
        },
        memo: MemoConfig { max_entries: 100 },
    }
}

/// Serves a scripted region list for the first detect call (the full
/// canvas pass) and another for every later call (the per-slice pass).
struct FakeOcr {
    calls: Mutex<usize>,
    pass1: Vec<TextRegion>,
    pass2: Vec<TextRegion>,
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<TextRegion>, OcrError> {
        let mut calls = self.calls.lock();
        *calls += 1;
        if *calls == 1 {
            Ok(self.pass1.clone())
        } else {
            Ok(self.pass2.clone())
        }
    }
}

/// Routes on the system prompt: filter requests get classification JSON,
/// translation requests get translation JSON.
struct FakeChat {
    filter_response: Result<String, String>,
    translate_response: Result<String, String>,
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, system: &str, _user: &str) -> Result<String, AgentError> {
        let scripted = if system.contains("localization assistant") {
            &self.filter_response
        } else {
            &self.translate_response
        };
        scripted
            .clone()
            .map_err(AgentError::MalformedResponse)
    }
}

struct NoopRenderer {
    drawn: Mutex<Vec<String>>,
}

#[async_trait]
impl TextRenderer for NoopRenderer {
    async fn draw_region(
        &self,
        _img: &mut RgbaImage,
        _region: &TextRegion,
        layout: &Layout,
    ) -> Result<(), RenderError> {
        self.drawn.lock().push(layout.lines.join(" "));
        Ok(())
    }
}

fn white_panel_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("manhwa-it-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let panel = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        200,
        300,
        Rgba([255, 255, 255, 255]),
    ));
    panel.save(dir.join("001.png")).unwrap();
    dir
}

fn out_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("manhwa-out-{name}-{}", std::process::id()))
}

fn region(y: i32, text: &str) -> TextRegion {
    TextRegion::from_rect(Rect::new(40, y, 80, 30), text, 0.9)
}

fn make_pipeline(ocr: FakeOcr, chat: FakeChat) -> (Pipeline, Arc<NoopRenderer>) {
    let renderer = Arc::new(NoopRenderer {
        drawn: Mutex::new(Vec::new()),
    });
    let pipeline = Pipeline::new(
        Arc::new(test_config()),
        Arc::new(ocr),
        Arc::new(chat),
        Arc::new(NeighborFillInpainter::new(8)),
        Arc::clone(&renderer) as Arc<dyn TextRenderer>,
    );
    (pipeline, renderer)
}

#[tokio::test]
async fn full_run_translates_kept_regions_and_writes_outputs() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![region(100, "안녕하세요"), region(200, "쿠르릉")],
        pass2: vec![region(100, "안녕하세요"), region(200, "쿠르릉")],
    };
    let chat = FakeChat {
        filter_response: Ok(r#"[
            {"id": 0, "decision": "KEEP", "category": "dialogue", "confidence": 0.95, "reasoning": "speech"},
            {"id": 1, "decision": "DROP", "category": "sfx", "confidence": 0.9, "reasoning": "rumble"}
        ]"#
        .to_string()),
        translate_response: Ok(
            r#"[{"id": 0, "translated": "Hello there", "tone": "casual", "notes": ""}]"#
                .to_string(),
        ),
    };
    let (pipeline, renderer) = make_pipeline(ocr, chat);

    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stages);
    let pipeline = pipeline.with_progress(Box::new(move |stage, percent, _| {
        seen.lock().push((stage, percent));
    }));

    let panels = white_panel_dir("full");
    let out = out_dir("full");
    let outcome = pipeline
        .run(RunInput {
            chapter_url: None,
            document: Some(panels.clone()),
            output_dir: out.clone(),
        })
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.artifacts.regions().len(), 2);
    assert_eq!(outcome.artifacts.coord_map().len(), 1);
    assert_eq!(outcome.artifacts.coord_map()[0].y_end, 300);
    assert_eq!(outcome.artifacts.output_dir(), Some(out.as_path()));

    // Reading order: the y=100 dialogue first, then the y=200 sfx.
    let regions = outcome.artifacts.regions();
    let dialogue = &regions[0];
    let sfx = &regions[1];
    assert!(dialogue.is_kept());
    assert_eq!(
        dialogue.translation.as_ref().unwrap().translated,
        "Hello there"
    );
    assert!(!sfx.is_kept());
    assert!(sfx.translation.is_none());

    // Only the kept region was drawn.
    assert_eq!(renderer.drawn.lock().join(" "), "Hello there");

    // Progress is monotone and ends at 100.
    let seen = stages.lock();
    assert_eq!(seen.first().unwrap().0, Stage::Init);
    assert_eq!(seen.last().unwrap().0, Stage::Complete);
    for pair in seen.windows(2) {
        assert!(pair[0].1 <= pair[1].1);
    }
    drop(seen);

    // Outputs landed on disk.
    assert!(out.join("panel_000.png").is_file());
    assert!(out.join("canvas.png").is_file());
    let records = std::fs::read_to_string(out.join("regions.json")).unwrap();
    assert!(records.contains("Hello there"));
    assert!(records.contains("쿠르릉"));

    let _ = std::fs::remove_dir_all(panels);
    let _ = std::fs::remove_dir_all(out);
}

#[tokio::test]
async fn chat_model_outage_degrades_to_keep_and_passthrough() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![region(100, "원문 텍스트")],
        pass2: vec![region(100, "원문 텍스트")],
    };
    let chat = FakeChat {
        filter_response: Err("model down".to_string()),
        translate_response: Err("model down".to_string()),
    };
    let (pipeline, _renderer) = make_pipeline(ocr, chat);

    let panels = white_panel_dir("outage");
    let out = out_dir("outage");
    let outcome = pipeline
        .run(RunInput {
            chapter_url: None,
            document: Some(panels.clone()),
            output_dir: out.clone(),
        })
        .await;

    // Agent failures never fail the run.
    assert_eq!(outcome.status, RunStatus::Complete);
    let region = &outcome.artifacts.regions()[0];
    assert!(region.is_kept());
    assert_eq!(region.translation.as_ref().unwrap().translated, "원문 텍스트");
    assert_eq!(outcome.timings.counter("filter_fallbacks"), 1);
    assert_eq!(outcome.timings.counter("translation_fallbacks"), 1);

    let _ = std::fs::remove_dir_all(panels);
    let _ = std::fs::remove_dir_all(out);
}

#[tokio::test]
async fn chapter_with_no_text_completes_without_agent_calls() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![],
        pass2: vec![],
    };
    let chat = FakeChat {
        filter_response: Err("must not be called".to_string()),
        translate_response: Err("must not be called".to_string()),
    };
    let (pipeline, renderer) = make_pipeline(ocr, chat);

    let panels = white_panel_dir("empty");
    let out = out_dir("empty");
    let outcome = pipeline
        .run(RunInput {
            chapter_url: None,
            document: Some(panels.clone()),
            output_dir: out.clone(),
        })
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    assert!(outcome.artifacts.regions().is_empty());
    assert!(renderer.drawn.lock().is_empty());
    assert!(out.join("canvas.png").is_file());

    let _ = std::fs::remove_dir_all(panels);
    let _ = std::fs::remove_dir_all(out);
}

/// Fails every draw, standing in for a machine with no usable fonts.
struct BrokenRenderer;

#[async_trait]
impl TextRenderer for BrokenRenderer {
    async fn draw_region(
        &self,
        _img: &mut RgbaImage,
        _region: &TextRegion,
        _layout: &Layout,
    ) -> Result<(), RenderError> {
        Err(RenderError::NoFonts("fonts".to_string()))
    }
}

#[tokio::test]
async fn render_failure_keeps_artifacts_from_completed_stages() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![region(100, "안녕하세요")],
        pass2: vec![region(100, "안녕하세요")],
    };
    let chat = FakeChat {
        filter_response: Ok(
            r#"[{"id": 0, "decision": "KEEP", "category": "dialogue", "confidence": 0.95, "reasoning": "speech"}]"#
                .to_string(),
        ),
        translate_response: Ok(
            r#"[{"id": 0, "translated": "Hello there", "tone": "casual", "notes": ""}]"#
                .to_string(),
        ),
    };
    let pipeline = Pipeline::new(
        Arc::new(test_config()),
        Arc::new(ocr),
        Arc::new(chat),
        Arc::new(NeighborFillInpainter::new(8)),
        Arc::new(BrokenRenderer),
    );

    let panels = white_panel_dir("render-fail");
    let out = out_dir("render-fail");
    let outcome = pipeline
        .run(RunInput {
            chapter_url: None,
            document: Some(panels.clone()),
            output_dir: out.clone(),
        })
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    match &outcome.error {
        Some(PipelineError::Stage { stage, .. }) => assert_eq!(*stage, "render"),
        other => panic!("expected render stage error, got {other:?}"),
    }

    // Everything committed before render survives the failure: the
    // inpainted canvas, the translated regions, and the coordinate map.
    match outcome.artifacts.get(Stage::Inpaint.name()) {
        Some(StageArtifact::Canvas(canvas)) => {
            assert_eq!(canvas.height(), 300);
        }
        other => panic!("expected inpainted canvas, got {other:?}"),
    }
    let region = &outcome.artifacts.regions()[0];
    assert_eq!(region.translation.as_ref().unwrap().translated, "Hello there");
    assert_eq!(outcome.artifacts.coord_map().len(), 1);
    // Nothing was composed, so there is no output artifact.
    assert!(outcome.artifacts.output_dir().is_none());
    assert!(outcome.artifacts.get(Stage::Render.name()).is_none());

    let _ = std::fs::remove_dir_all(panels);
}

#[tokio::test]
async fn missing_input_fails_validation() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![],
        pass2: vec![],
    };
    let chat = FakeChat {
        filter_response: Ok("[]".to_string()),
        translate_response: Ok("[]".to_string()),
    };
    let (pipeline, _renderer) = make_pipeline(ocr, chat);

    let outcome = pipeline
        .run(RunInput {
            chapter_url: None,
            document: None,
            output_dir: out_dir("missing"),
        })
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(matches!(
        outcome.error,
        Some(PipelineError::Validation(ValidationError::MissingInput))
    ));
}

#[tokio::test]
async fn ambiguous_input_fails_validation() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![],
        pass2: vec![],
    };
    let chat = FakeChat {
        filter_response: Ok("[]".to_string()),
        translate_response: Ok("[]".to_string()),
    };
    let (pipeline, _renderer) = make_pipeline(ocr, chat);

    let outcome = pipeline
        .run(RunInput {
            chapter_url: Some("https://reader.example.com/ch1".to_string()),
            document: Some(PathBuf::from("/somewhere")),
            output_dir: out_dir("ambiguous"),
        })
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(matches!(
        outcome.error,
        Some(PipelineError::Validation(ValidationError::AmbiguousInput))
    ));
}

#[tokio::test]
async fn unreadable_document_fails_in_acquire() {
    let ocr = FakeOcr {
        calls: Mutex::new(0),
        pass1: vec![],
        pass2: vec![],
    };
    let chat = FakeChat {
        filter_response: Ok("[]".to_string()),
        translate_response: Ok("[]".to_string()),
    };
    let (pipeline, _renderer) = make_pipeline(ocr, chat);

    let outcome = pipeline
        .run(RunInput {
            chapter_url: None,
            document: Some(PathBuf::from("/definitely/not/here")),
            output_dir: out_dir("acquire-fail"),
        })
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    match outcome.error {
        Some(PipelineError::Stage { stage, .. }) => assert_eq!(stage, "acquire"),
        other => panic!("expected acquire stage error, got {other:?}"),
    }
}
