// Pipeline orchestrator: drives one chapter through acquire, stitch,
// detect, split, filter, translate, inpaint, render, and compose.
//
// The orchestrator owns stage sequencing, progress reporting, and error
// wrapping; all real work lives in the stages and services it calls.
// CPU-heavy image work runs on the blocking pool so the async runtime
// stays responsive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::join_all;
use image::DynamicImage;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::agents::batch::run_with_fallback;
use crate::agents::filter::{FilterAgent, FilterItem};
use crate::agents::translator::TranslatorAgent;
use crate::core::config::Config;
use crate::core::errors::{PipelineError, ValidationError};
use crate::core::types::{CoordinateSpan, TextRegion};
use crate::services::chat::ChatModel;
use crate::services::inpaint::Inpainter;
use crate::services::memo::TranslationMemo;
use crate::services::ocr::OcrEngine;
use crate::services::panel_source::{DirectoryPanelSource, HttpPanelSource, PanelSource};
use crate::services::renderer::TextRenderer;
use crate::stages::{composer, layout_solver, mask_builder, smart_split, stitcher};
use crate::utils::image_ops;
use crate::utils::metrics::RunTimings;

const OCR_FANOUT: usize = 4;

/// Pipeline stages in execution order. Progress percentages are fixed per
/// stage so observers see monotone progress whatever each stage costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Acquire,
    Stitch,
    OcrPass1,
    Split,
    OcrPass2,
    Filter,
    Translate,
    Inpaint,
    Render,
    Compose,
    Complete,
    Error,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Acquire => "acquire",
            Stage::Stitch => "stitch",
            Stage::OcrPass1 => "ocr_pass1",
            Stage::Split => "split",
            Stage::OcrPass2 => "ocr_pass2",
            Stage::Filter => "filter",
            Stage::Translate => "translate",
            Stage::Inpaint => "inpaint",
            Stage::Render => "render",
            Stage::Compose => "compose",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }

    pub fn progress(&self) -> f32 {
        match self {
            Stage::Init => 0.0,
            Stage::Acquire => 15.0,
            Stage::Stitch => 25.0,
            Stage::OcrPass1 => 35.0,
            Stage::Split => 45.0,
            Stage::OcrPass2 => 55.0,
            Stage::Filter => 65.0,
            Stage::Translate => 75.0,
            Stage::Inpaint => 85.0,
            Stage::Render => 90.0,
            Stage::Compose => 95.0,
            Stage::Complete => 100.0,
            Stage::Error => 100.0,
        }
    }
}

/// Synchronous progress observer: stage, percent, human-readable detail.
pub type ProgressFn = Box<dyn Fn(Stage, f32, &str) + Send + Sync>;

/// One chapter to process: exactly one of `chapter_url` or `document`.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub chapter_url: Option<String>,
    pub document: Option<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    Failed,
}

/// Payload a stage commits when it completes.
#[derive(Debug, Clone)]
pub enum StageArtifact {
    Panels { count: usize },
    Stitched {
        canvas: DynamicImage,
        coord_map: Vec<CoordinateSpan>,
    },
    Regions(Vec<TextRegion>),
    SubPanels { cuts: Vec<u32> },
    Canvas(DynamicImage),
    Outputs { dir: PathBuf },
}

/// Artifacts keyed by stage name, committed as each stage completes. On
/// failure everything committed before the failing stage is still here,
/// so a run that dies in render still hands back the inpainted canvas.
#[derive(Debug, Default, Clone)]
pub struct RunArtifacts {
    stages: BTreeMap<&'static str, StageArtifact>,
}

impl RunArtifacts {
    fn commit(&mut self, stage: Stage, artifact: StageArtifact) {
        self.stages.insert(stage.name(), artifact);
    }

    pub fn get(&self, stage: &str) -> Option<&StageArtifact> {
        self.stages.get(stage)
    }

    pub fn stages(&self) -> &BTreeMap<&'static str, StageArtifact> {
        &self.stages
    }

    pub fn coord_map(&self) -> &[CoordinateSpan] {
        match self.stages.get(Stage::Stitch.name()) {
            Some(StageArtifact::Stitched { coord_map, .. }) => coord_map,
            _ => &[],
        }
    }

    /// Regions from the most advanced stage that committed them.
    pub fn regions(&self) -> &[TextRegion] {
        for stage in [Stage::Translate, Stage::Filter, Stage::OcrPass2, Stage::OcrPass1] {
            if let Some(StageArtifact::Regions(regions)) = self.stages.get(stage.name()) {
                return regions;
            }
        }
        &[]
    }

    pub fn output_dir(&self) -> Option<&Path> {
        match self.stages.get(Stage::Compose.name()) {
            Some(StageArtifact::Outputs { dir }) => Some(dir),
            _ => None,
        }
    }
}

/// Terminal report of a run. `run` never returns `Err`; failures land
/// here with the stage-tagged error attached.
pub struct RunOutcome {
    pub status: RunStatus,
    pub artifacts: RunArtifacts,
    pub timings: RunTimings,
    pub error: Option<PipelineError>,
}

pub struct Pipeline {
    config: Arc<Config>,
    ocr: Arc<dyn OcrEngine>,
    chat: Arc<dyn ChatModel>,
    inpainter: Arc<dyn Inpainter>,
    renderer: Arc<dyn TextRenderer>,
    memo: Arc<TranslationMemo>,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        ocr: Arc<dyn OcrEngine>,
        chat: Arc<dyn ChatModel>,
        inpainter: Arc<dyn Inpainter>,
        renderer: Arc<dyn TextRenderer>,
    ) -> Self {
        let memo = Arc::new(TranslationMemo::new(config.memo.max_entries));
        Self {
            config,
            ocr,
            chat,
            inpainter,
            renderer,
            memo,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    fn notify(&self, stage: Stage, detail: &str) {
        info!(stage = stage.name(), progress = stage.progress(), detail);
        if let Some(progress) = &self.progress {
            progress(stage, stage.progress(), detail);
        }
    }

    /// Process one chapter end to end. Infallible by contract: every
    /// failure is reported through the outcome, never as a panic or `Err`.
    #[instrument(skip_all)]
    pub async fn run(&self, input: RunInput) -> RunOutcome {
        let mut timings = RunTimings::new();
        let mut artifacts = RunArtifacts::default();
        match self.run_inner(&input, &mut timings, &mut artifacts).await {
            Ok(()) => {
                self.notify(Stage::Complete, "chapter translated");
                timings.log_summary();
                RunOutcome {
                    status: RunStatus::Complete,
                    artifacts,
                    timings,
                    error: None,
                }
            }
            Err(e) => {
                error!(error = %e, "pipeline run failed");
                self.notify(Stage::Error, &e.to_string());
                RunOutcome {
                    status: RunStatus::Failed,
                    artifacts,
                    timings,
                    error: Some(e),
                }
            }
        }
    }

    async fn run_inner(
        &self,
        input: &RunInput,
        timings: &mut RunTimings,
        artifacts: &mut RunArtifacts,
    ) -> Result<(), PipelineError> {
        self.notify(Stage::Init, "validating input");
        let source = self.validate(input)?;

        self.notify(Stage::Acquire, "fetching panels");
        let clock = timings.time_stage(Stage::Acquire.name());
        let panels = source
            .fetch()
            .await
            .map_err(|e| stage_err(Stage::Acquire, e.into()))?;
        artifacts.commit(
            Stage::Acquire,
            StageArtifact::Panels {
                count: panels.iter().filter(|p| p.is_some()).count(),
            },
        );
        timings.record(clock);

        self.notify(Stage::Stitch, "stitching canvas");
        let clock = timings.time_stage(Stage::Stitch.name());
        let stitched = run_blocking(Stage::Stitch, move || stitcher::stitch_panels(&panels))
            .await?
            .map_err(|e| stage_err(Stage::Stitch, e.into()))?;
        let canvas = stitched.canvas;
        let coord_map = stitched.coord_map;
        artifacts.commit(
            Stage::Stitch,
            StageArtifact::Stitched {
                canvas: canvas.clone(),
                coord_map: coord_map.clone(),
            },
        );
        timings.record(clock);

        self.notify(Stage::OcrPass1, "detecting text for split safety");
        let clock = timings.time_stage(Stage::OcrPass1.name());
        let pass1_regions = self
            .ocr
            .detect(&canvas)
            .await
            .map_err(|e| stage_err(Stage::OcrPass1, e.into()))?;
        artifacts.commit(Stage::OcrPass1, StageArtifact::Regions(pass1_regions.clone()));
        timings.record(clock);

        self.notify(Stage::Split, "finding safe cut lines");
        let clock = timings.time_stage(Stage::Split.name());
        let split_cfg = self.config.split.clone();
        let (canvas, cuts, slices) = run_blocking(Stage::Split, move || {
            let cuts = smart_split::find_cuts(&canvas, &pass1_regions, &split_cfg);
            let slices = smart_split::slice_at_cuts(&canvas, &cuts);
            (canvas, cuts, slices)
        })
        .await?;
        artifacts.commit(Stage::Split, StageArtifact::SubPanels { cuts });
        timings.record(clock);

        self.notify(Stage::OcrPass2, "reading text per sub-panel");
        let clock = timings.time_stage(Stage::OcrPass2.name());
        let mut regions = self.detect_per_slice(&slices).await;
        image_ops::sort_reading_order(&mut regions);
        drop(slices);
        timings.count("regions_detected", regions.len() as u64);
        artifacts.commit(Stage::OcrPass2, StageArtifact::Regions(regions.clone()));
        timings.record(clock);

        self.notify(Stage::Filter, "classifying detected text");
        let clock = timings.time_stage(Stage::Filter.name());
        let filter_fallbacks = self.apply_filter(&mut regions, canvas.height()).await;
        timings.count("filter_fallbacks", filter_fallbacks);
        timings.count(
            "regions_kept",
            regions.iter().filter(|r| r.is_kept()).count() as u64,
        );
        artifacts.commit(Stage::Filter, StageArtifact::Regions(regions.clone()));
        timings.record(clock);

        self.notify(Stage::Translate, "translating kept text");
        let clock = timings.time_stage(Stage::Translate.name());
        let translation_fallbacks = self.apply_translations(&mut regions).await;
        timings.count("translation_fallbacks", translation_fallbacks);
        artifacts.commit(Stage::Translate, StageArtifact::Regions(regions.clone()));
        timings.record(clock);

        self.notify(Stage::Inpaint, "erasing source text");
        let clock = timings.time_stage(Stage::Inpaint.name());
        let canvas = self.inpaint_canvas(canvas, &regions).await?;
        artifacts.commit(Stage::Inpaint, StageArtifact::Canvas(canvas.clone()));
        timings.record(clock);

        self.notify(Stage::Render, "drawing translations");
        let clock = timings.time_stage(Stage::Render.name());
        let canvas = self.render_translations(canvas, &regions).await?;
        artifacts.commit(Stage::Render, StageArtifact::Canvas(canvas.clone()));
        timings.record(clock);

        self.notify(Stage::Compose, "writing outputs");
        let clock = timings.time_stage(Stage::Compose.name());
        self.compose(input, canvas, &coord_map, &regions).await?;
        artifacts.commit(
            Stage::Compose,
            StageArtifact::Outputs {
                dir: input.output_dir.clone(),
            },
        );
        timings.record(clock);

        Ok(())
    }

    fn validate(&self, input: &RunInput) -> Result<Box<dyn PanelSource>, PipelineError> {
        match (&input.chapter_url, &input.document) {
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousInput.into()),
            (None, None) => Err(ValidationError::MissingInput.into()),
            (Some(url), None) => {
                let source = HttpPanelSource::new(url.clone(), self.config.acquire.clone())
                    .map_err(|e| stage_err(Stage::Init, e))?;
                Ok(Box::new(source))
            }
            (None, Some(dir)) => Ok(Box::new(DirectoryPanelSource::new(dir.clone()))),
        }
    }

    /// OCR every slice concurrently under a small fan-out bound. A slice
    /// whose detection fails contributes no regions; the rest of the
    /// chapter still goes through.
    async fn detect_per_slice(&self, slices: &[smart_split::Slice]) -> Vec<TextRegion> {
        let semaphore = Arc::new(Semaphore::new(OCR_FANOUT));
        let detections = slices.iter().enumerate().map(|(index, slice)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return Vec::new();
                };
                match self.ocr.detect(&slice.image).await {
                    Ok(found) => image_ops::into_canvas_space(found, slice.y_offset, index),
                    Err(e) => {
                        warn!(sub_panel = index, error = %e, "OCR failed for sub-panel, skipping");
                        Vec::new()
                    }
                }
            }
        });

        join_all(detections).await.into_iter().flatten().collect()
    }

    /// Classify every region, returning how many decisions degraded to
    /// the conservative default.
    async fn apply_filter(&self, regions: &mut [TextRegion], canvas_height: u32) -> u64 {
        if regions.is_empty() {
            return 0;
        }
        let items: Vec<FilterItem> = regions
            .iter()
            .map(|r| FilterItem::new(r.text.as_str(), r.rect.y + r.rect.h / 2, canvas_height))
            .collect();
        let agent = FilterAgent::new(Arc::clone(&self.chat));
        let deliveries = run_with_fallback(&agent, &items, &self.config.agent).await;
        let mut fallbacks = 0;
        for (region, delivery) in regions.iter_mut().zip(deliveries) {
            if delivery.degraded {
                fallbacks += 1;
            }
            region.filter = Some(delivery.outcome);
        }
        fallbacks
    }

    /// Translate every kept region, returning how many outcomes are
    /// passthrough fallbacks.
    async fn apply_translations(&self, regions: &mut [TextRegion]) -> u64 {
        let kept: Vec<usize> = (0..regions.len()).filter(|&i| regions[i].is_kept()).collect();
        if kept.is_empty() {
            info!("nothing kept for translation");
            return 0;
        }
        let texts: Vec<String> = kept.iter().map(|&i| regions[i].text.clone()).collect();

        let translator = TranslatorAgent::new(
            Arc::clone(&self.chat),
            self.config.agent.target_language.clone(),
        );
        let run = translator
            .translate_all(&texts, &self.memo, &self.config.agent)
            .await;

        for (&i, outcome) in kept.iter().zip(run.outcomes) {
            regions[i].translation = Some(outcome);
        }
        run.fallback_count as u64
    }

    async fn inpaint_canvas(
        &self,
        canvas: DynamicImage,
        regions: &[TextRegion],
    ) -> Result<DynamicImage, PipelineError> {
        if regions.is_empty() {
            return Ok(canvas);
        }
        let regions = regions.to_vec();
        let dilation = self.config.inpaint.mask_dilation;
        let inpainter = Arc::clone(&self.inpainter);
        run_blocking(Stage::Inpaint, move || {
            let mask = mask_builder::build_mask(canvas.width(), canvas.height(), &regions, dilation);
            inpainter.inpaint(&canvas, &mask)
        })
        .await
    }

    async fn render_translations(
        &self,
        canvas: DynamicImage,
        regions: &[TextRegion],
    ) -> Result<DynamicImage, PipelineError> {
        let mut img = canvas.to_rgba8();
        for region in regions {
            let Some(translation) = region.translation.as_ref().filter(|_| region.is_kept()) else {
                continue;
            };
            if translation.translated.trim().is_empty() {
                continue;
            }
            let layout =
                layout_solver::solve(&translation.translated, &region.rect, &self.config.render);
            self.renderer
                .draw_region(&mut img, region, &layout)
                .await
                .map_err(|e| stage_err(Stage::Render, e.into()))?;
        }
        Ok(DynamicImage::ImageRgba8(img))
    }

    async fn compose(
        &self,
        input: &RunInput,
        canvas: DynamicImage,
        coord_map: &[CoordinateSpan],
        regions: &[TextRegion],
    ) -> Result<(), PipelineError> {
        let out_dir = input.output_dir.clone();
        let coord_map = coord_map.to_vec();
        let regions = regions.to_vec();
        run_blocking(Stage::Compose, move || {
            let panels = composer::split_by_coord_map(&canvas, &coord_map);
            composer::write_outputs(&out_dir, &canvas, &panels, &regions)
        })
        .await?
        .map_err(|e| stage_err(Stage::Compose, e))
    }
}

fn stage_err(stage: Stage, source: anyhow::Error) -> PipelineError {
    PipelineError::Stage {
        stage: stage.name(),
        source,
    }
}

/// Run CPU-bound work on the blocking pool, folding a cancelled or
/// panicked task into a stage error.
async fn run_blocking<T, F>(stage: Stage, f: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| stage_err(stage, anyhow!("blocking task failed: {e}")))
}
