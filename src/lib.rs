// Library exports for the manhwa chapter translation pipeline

pub mod agents;
pub mod core;
pub mod orchestration;
pub mod services;
pub mod stages;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{
        AcquireError, AgentError, ConfigError, OcrError, PipelineError, RenderError, StitchError,
        ValidationError,
    },
    types::{
        CoordinateSpan, FilterDecision, FilterOutcome, Rect, TextRegion, TranslationOutcome,
    },
};

pub use agents::{run_with_fallback, BatchAgent, Delivery, FilterAgent, TranslatorAgent};
pub use orchestration::{Pipeline, RunArtifacts, RunInput, RunOutcome, RunStatus, Stage, StageArtifact};
pub use services::{
    AnthropicChat, ChatModel, CosmicTextRenderer, DirectoryPanelSource, HttpPanelSource,
    Inpainter, NeighborFillInpainter, OcrEngine, PanelSource, RemoteOcrClient, TextRenderer,
    TranslationMemo,
};
