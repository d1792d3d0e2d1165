pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    AcquireError, AgentError, ConfigError, OcrError, PipelineError, RenderError, StitchError,
    ValidationError,
};
pub use types::{
    CoordinateSpan, FilterDecision, FilterOutcome, Rect, TextRegion, TranslationOutcome,
};

