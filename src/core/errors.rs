// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with context preservation,
// type-safe matching, and source error chaining.

use thiserror::Error;

/// Malformed run input, raised before any stage executes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no input supplied: provide a chapter URL or a local document path")]
    MissingInput,

    #[error("ambiguous input: provide either a chapter URL or a local document path, not both")]
    AmbiguousInput,
}

/// Stitcher errors
#[derive(Debug, Error)]
pub enum StitchError {
    #[error("no panels to stitch")]
    NoPanels,

    #[error("all {0} panels failed to decode")]
    AllPanelsFailed(usize),
}

/// Agent / remote text-model errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat model returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("chat API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("no API key configured (set LLM_API_KEY)")]
    MissingApiKey,
}

/// OCR collaborator errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OCR service returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("image encoding for OCR failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Panel acquisition errors
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("download failed for {url} after {attempts} attempts")]
    DownloadFailed { url: String, attempts: u32 },

    #[error("local document not found: {0}")]
    DocumentNotFound(String),

    #[error("local document contains no images: {0}")]
    EmptyDocument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no usable fonts loaded from {0}")]
    NoFonts(String),

    #[error("image operation failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_subpanels must be >= 1, got {0}")]
    InvalidMaxSubpanels(usize),

    #[error("white_row_fraction must be in [0.0, 1.0], got {0}")]
    InvalidWhiteRowFraction(f32),

    #[error("agent chunk_size must be > 0, got {0}")]
    InvalidChunkSize(usize),

    #[error("min font size {min} exceeds max font size {max}")]
    InvalidFontRange { min: u32, max: u32 },

    #[error("font size_multiplier must be in (0.0, 2.0], got {0}")]
    InvalidSizeMultiplier(f32),

    #[error("environment variable parsing failed: {0}")]
    EnvVar(String),
}

/// Top-level pipeline errors carried in the run outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
