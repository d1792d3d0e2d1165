use crate::core::errors::ConfigError;
use std::env;
use std::time::Duration;
use tracing::Level;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Chat model (filter/translation agent) configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

/// OCR collaborator configuration
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub endpoint: String,
    pub confidence_threshold: f32,
}

/// Smart split algorithm configuration
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub max_subpanels: usize,
    pub min_margin_from_text: u32,
    pub min_whitespace_height: u32,
    /// Fraction of near-white pixels for a row to qualify as whitespace.
    pub white_row_fraction: f32,
    /// Grayscale value above which a pixel counts as near-white.
    pub white_luma_cutoff: u8,
}

/// Batch agent chunking configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub chunk_size: usize,
    pub chunk_pause: Duration,
    /// Context window (neighbor texts on each side) for translation requests.
    pub context_window: usize,
    pub target_language: String,
}

/// Panel acquisition configuration
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub download_retries: u32,
    pub download_timeout: Duration,
    pub max_concurrent_downloads: usize,
}

/// Inpainting mask configuration
#[derive(Debug, Clone)]
pub struct InpaintConfig {
    pub mask_dilation: u32,
    pub fill_passes: u32,
}

/// Text rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub font_dir: String,
    pub size_multiplier: f32,
    pub min_font_size: u32,
    pub max_font_size: u32,
    pub stroke_width: i32,
}

/// Translation memo cache configuration
#[derive(Debug, Clone)]
pub struct MemoConfig {
    pub max_entries: usize,
}

/// Main application configuration.
///
/// Loaded once from the environment and threaded into every component
/// constructor as `Arc<Config>`; there is no process-wide mutable state.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub llm: LlmConfig,
    pub ocr: OcrConfig,
    pub split: SplitConfig,
    pub agent: AgentConfig,
    pub acquire: AcquireConfig,
    pub inpaint: InpaintConfig,
    pub render: RenderConfig,
    pub memo: MemoConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Self {
            log_level,
            llm: LlmConfig {
                api_base: env::var("LLM_API_BASE")
                    .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string()),
                api_key: env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
                model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string()),
                temperature: env_parse("LLM_TEMPERATURE", 0.2),
                max_tokens: env_parse("LLM_MAX_TOKENS", 1024),
                max_retries: env_parse("LLM_MAX_RETRIES", 3),
                request_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECONDS", 60)),
            },
            ocr: OcrConfig {
                endpoint: env::var("OCR_ENDPOINT")
                    .unwrap_or_else(|_| "http://127.0.0.1:8868/ocr".to_string()),
                confidence_threshold: env_parse("OCR_CONFIDENCE_THRESHOLD", 0.6),
            },
            split: SplitConfig {
                max_subpanels: env_parse("SPLIT_MAX_SUBPANELS", 100),
                min_margin_from_text: env_parse("SPLIT_MIN_MARGIN", 50),
                min_whitespace_height: env_parse("SPLIT_MIN_WHITESPACE_HEIGHT", 20),
                white_row_fraction: env_parse("SPLIT_WHITE_ROW_FRACTION", 0.95),
                white_luma_cutoff: env_parse("SPLIT_WHITE_LUMA_CUTOFF", 240),
            },
            agent: AgentConfig {
                chunk_size: env_parse("AGENT_CHUNK_SIZE", 5),
                chunk_pause: Duration::from_millis(env_parse("AGENT_CHUNK_PAUSE_MS", 1000)),
                context_window: env_parse("TRANSLATION_CONTEXT_WINDOW", 3),
                target_language: env::var("TARGET_LANGUAGE")
                    .unwrap_or_else(|_| "English".to_string()),
            },
            acquire: AcquireConfig {
                download_retries: env_parse("DOWNLOAD_RETRIES", 3),
                download_timeout: Duration::from_secs(env_parse("DOWNLOAD_TIMEOUT_SECONDS", 30)),
                max_concurrent_downloads: env_parse("MAX_CONCURRENT_DOWNLOADS", 8),
            },
            inpaint: InpaintConfig {
                mask_dilation: env_parse("MASK_DILATION", 5),
                fill_passes: env_parse("INPAINT_FILL_PASSES", 16),
            },
            render: RenderConfig {
                font_dir: env::var("FONT_DIR").unwrap_or_else(|_| "fonts".to_string()),
                size_multiplier: env_parse("FONT_SIZE_MULTIPLIER", 0.8),
                min_font_size: env_parse("MIN_FONT_SIZE", 12),
                max_font_size: env_parse("MAX_FONT_SIZE", 100),
                stroke_width: env_parse("TEXT_STROKE_WIDTH", 2),
            },
            memo: MemoConfig {
                max_entries: env_parse("MEMO_MAX_ENTRIES", 10_000),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.split.max_subpanels == 0 {
            return Err(ConfigError::InvalidMaxSubpanels(self.split.max_subpanels));
        }

        if !(0.0..=1.0).contains(&self.split.white_row_fraction) {
            return Err(ConfigError::InvalidWhiteRowFraction(
                self.split.white_row_fraction,
            ));
        }

        if self.agent.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.agent.chunk_size));
        }

        if self.render.min_font_size > self.render.max_font_size {
            return Err(ConfigError::InvalidFontRange {
                min: self.render.min_font_size,
                max: self.render.max_font_size,
            });
        }

        if !(0.0..=2.0).contains(&self.render.size_multiplier) || self.render.size_multiplier == 0.0
        {
            return Err(ConfigError::InvalidSizeMultiplier(self.render.size_multiplier));
        }

        if !(0.0..=1.0).contains(&self.ocr.confidence_threshold) {
            return Err(ConfigError::EnvVar(format!(
                "OCR_CONFIDENCE_THRESHOLD must be in [0.0, 1.0], got {}",
                self.ocr.confidence_threshold
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::load_from_env()
    }

    #[test]
    fn defaults_are_valid() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.split.max_subpanels, 100);
        assert_eq!(config.agent.chunk_size, 5);
    }

    #[test]
    fn rejects_zero_subpanels() {
        let mut config = base_config();
        config.split.max_subpanels = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxSubpanels(0))
        ));
    }

    #[test]
    fn rejects_inverted_font_range() {
        let mut config = base_config();
        config.render.min_font_size = 40;
        config.render.max_font_size = 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFontRange { min: 40, max: 20 })
        ));
    }
}
