//! Chat-model agents: the filter and translator, both built on the
//! shared batch-with-fallback protocol in [`batch`].

pub mod batch;
pub mod filter;
pub mod translator;

pub use batch::{run_with_fallback, BatchAgent, Delivery};
pub use filter::{FilterAgent, FilterItem};
pub use translator::{TranslationItem, TranslationRun, TranslatorAgent};

/// Pull the JSON payload out of a chat completion. Models wrap answers in
/// markdown fences or prose more often than not; we take the outermost
/// bracketed span and let serde judge the rest.
pub(crate) fn extract_json(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}
