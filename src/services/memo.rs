// Translation memo: an in-process LRU keyed by source text and target
// language, so repeated lines (recaps, catchphrases, chapter reruns)
// never hit the chat model twice.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::types::TranslationOutcome;

pub struct TranslationMemo {
    cache: Mutex<LruCache<u64, TranslationOutcome>>,
}

impl TranslationMemo {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(text: &str, target_language: &str) -> u64 {
        xxh3_64(format!("{target_language}\u{1f}{text}").as_bytes())
    }

    pub fn get(&self, text: &str, target_language: &str) -> Option<TranslationOutcome> {
        let hit = self
            .cache
            .lock()
            .get(&Self::key(text, target_language))
            .cloned();
        if hit.is_some() {
            debug!("translation memo hit");
        }
        hit
    }

    pub fn put(&self, text: &str, target_language: &str, outcome: TranslationOutcome) {
        self.cache
            .lock()
            .put(Self::key(text, target_language), outcome);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
