//! Two-layer in-memory translation cache.
//!
//! - **Preloaded** layer: filled from the prebuilt store and by completed
//!   builds. Entries never expire. Each language is indexed both by template
//!   key and by a hash of `sourceText:lang`, so a raw string that matches a
//!   template's source text also hits. The layer is an immutable snapshot
//!   behind an `Arc`; writers build a new snapshot and swap it in.
//! - **Runtime** layer: ad-hoc translations produced on resolver misses,
//!   keyed by source text, expiring after a TTL (24 h by default). Expired
//!   entries are dropped lazily on lookup and by the periodic sweep.
//!
//! No method here suspends; the resolver calls them on its hot path.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Default lifetime of runtime entries.
pub const DEFAULT_RUNTIME_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One translated template, as produced by a build or loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadedEntry {
    pub key: String,
    pub source: String,
    pub translated: String,
}

#[derive(Debug, Clone, Default)]
struct LanguageIndex {
    by_key: HashMap<String, String>,
    by_source_hash: HashMap<String, String>,
}

impl LanguageIndex {
    fn insert(&mut self, lang: &str, entry: &PreloadedEntry) {
        self.by_key
            .insert(entry.key.clone(), entry.translated.clone());
        self.by_source_hash
            .insert(source_hash(&entry.source, lang), entry.translated.clone());
    }
}

#[derive(Debug, Clone, Default)]
struct PreloadedSnapshot {
    languages: HashMap<String, LanguageIndex>,
}

#[derive(Debug, Clone)]
struct RuntimeEntry {
    value: String,
    inserted_at: Instant,
}

/// Language → source text → entry.
type RuntimeMap = HashMap<String, HashMap<String, RuntimeEntry>>;

pub struct MemoryCache {
    preloaded: RwLock<Arc<PreloadedSnapshot>>,
    runtime: Mutex<RuntimeMap>,
    ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME_TTL)
    }
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            preloaded: RwLock::new(Arc::new(PreloadedSnapshot::default())),
            runtime: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    // ==================== Preloaded layer ====================

    /// Look up by template key first, then by source-text hash.
    pub fn preloaded_get(&self, key: &str, source: &str, lang: &str) -> Option<String> {
        let snapshot = self.snapshot();
        let index = snapshot.languages.get(lang)?;
        index
            .by_key
            .get(key)
            .or_else(|| index.by_source_hash.get(&source_hash(source, lang)))
            .cloned()
    }

    /// Replace the preloaded entries of every language in `languages`.
    /// Languages not mentioned keep their current entries.
    pub fn publish_languages<'a>(
        &self,
        languages: impl IntoIterator<Item = (&'a str, &'a [PreloadedEntry])>,
    ) {
        let mut guard = self.preloaded.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PreloadedSnapshot::clone(&guard);
        for (lang, entries) in languages {
            let mut index = LanguageIndex::default();
            for entry in entries {
                index.insert(lang, entry);
            }
            next.languages.insert(lang.to_string(), index);
        }
        *guard = Arc::new(next);
    }

    /// Add a single preloaded entry (distributed-cache hit).
    pub fn insert_preloaded(&self, lang: &str, entry: PreloadedEntry) {
        let mut guard = self.preloaded.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PreloadedSnapshot::clone(&guard);
        next.languages
            .entry(lang.to_string())
            .or_default()
            .insert(lang, &entry);
        *guard = Arc::new(next);
    }

    /// Number of preloaded template keys for `lang`.
    pub fn preloaded_len(&self, lang: &str) -> usize {
        self.snapshot()
            .languages
            .get(lang)
            .map(|index| index.by_key.len())
            .unwrap_or(0)
    }

    // ==================== Runtime layer ====================

    /// Runtime lookup; an expired entry is removed and reported as a miss.
    pub fn runtime_get(&self, source: &str, lang: &str) -> Option<String> {
        let mut runtime = self.runtime_lock();
        let entries = runtime.get_mut(lang)?;
        match entries.get(source) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(source);
                None
            }
            None => None,
        }
    }

    pub fn runtime_insert(&self, source: &str, lang: &str, value: &str) {
        self.runtime_lock()
            .entry(lang.to_string())
            .or_default()
            .insert(
                source.to_string(),
                RuntimeEntry {
                    value: value.to_string(),
                    inserted_at: Instant::now(),
                },
            );
    }

    /// Drop every expired runtime entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut runtime = self.runtime_lock();
        let mut removed = 0;
        for entries in runtime.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
            removed += before - entries.len();
        }
        runtime.retain(|_, entries| !entries.is_empty());
        removed
    }

    pub fn runtime_len(&self) -> usize {
        self.runtime_lock().values().map(HashMap::len).sum()
    }

    // ==================== Both layers ====================

    /// Remove everything cached for `lang` from both layers.
    pub fn purge_language(&self, lang: &str) {
        {
            let mut guard = self.preloaded.write().unwrap_or_else(PoisonError::into_inner);
            if guard.languages.contains_key(lang) {
                let mut next = PreloadedSnapshot::clone(&guard);
                next.languages.remove(lang);
                *guard = Arc::new(next);
            }
        }
        self.runtime_lock().remove(lang);
    }

    /// Whether either layer holds anything for `lang`.
    pub fn has_language(&self, lang: &str) -> bool {
        self.snapshot().languages.contains_key(lang) || self.runtime_lock().contains_key(lang)
    }

    fn snapshot(&self) -> Arc<PreloadedSnapshot> {
        Arc::clone(&self.preloaded.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn runtime_lock(&self) -> MutexGuard<'_, RuntimeMap> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hex SHA-256 of `source:lang`, the secondary preloaded index key.
pub fn source_hash(source: &str, lang: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(lang.as_bytes());
    format!("{:x}", hasher.finalize())
}
