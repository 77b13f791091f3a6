//! Translation builder.
//!
//! Translates every template into every enabled target language, writes the
//! result to the prebuilt store, then publishes it to the in-memory cache and
//! the distributed cache, in that order. Entries go through the resolver's
//! uncached path (fallback dictionary, then backend), so a build never reads
//! stale cache content and never writes the caches behind the store's back.
//!
//! At most one build runs at a time. `build_all` and `build_for_language`
//! reject a concurrent request with `BuildInProgress`; callers that must wait
//! (language enable/disable) take the same lock through `begin`.

use crate::cache::PreloadedEntry;
use crate::error::{TranslationError, TranslationResult};
use crate::i18n::{Tier, SOURCE_LANGUAGE};
use crate::prebuilt::{BuildMetadata, PrebuiltSnapshot, PrebuiltStore, TranslationData};
use crate::resolver::Resolver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Deadline of one backend call during a build.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after each backend call so a build does not saturate the backend.
pub const DEFAULT_CALL_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub call_timeout: Duration,
    pub call_delay: Duration,
    /// Report progress every this many entries
    pub progress_every: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            call_delay: DEFAULT_CALL_DELAY,
            progress_every: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildProgress {
    pub language: String,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&BuildProgress) + Send + Sync>;

/// Outcome of a build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Languages translated by this build
    pub languages: Vec<String>,
    pub backend_available: bool,
    pub backend_translations: usize,
    pub fallback_translations: usize,
    pub source_copies: usize,
    /// Metadata written with the build (covers the whole store)
    pub metadata: BuildMetadata,
}

/// Proof that the build lock is held.
pub struct BuildGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

pub struct Builder {
    resolver: Arc<Resolver>,
    store: PrebuiltStore,
    options: BuildOptions,
    progress: Option<ProgressCallback>,
    lock: Mutex<()>,
}

impl Builder {
    pub fn new(resolver: Arc<Resolver>, store: PrebuiltStore, options: BuildOptions) -> Self {
        Self {
            resolver,
            store,
            options,
            progress: None,
            lock: Mutex::new(()),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn store(&self) -> &PrebuiltStore {
        &self.store
    }

    /// Take the build lock, failing immediately if a build holds it.
    pub fn try_begin(&self) -> TranslationResult<BuildGuard<'_>> {
        self.lock
            .try_lock()
            .map(|guard| BuildGuard { _guard: guard })
            .map_err(|_| TranslationError::BuildInProgress)
    }

    /// Take the build lock, waiting for a running build to finish.
    pub async fn begin(&self) -> BuildGuard<'_> {
        BuildGuard {
            _guard: self.lock.lock().await,
        }
    }

    /// Full build over every enabled language. Languages no longer enabled
    /// are dropped from the store.
    pub async fn build_all(&self) -> TranslationResult<BuildReport> {
        let guard = self.try_begin()?;
        self.build_all_locked(&guard).await
    }

    pub async fn build_all_locked(
        &self,
        _guard: &BuildGuard<'_>,
    ) -> TranslationResult<BuildReport> {
        let targets = self.resolver.registry().target_codes();
        info!("Starting full translation build for {:?}", targets);
        self.build(&targets, TranslationData::new()).await
    }

    /// Rebuild one enabled language, keeping every other language in the store.
    pub async fn build_for_language(&self, code: &str) -> TranslationResult<BuildReport> {
        let guard = self.try_begin()?;
        self.build_for_language_locked(&guard, code).await
    }

    pub async fn build_for_language_locked(
        &self,
        _guard: &BuildGuard<'_>,
        code: &str,
    ) -> TranslationResult<BuildReport> {
        if !self.resolver.registry().is_enabled(code) {
            return Err(TranslationError::UnknownLanguage(code.to_string()));
        }

        info!("Starting translation build for '{}'", code);
        let existing = self.store.load().await.data;
        let targets: Vec<String> = if code == SOURCE_LANGUAGE {
            Vec::new()
        } else {
            vec![code.to_string()]
        };
        self.build(&targets, existing).await
    }

    /// Drop `code` from the store and from both caches. The caller holds
    /// the build lock.
    pub async fn remove_language(
        &self,
        _guard: &BuildGuard<'_>,
        code: &str,
    ) -> TranslationResult<BuildMetadata> {
        if code == SOURCE_LANGUAGE {
            return Err(TranslationError::CannotRemoveSource);
        }

        let started = Instant::now();
        let mut data = self.store.load().await.data;
        data.remove(code);
        data.insert(SOURCE_LANGUAGE.to_string(), self.resolver.catalogue().to_map());

        let metadata =
            BuildMetadata::summarize(&data, self.resolver.catalogue(), started.elapsed());
        self.store.save(&data, &metadata).await?;
        self.store.remove_language_file(code).await?;

        self.resolver.cache().purge_language(code);
        if let Some(distributed) = self.resolver.distributed() {
            match distributed.purge_language(code).await {
                Ok(removed) => {
                    debug!("Purged {} distributed cache entries for '{}'", removed, code)
                }
                Err(e) => warn!("Failed to purge distributed cache for '{}': {:#}", code, e),
            }
        }

        info!("✓ Removed translations for '{}'", code);
        Ok(metadata)
    }

    /// Load the prebuilt store into the preloaded cache layer.
    pub async fn warm_from_store(&self) -> PrebuiltSnapshot {
        let snapshot = self.store.load().await;
        self.publish_memory(&snapshot.data);
        snapshot
    }

    async fn build(
        &self,
        targets: &[String],
        mut data: TranslationData,
    ) -> TranslationResult<BuildReport> {
        let started = Instant::now();
        let catalogue = Arc::clone(self.resolver.catalogue());

        let backend_available = match self.resolver.backend() {
            Some(client) => {
                let status = client.probe(targets.first().map(String::as_str)).await;
                if let crate::backend::ProbeStatus::NotReady { reason } = &status {
                    warn!(
                        "Translation backend not ready ({}), building from fallback dictionary",
                        reason
                    );
                }
                status.is_ready()
            }
            None => false,
        };
        let deadline = backend_available.then_some(self.options.call_timeout);

        let total = catalogue.len() * targets.len();
        let mut completed = 0;
        let mut tiers: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut computed = TranslationData::new();

        for lang in targets {
            let mut entries = BTreeMap::new();
            for (key, source) in catalogue.iter() {
                let (text, tier) = self.resolver.translate_uncached(source, lang, deadline).await;
                if tier == Tier::Backend && !self.options.call_delay.is_zero() {
                    tokio::time::sleep(self.options.call_delay).await;
                }
                *tiers.entry(tier_name(tier)).or_default() += 1;
                entries.insert(key.to_string(), text);

                completed += 1;
                self.report_progress(lang, completed, total);
            }
            computed.insert(lang.clone(), entries);
        }

        data.insert(SOURCE_LANGUAGE.to_string(), catalogue.to_map());
        for (lang, entries) in &computed {
            data.insert(lang.clone(), entries.clone());
        }

        let metadata = BuildMetadata::summarize(&data, &catalogue, started.elapsed());
        self.store.save(&data, &metadata).await?;
        self.publish_memory(&computed);
        self.publish_distributed(&computed).await;

        info!(
            "✓ Translation build finished: {} languages, {}% efficiency, {} ms",
            metadata.total_languages, metadata.efficiency, metadata.build_duration
        );

        Ok(BuildReport {
            languages: targets.to_vec(),
            backend_available,
            backend_translations: tiers.get("backend").copied().unwrap_or(0),
            fallback_translations: tiers.get("fallback").copied().unwrap_or(0),
            source_copies: tiers.get("source").copied().unwrap_or(0),
            metadata,
        })
    }

    fn publish_memory(&self, data: &TranslationData) {
        let catalogue = self.resolver.catalogue();
        let prepared: Vec<(&str, Vec<PreloadedEntry>)> = data
            .iter()
            .filter(|(lang, _)| lang.as_str() != SOURCE_LANGUAGE)
            .map(|(lang, entries)| {
                let entries = entries
                    .iter()
                    .map(|(key, translated)| PreloadedEntry {
                        key: key.clone(),
                        source: catalogue.get(key).unwrap_or(key.as_str()).to_string(),
                        translated: translated.clone(),
                    })
                    .collect();
                (lang.as_str(), entries)
            })
            .collect();

        self.resolver
            .cache()
            .publish_languages(prepared.iter().map(|(lang, entries)| (*lang, entries.as_slice())));
    }

    async fn publish_distributed(&self, data: &TranslationData) {
        let Some(distributed) = self.resolver.distributed() else {
            return;
        };
        for (lang, entries) in data {
            let pairs: Vec<(String, String)> = entries
                .iter()
                .map(|(key, text)| (key.clone(), text.clone()))
                .collect();
            if let Err(e) = distributed.set_many(lang, &pairs).await {
                warn!("Failed to publish '{}' translations to distributed cache: {:#}", lang, e);
            }
        }
    }

    fn report_progress(&self, lang: &str, completed: usize, total: usize) {
        let Some(callback) = self.progress.as_deref() else {
            return;
        };
        let every = self.options.progress_every.max(1);
        if completed % every == 0 || completed == total {
            callback(&BuildProgress {
                language: lang.to_string(),
                completed,
                total,
            });
        }
    }
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Backend => "backend",
        Tier::Fallback => "fallback",
        _ => "source",
    }
}
