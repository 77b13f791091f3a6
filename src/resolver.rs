//! Resolver: turns a template key (or raw English text) into text in the
//! user's language.
//!
//! Lookup order for an enabled non-source language:
//!
//! 1. preloaded cache (`key:lang`, or the hash of `sourceText:lang`)
//! 2. runtime cache (`sourceText:lang`, TTL-bound)
//! 3. fallback dictionary (result goes into the runtime cache)
//! 4. distributed cache (result goes into both in-memory layers)
//! 5. translation backend, if it is ready (result goes into the runtime cache
//!    and, in the background, the distributed cache)
//! 6. the English source
//!
//! Placeholders are substituted on whatever text wins. Nothing here returns
//! an error: backend and cache failures are logged (rate-limited) and the
//! lookup moves on to the next tier.

use crate::backend::{BackendClient, BackendManager};
use crate::cache::{DistributedCache, MemoryCache, PreloadedEntry};
use crate::error::TranslationError;
use crate::i18n::{
    apply_replacements, has_translatable_text, placeholders_preserved, FallbackDictionary,
    LanguageRegistry, Replacements, TemplateCatalogue, Tier, TranslationMetrics, SOURCE_LANGUAGE,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Minimum spacing between two warnings of the same kind.
const WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Allows one event per kind per interval.
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    last: Mutex<HashMap<&'static str, Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, kind: &'static str) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match last.get(kind) {
            Some(at) if now.duration_since(*at) < self.interval => false,
            _ => {
                last.insert(kind, now);
                true
            }
        }
    }
}

pub struct Resolver {
    catalogue: Arc<TemplateCatalogue>,
    registry: Arc<LanguageRegistry>,
    cache: Arc<MemoryCache>,
    fallback: Arc<FallbackDictionary>,
    distributed: Option<Arc<dyn DistributedCache>>,
    backend: Option<BackendClient>,
    manager: Option<Arc<BackendManager>>,
    metrics: Arc<TranslationMetrics>,
    warnings: Throttle,
}

impl Resolver {
    /// Resolver with the built-in fallback dictionary and no backend or
    /// distributed cache.
    pub fn new(
        catalogue: Arc<TemplateCatalogue>,
        registry: Arc<LanguageRegistry>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            catalogue,
            registry,
            cache,
            fallback: Arc::new(FallbackDictionary::builtin()),
            distributed: None,
            backend: None,
            manager: None,
            metrics: Arc::new(TranslationMetrics::new()),
            warnings: Throttle::new(WARN_INTERVAL),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackDictionary) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    pub fn with_distributed(mut self, distributed: Arc<dyn DistributedCache>) -> Self {
        self.distributed = Some(distributed);
        self
    }

    pub fn with_backend(mut self, backend: BackendClient) -> Self {
        self.backend = Some(backend);
        self
    }

    /// With a manager, the backend is only called while the manager reports
    /// it `Ready` with the target model loaded.
    pub fn with_manager(mut self, manager: Arc<BackendManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TranslationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn catalogue(&self) -> &Arc<TemplateCatalogue> {
        &self.catalogue
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    pub fn distributed(&self) -> Option<&Arc<dyn DistributedCache>> {
        self.distributed.as_ref()
    }

    pub fn backend(&self) -> Option<&BackendClient> {
        self.backend.as_ref()
    }

    pub fn metrics(&self) -> &Arc<TranslationMetrics> {
        &self.metrics
    }

    /// English text for `key`: the template source, or `key` itself when it
    /// is not a template key.
    pub fn source_text<'a>(&'a self, key: &'a str) -> &'a str {
        self.catalogue.get(key).unwrap_or(key)
    }

    /// False for the source language and for languages that are not enabled;
    /// those resolve straight to English.
    pub fn translates_into(&self, lang: &str) -> bool {
        lang != SOURCE_LANGUAGE && self.registry.is_enabled(lang)
    }

    /// Resolve `key` in `lang` and substitute `replacements`. Never fails.
    pub async fn resolve(&self, key: &str, lang: &str, replacements: &Replacements) -> String {
        let source = self.source_text(key);
        if !self.translates_into(lang) {
            return apply_replacements(source, replacements);
        }

        let (text, tier) = self.lookup(key, source, lang).await;
        self.metrics.record_tier(tier);
        apply_replacements(&text, replacements)
    }

    async fn lookup(&self, key: &str, source: &str, lang: &str) -> (String, Tier) {
        if let Some(hit) = self.cache.preloaded_get(key, source, lang) {
            return (hit, Tier::Preloaded);
        }

        if let Some(hit) = self.cache.runtime_get(source, lang) {
            return (hit, Tier::Runtime);
        }

        if let Some(hit) = self.fallback.get(lang, source) {
            self.cache.runtime_insert(source, lang, hit);
            return (hit.to_string(), Tier::Fallback);
        }

        if let Some(hit) = self.distributed_get(key, lang).await {
            self.cache.insert_preloaded(
                lang,
                PreloadedEntry {
                    key: key.to_string(),
                    source: source.to_string(),
                    translated: hit.clone(),
                },
            );
            self.cache.runtime_insert(source, lang, &hit);
            return (hit, Tier::Distributed);
        }

        if let Some(client) = self.ready_backend(lang) {
            if let Some(translated) = self.call_backend(client, source, lang, None).await {
                self.cache.runtime_insert(source, lang, &translated);
                self.publish_distributed(key, lang, &translated);
                return (translated, Tier::Backend);
            }
        }

        debug!("No translation of '{}' into {}, using source", key, lang);
        (source.to_string(), Tier::Source)
    }

    /// Translation path used by the builder: fallback dictionary, then the
    /// backend under `backend_deadline`, then the source. Caches are neither
    /// read nor written. `None` skips the backend entirely.
    pub async fn translate_uncached(
        &self,
        source: &str,
        lang: &str,
        backend_deadline: Option<Duration>,
    ) -> (String, Tier) {
        if lang == SOURCE_LANGUAGE {
            return (source.to_string(), Tier::Source);
        }

        if let Some(hit) = self.fallback.get(lang, source) {
            return (hit.to_string(), Tier::Fallback);
        }

        if let (Some(deadline), Some(client)) = (backend_deadline, self.backend.as_ref()) {
            let call = self.call_backend(client, source, lang, Some(deadline));
            if let Some(translated) = call.await {
                return (translated, Tier::Backend);
            }
        }

        (source.to_string(), Tier::Source)
    }

    fn ready_backend(&self, lang: &str) -> Option<&BackendClient> {
        let client = self.backend.as_ref()?;
        if let Some(manager) = &self.manager {
            if !manager.is_ready() || !manager.serves(lang) {
                self.request_backend_start();
                return None;
            }
        }
        Some(client)
    }

    fn request_backend_start(&self) {
        if let Some(manager) = &self.manager {
            if self.warnings.allow("backend_start") {
                manager.request_start(self.registry.enabled_codes());
            }
        }
    }

    async fn call_backend(
        &self,
        client: &BackendClient,
        source: &str,
        lang: &str,
        deadline: Option<Duration>,
    ) -> Option<String> {
        if !has_translatable_text(source) {
            return None;
        }

        self.metrics.record_backend_call();
        let call = client.translate(source, SOURCE_LANGUAGE, lang);
        let result = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .unwrap_or(Err(TranslationError::BackendTimeout(deadline))),
            None => call.await,
        };

        match result {
            Ok(translated) if is_usable(source, &translated) => Some(translated),
            Ok(translated) => {
                self.metrics.record_backend_failure();
                if self.warnings.allow("backend_rejected") {
                    warn!(
                        "Rejected backend translation into {} ('{}' -> '{}')",
                        lang, source, translated
                    );
                }
                None
            }
            Err(e) => {
                self.metrics.record_backend_failure();
                if self.warnings.allow(e.reason()) {
                    warn!("Translation backend failed, falling back: {}", e);
                }
                if matches!(e, TranslationError::BackendUnavailable(_)) {
                    self.request_backend_start();
                }
                None
            }
        }
    }

    async fn distributed_get(&self, key: &str, lang: &str) -> Option<String> {
        let distributed = self.distributed.as_ref()?;
        match distributed.get(key, lang).await {
            Ok(hit) => hit,
            Err(e) => {
                if self.warnings.allow("distributed_get") {
                    warn!("Distributed cache read failed: {:#}", e);
                }
                None
            }
        }
    }

    fn publish_distributed(&self, key: &str, lang: &str, translated: &str) {
        let Some(distributed) = self.distributed.clone() else {
            return;
        };
        let (key, lang, translated) = (key.to_string(), lang.to_string(), translated.to_string());
        tokio::spawn(async move {
            if let Err(e) = distributed.set(&key, &lang, &translated).await {
                debug!("Distributed cache write for {}:{} failed: {:#}", key, lang, e);
            }
        });
    }
}

/// A backend answer is kept only if it is non-empty, actually differs from
/// the source and carries the same placeholders.
fn is_usable(source: &str, translated: &str) -> bool {
    !translated.trim().is_empty()
        && translated != source
        && placeholders_preserved(source, translated)
}
