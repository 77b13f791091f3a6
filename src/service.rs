//! Translation service: the component container handed to the rest of the bot.
//!
//! Everything that used to be process-wide state (registry, caches, backend
//! manager, builder) is assembled once at startup and reached through this
//! type. Lookups go to the resolver; administrative operations return
//! structured results instead of errors.

use crate::backend::{BackendClient, BackendManager, BackendStatus, CommandLauncher, ProbeStatus};
use crate::builder::{BuildOptions, BuildProgress, BuildReport, Builder};
use crate::cache::{DistributedCache, MemoryCache};
use crate::config::Config;
use crate::db::Database;
use crate::error::{TranslationError, TranslationResult};
use crate::i18n::{
    FallbackDictionary, Language, LanguageRegistry, MetricsReport, Replacements, TemplateCatalogue,
    SOURCE_LANGUAGE,
};
use crate::markdown;
use crate::prebuilt::{BuildMetadata, PrebuiltStore};
use crate::resolver::Resolver;
use crate::retry::RetryConfig;
use crate::state::{JsonFileStateStore, StateStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Read-only access to the language each user picked.
#[async_trait]
pub trait UserLanguageLookup: Send + Sync {
    async fn language_of(&self, user_id: i64) -> Result<Option<String>>;
}

/// Result of enabling or disabling a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageChange {
    pub ok: bool,
    /// The backend was relaunched to load a model
    pub recompiled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LanguageChange {
    fn accepted(recompiled: bool) -> Self {
        Self {
            ok: true,
            recompiled,
            reason: None,
        }
    }

    fn rejected(error: &TranslationError) -> Self {
        Self {
            ok: false,
            recompiled: false,
            reason: Some(error.reason().to_string()),
        }
    }
}

/// Outcome of `test_connection`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub backend_url: Option<String>,
    pub probe: ProbeStatus,
    pub manager: Option<BackendStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub label: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub enabled_languages: Vec<String>,
    pub languages: Vec<LanguageInfo>,
    pub templates: usize,
    pub runtime_cache_entries: usize,
    pub backend: Option<BackendStatus>,
    pub last_build: Option<BuildMetadata>,
    pub metrics: MetricsReport,
}

pub struct TranslationService {
    resolver: Arc<Resolver>,
    builder: Arc<Builder>,
    manager: Option<Arc<BackendManager>>,
    users: Option<Arc<dyn UserLanguageLookup>>,
}

impl TranslationService {
    pub fn new(resolver: Arc<Resolver>, builder: Arc<Builder>) -> Self {
        Self {
            resolver,
            builder,
            manager: None,
            users: None,
        }
    }

    pub fn with_manager(mut self, manager: Arc<BackendManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn with_user_lookup(mut self, users: Arc<dyn UserLanguageLookup>) -> Self {
        self.users = Some(users);
        self
    }

    /// Assemble every component from configuration.
    ///
    /// With `DATABASE_URL` set, Postgres provides the state store, the
    /// distributed cache and the user-language lookup; otherwise state goes
    /// to a JSON file and there is no distributed cache.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let database = match &config.database_url {
            Some(url) => Some(Arc::new(Database::connect(url).await?)),
            None => None,
        };

        let state: Arc<dyn StateStore> = match &database {
            Some(db) => db.clone(),
            None => Arc::new(JsonFileStateStore::new(&config.state_file)),
        };
        let registry = Arc::new(
            LanguageRegistry::load(state, &config.initial_languages)
                .await
                .context("Failed to load language registry")?,
        );

        let client = BackendClient::new(&config.backend_url, config.backend_timeout)?;
        let cache = Arc::new(MemoryCache::new(config.runtime_cache_ttl));
        let mut resolver = Resolver::new(Arc::new(TemplateCatalogue::builtin()), registry, cache)
            .with_fallback(FallbackDictionary::builtin())
            .with_backend(client.clone());

        let manager = config.backend_command.as_deref().and_then(|command| {
            let launcher = CommandLauncher::from_command_line(command)?;
            let startup =
                RetryConfig::polling(config.backend_startup_timeout, Duration::from_secs(2));
            Some(Arc::new(BackendManager::new(client.clone(), Arc::new(launcher), startup)))
        });
        if let Some(manager) = &manager {
            resolver = resolver.with_manager(Arc::clone(manager));
        }
        if let Some(db) = &database {
            resolver = resolver.with_distributed(db.clone() as Arc<dyn DistributedCache>);
        }
        let resolver = Arc::new(resolver);

        let options = BuildOptions {
            call_timeout: config.build_call_timeout,
            call_delay: config.build_call_delay,
            ..Default::default()
        };
        let builder = Builder::new(
            Arc::clone(&resolver),
            PrebuiltStore::new(&config.prebuilt_dir),
            options,
        )
        .with_progress(Arc::new(|progress: &BuildProgress| {
            info!(
                "Build progress [{}]: {}/{}",
                progress.language, progress.completed, progress.total
            );
        }));

        let mut service = Self::new(resolver, Arc::new(builder));
        if let Some(manager) = manager {
            service = service.with_manager(manager);
        }
        if let Some(db) = database {
            service = service.with_user_lookup(db);
        }
        Ok(service)
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        self.resolver.registry()
    }

    pub fn builder(&self) -> &Arc<Builder> {
        &self.builder
    }

    pub fn manager(&self) -> Option<&Arc<BackendManager>> {
        self.manager.as_ref()
    }

    // ==================== Lookups ====================

    pub async fn resolve(&self, key: &str, lang: &str, replacements: &Replacements) -> String {
        self.resolver.resolve(key, lang, replacements).await
    }

    /// Resolve in the language the user picked, English when unknown.
    pub async fn resolve_for_user(
        &self,
        key: &str,
        user_id: i64,
        replacements: &Replacements,
    ) -> String {
        let lang = self.user_language(user_id).await;
        self.resolver.resolve(key, &lang, replacements).await
    }

    /// Resolve several keys concurrently, e.g. the buttons of a keyboard row.
    pub async fn resolve_many(
        &self,
        keys: &[&str],
        lang: &str,
        replacements: &Replacements,
    ) -> Vec<String> {
        join_all(
            keys.iter()
                .map(|key| self.resolver.resolve(key, lang, replacements)),
        )
        .await
    }

    pub async fn translate_markdown(&self, text: &str, lang: &str) -> String {
        markdown::translate_markdown(&self.resolver, text, lang).await
    }

    async fn user_language(&self, user_id: i64) -> String {
        let Some(users) = &self.users else {
            return SOURCE_LANGUAGE.to_string();
        };
        match users.language_of(user_id).await {
            Ok(Some(lang)) => lang,
            Ok(None) => SOURCE_LANGUAGE.to_string(),
            Err(e) => {
                warn!("Failed to look up language of user {}: {:#}", user_id, e);
                SOURCE_LANGUAGE.to_string()
            }
        }
    }

    // ==================== Administration ====================

    /// Enable `code` and make sure the backend has a model for it.
    ///
    /// A failed model load does not undo the enable: lookups fall back to
    /// the dictionary and source text until the backend catches up, and the
    /// failure is reported in `reason`.
    pub async fn enable_language(&self, code: &str) -> LanguageChange {
        let _guard = self.builder.begin().await;

        if let Err(e) = self.registry().enable(code).await {
            warn!("Cannot enable language '{}': {}", code, e);
            return LanguageChange::rejected(&e);
        }

        let Some(manager) = &self.manager else {
            return LanguageChange::accepted(false);
        };
        if manager.is_ready() && manager.serves(code) {
            return LanguageChange::accepted(false);
        }

        let enabled = self.registry().enabled_codes();
        match manager.add_language(code, &enabled).await {
            Ok(recompiled) => LanguageChange::accepted(recompiled),
            Err(e) => {
                error!("Backend could not load a model for '{}': {}", code, e);
                LanguageChange {
                    ok: true,
                    recompiled: false,
                    reason: Some(e.reason().to_string()),
                }
            }
        }
    }

    /// Disable `code` and drop its translations everywhere. The backend keeps
    /// its model so a later enable is fast.
    ///
    /// The prebuilt store is rewritten before the registry changes; a failed
    /// rewrite leaves the language enabled.
    pub async fn disable_language(&self, code: &str) -> LanguageChange {
        let guard = self.builder.begin().await;

        if let Err(e) = self.builder.remove_language(&guard, code).await {
            error!("Cannot remove translations of '{}': {}", code, e);
            return LanguageChange::rejected(&e);
        }

        if let Err(e) = self.registry().disable(code).await {
            error!("Translations of '{}' removed but it is still enabled: {}", code, e);
            return LanguageChange::rejected(&e);
        }
        // Lookups racing the rewrite may have cached it again
        self.resolver.cache().purge_language(code);

        LanguageChange::accepted(false)
    }

    pub async fn build_all(&self) -> TranslationResult<BuildReport> {
        self.builder.build_all().await
    }

    pub async fn build_for_language(&self, code: &str) -> TranslationResult<BuildReport> {
        self.builder.build_for_language(code).await
    }

    /// Probe the backend (listing plus one live translation).
    pub async fn test_connection(&self) -> ConnectionReport {
        let probe = match self.resolver.backend() {
            Some(client) => {
                let target = self.registry().target_codes().into_iter().next();
                client.probe(target.as_deref()).await
            }
            None => ProbeStatus::NotReady {
                reason: "no translation backend configured".to_string(),
            },
        };

        ConnectionReport {
            backend_url: self.resolver.backend().map(|client| client.base_url().to_string()),
            probe,
            manager: self.manager.as_ref().map(|manager| manager.status()),
        }
    }

    pub async fn status(&self) -> ServiceStatus {
        let registry = self.registry();
        let languages = registry
            .all_available()
            .into_iter()
            .map(|lang: &'static Language| LanguageInfo {
                code: lang.code,
                label: lang.label(),
                enabled: registry.is_enabled(lang.code),
            })
            .collect();

        ServiceStatus {
            enabled_languages: registry.enabled_codes(),
            languages,
            templates: self.resolver.catalogue().len(),
            runtime_cache_entries: self.resolver.cache().runtime_len(),
            backend: self.manager.as_ref().map(|manager| manager.status()),
            last_build: self.builder.store().load().await.metadata,
            metrics: self.resolver.metrics().report(),
        }
    }

    // ==================== Lifecycle ====================

    /// Warm the caches from the prebuilt store, start the backend in the
    /// background, and kick off a full build when nothing was prebuilt.
    pub async fn start(self: &Arc<Self>) {
        let snapshot = self.builder.warm_from_store().await;

        if let Some(manager) = &self.manager {
            manager.request_start(self.registry().enabled_codes());
        }

        if snapshot.is_empty() && !self.registry().target_codes().is_empty() {
            info!("No prebuilt translations found, starting a background build");
            let service = Arc::clone(self);
            tokio::spawn(async move {
                if let Some(manager) = &service.manager {
                    let enabled = service.registry().enabled_codes();
                    if let Err(e) = manager.ensure_running(&enabled).await {
                        warn!("Building without a ready backend: {}", e);
                    }
                }
                match service.build_all().await {
                    Ok(report) => info!(
                        "✓ Startup build complete ({}% efficiency)",
                        report.metadata.efficiency
                    ),
                    Err(e) => error!("Startup build failed: {}", e),
                }
            });
        }
    }

    /// Drop expired runtime cache entries.
    pub fn sweep(&self) -> usize {
        let removed = self.resolver.cache().sweep_expired();
        if removed > 0 {
            info!("Swept {} expired runtime translations", removed);
        }
        removed
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(manager) = &self.manager {
            manager.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::replacements;
    use crate::state::InMemoryStateStore;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedUsers(HashMap<i64, String>);

    #[async_trait]
    impl UserLanguageLookup for FixedUsers {
        async fn language_of(&self, user_id: i64) -> Result<Option<String>> {
            if user_id < 0 {
                anyhow::bail!("connection reset");
            }
            Ok(self.0.get(&user_id).cloned())
        }
    }

    async fn service(dir: &TempDir, enabled: &[&str]) -> TranslationService {
        service_with_store(dir.path(), enabled).await
    }

    async fn service_with_store(
        store_dir: &std::path::Path,
        enabled: &[&str],
    ) -> TranslationService {
        let codes: Vec<String> = enabled.iter().map(|c| c.to_string()).collect();
        let registry = LanguageRegistry::load(Arc::new(InMemoryStateStore::new()), &codes)
            .await
            .unwrap();
        let mut fallback = FallbackDictionary::empty();
        fallback.insert("es", "Buy", "Comprar");
        fallback.insert("es", "Back", "Atrás");

        let resolver = Arc::new(
            Resolver::new(
                Arc::new(TemplateCatalogue::from_pairs([
                    ("welcome", "Welcome, {name}"),
                    ("buy_button", "Buy"),
                    ("back_button", "Back"),
                ])),
                Arc::new(registry),
                Arc::new(MemoryCache::default()),
            )
            .with_fallback(fallback),
        );
        let builder = Builder::new(
            Arc::clone(&resolver),
            PrebuiltStore::new(store_dir),
            BuildOptions::default(),
        );
        TranslationService::new(resolver, Arc::new(builder))
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn test_resolve_for_user() {
        let dir = TempDir::new().unwrap();
        let users = FixedUsers(HashMap::from([(42, "es".to_string())]));
        let service = service(&dir, &["en", "es"]).await.with_user_lookup(Arc::new(users));

        let r = Replacements::new();
        assert_eq!(service.resolve_for_user("buy_button", 42, &r).await, "Comprar");
        assert_eq!(service.resolve_for_user("buy_button", 7, &r).await, "Buy");
        assert_eq!(service.resolve_for_user("buy_button", -1, &r).await, "Buy");
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en", "es"]).await;

        let row = service
            .resolve_many(&["back_button", "buy_button"], "es", &Replacements::new())
            .await;
        assert_eq!(row, vec!["Atrás".to_string(), "Comprar".to_string()]);
    }

    #[tokio::test]
    async fn test_placeholders_applied_in_every_language() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en", "es"]).await;
        service.build_all().await.unwrap();

        let r = replacements([("name", "X")]);
        for lang in service.registry().enabled_codes() {
            let text = service.resolve("welcome", &lang, &r).await;
            assert_eq!(text.matches('X').count(), 1, "{}: {}", lang, text);
            assert!(!text.contains("{name}"));
        }
    }

    // ==================== Administration Tests ====================

    #[tokio::test]
    async fn test_enable_unknown_language() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en"]).await;

        let change = service.enable_language("xx").await;
        assert_eq!(
            change,
            LanguageChange {
                ok: false,
                recompiled: false,
                reason: Some("unknown_language".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_enable_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en"]).await;

        assert!(service.enable_language("ja").await.ok);
        assert!(service.enable_language("ja").await.ok);
        assert_eq!(service.registry().enabled_codes(), vec!["en", "ja"]);
    }

    #[tokio::test]
    async fn test_disable_source_language() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en", "es"]).await;

        let change = service.disable_language("en").await;
        assert!(!change.ok);
        assert_eq!(change.reason.as_deref(), Some("cannot_remove_source"));
    }

    #[tokio::test]
    async fn test_disable_falls_back_to_source() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en", "es"]).await;
        service.build_all().await.unwrap();

        let change = service.disable_language("es").await;
        assert!(change.ok);
        assert!(!change.recompiled);

        let r = Replacements::new();
        assert_eq!(
            service.resolve("buy_button", "es", &r).await,
            service.resolve("buy_button", "en", &r).await
        );
        assert!(!service.builder().store().load().await.data.contains_key("es"));
    }

    #[tokio::test]
    async fn test_disable_keeps_language_when_store_rewrite_fails() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("prebuilt");
        std::fs::write(&blocked, "not a directory").unwrap();
        let service = service_with_store(&blocked, &["en", "es"]).await;

        let change = service.disable_language("es").await;
        assert!(!change.ok);
        assert_eq!(change.reason.as_deref(), Some("persistence_failed"));

        // Nothing was half-removed: es is still enabled and still translated
        assert!(service.registry().is_enabled("es"));
        assert_eq!(
            service.resolve("buy_button", "es", &Replacements::new()).await,
            "Comprar"
        );
    }

    #[tokio::test]
    async fn test_connection_without_backend() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en"]).await;

        let report = service.test_connection().await;
        assert!(!report.probe.is_ready());
        assert!(report.backend_url.is_none());
    }

    #[tokio::test]
    async fn test_status_reports_languages() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, &["en", "es"]).await;

        let status = service.status().await;
        assert_eq!(status.enabled_languages, vec!["en", "es"]);
        assert_eq!(status.templates, 3);
        assert!(status.last_build.is_none());
        assert!(status
            .languages
            .iter()
            .any(|lang| lang.code == "es" && lang.enabled));
        assert!(status
            .languages
            .iter()
            .any(|lang| lang.code == "ja" && !lang.enabled));
    }

    #[tokio::test]
    async fn test_start_builds_when_store_empty() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service(&dir, &["en", "es"]).await);

        service.start().await;

        for _ in 0..100 {
            if dir.path().join("metadata.json").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // The build lock is released once the build returns
        let _guard = service.builder().begin().await;
        assert!(service.builder().store().load().await.data.contains_key("es"));
    }
}
