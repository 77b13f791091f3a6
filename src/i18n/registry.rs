//! Language registry: the authoritative set of enabled languages.
//!
//! The set lives in memory for lock-free-ish reads on the hot path and is
//! persisted to the host state store under `enabled_languages` after every
//! mutation. Persistence happens before the in-memory swap, so a failed write
//! leaves the registry unchanged.

use crate::error::{TranslationError, TranslationResult};
use crate::i18n::language::{Language, SOURCE_LANGUAGE};
use crate::state::StateStore;
use anyhow::{Context, Result};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// State store key holding the JSON array of enabled codes.
pub const ENABLED_LANGUAGES_KEY: &str = "enabled_languages";

pub struct LanguageRegistry {
    enabled: RwLock<Vec<String>>,
    store: Arc<dyn StateStore>,
    write_lock: Mutex<()>,
}

impl LanguageRegistry {
    /// Load the registry from the state store, seeding it from `initial` when
    /// nothing has been persisted yet.
    pub async fn load(store: Arc<dyn StateStore>, initial: &[String]) -> Result<Self> {
        let persisted = store
            .get(ENABLED_LANGUAGES_KEY)
            .await
            .context("Failed to read enabled languages")?;

        let (codes, seeded) = match persisted {
            Some(raw) => {
                let codes: Vec<String> = serde_json::from_str(&raw)
                    .context("Failed to parse persisted enabled languages")?;
                (normalize(codes), false)
            }
            None => (normalize(initial.to_vec()), true),
        };

        let registry = Self {
            enabled: RwLock::new(codes.clone()),
            store,
            write_lock: Mutex::new(()),
        };

        if seeded {
            registry
                .persist(&codes)
                .await
                .context("Failed to persist initial enabled languages")?;
            info!("Seeded language registry with {:?}", codes);
        } else {
            info!("Loaded language registry: {:?}", codes);
        }

        Ok(registry)
    }

    /// Whether `code` is currently enabled.
    pub fn is_enabled(&self, code: &str) -> bool {
        self.read().iter().any(|c| c == code)
    }

    /// Enabled codes, source language first.
    pub fn enabled_codes(&self) -> Vec<String> {
        self.read().clone()
    }

    /// Enabled codes excluding the source language (build targets).
    pub fn target_codes(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|c| c.as_str() != SOURCE_LANGUAGE)
            .cloned()
            .collect()
    }

    /// Every language of the master catalogue.
    pub fn all_available(&self) -> Vec<&'static Language> {
        Language::all().iter().collect()
    }

    /// Catalogue languages that are not enabled.
    pub fn disabled(&self) -> Vec<&'static Language> {
        let enabled = self.read();
        Language::all()
            .iter()
            .filter(|lang| !enabled.iter().any(|c| c == lang.code))
            .collect()
    }

    /// Enable `code`. Returns `true` if the language was newly added and
    /// `false` if it was already enabled (nothing is written in that case).
    pub async fn enable(&self, code: &str) -> TranslationResult<bool> {
        if !Language::is_known(code) {
            return Err(TranslationError::UnknownLanguage(code.to_string()));
        }

        let _guard = self.write_lock.lock().await;
        if self.is_enabled(code) {
            return Ok(false);
        }

        let mut next = self.enabled_codes();
        next.push(code.to_string());
        self.persist(&next)
            .await
            .map_err(TranslationError::persistence)?;
        *self.write() = next;

        info!("✓ Enabled language '{}'", code);
        Ok(true)
    }

    /// Disable `code`. Returns `true` if the language was removed and `false`
    /// if it was not enabled.
    pub async fn disable(&self, code: &str) -> TranslationResult<bool> {
        if code == SOURCE_LANGUAGE {
            return Err(TranslationError::CannotRemoveSource);
        }

        let _guard = self.write_lock.lock().await;
        if !self.is_enabled(code) {
            return Ok(false);
        }

        let next: Vec<String> = self
            .enabled_codes()
            .into_iter()
            .filter(|c| c != code)
            .collect();
        self.persist(&next)
            .await
            .map_err(TranslationError::persistence)?;
        *self.write() = next;

        info!("✓ Disabled language '{}'", code);
        Ok(true)
    }

    async fn persist(&self, codes: &[String]) -> Result<()> {
        let value = serde_json::to_string(codes)?;
        self.store.set(ENABLED_LANGUAGES_KEY, &value).await
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<String>> {
        self.enabled.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<String>> {
        self.enabled.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop unknown codes and duplicates, and put the source language first.
fn normalize(codes: Vec<String>) -> Vec<String> {
    let mut result = vec![SOURCE_LANGUAGE.to_string()];
    for code in codes {
        let code = code.trim().to_lowercase();
        if !Language::is_known(&code) {
            warn!("Ignoring unknown language code '{}' in registry state", code);
            continue;
        }
        if !result.contains(&code) {
            result.push(code);
        }
    }
    result
}
