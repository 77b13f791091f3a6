//! Distributed translation cache shared between bot processes.
//!
//! Keys are `<templateKey>:<lang>`, values are translated strings. Entries
//! have no TTL; they are overwritten by rebuilds and deleted when a language
//! is removed. The Postgres implementation lives in `db.rs`.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cache key for a template in a language.
pub fn cache_key(key: &str, lang: &str) -> String {
    format!("{}:{}", key, lang)
}

#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str, lang: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, lang: &str, value: &str) -> Result<()>;

    /// Store many `(templateKey, translated)` pairs for one language.
    async fn set_many(&self, lang: &str, entries: &[(String, String)]) -> Result<()>;

    /// Delete every entry of `lang`. Returns how many were removed.
    async fn purge_language(&self, lang: &str) -> Result<u64>;
}

/// Process-local stand-in used when no shared cache is configured, and in tests.
#[derive(Default)]
pub struct InMemoryDistributedCache {
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, lang: &str) -> usize {
        self.entries
            .read()
            .await
            .get(lang)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DistributedCache for InMemoryDistributedCache {
    async fn get(&self, key: &str, lang: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(lang)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn set(&self, key: &str, lang: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .entry(lang.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, lang: &str, entries: &[(String, String)]) -> Result<()> {
        let mut all = self.entries.write().await;
        let language = all.entry(lang.to_string()).or_default();
        for (key, value) in entries {
            language.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn purge_language(&self, lang: &str) -> Result<u64> {
        Ok(self
            .entries
            .write()
            .await
            .remove(lang)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }
}
