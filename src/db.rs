//! Postgres persistence: host state, the shared translation cache and the
//! bot's user table (read-only, for preferred languages).

use crate::cache::{cache_key, DistributedCache};
use crate::retry::{with_retry, RetryConfig};
use crate::service::UserLanguageLookup;
use crate::state::StateStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect (retrying while Postgres comes up) and create missing tables.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = with_retry(
            &RetryConfig::database_connect(),
            "Database connection",
            || {
                PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(database_url)
            },
        )
        .await
        .context("Failed to connect to database")?;

        let db = Self { pool };
        db.init_schema().await?;
        info!("✓ Connected to database");
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create app_state table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS translation_cache (
                cache_key TEXT PRIMARY KEY,
                language TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create translation_cache table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_translation_cache_language
             ON translation_cache (language)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create translation_cache index")?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StateStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM app_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read state '{}'", key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_state (key, value, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write state '{}'", key))?;
        Ok(())
    }
}

const UPSERT_CACHE_ENTRY: &str =
    "INSERT INTO translation_cache (cache_key, language, value, updated_at)
     VALUES ($1, $2, $3, NOW())
     ON CONFLICT (cache_key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()";

#[async_trait]
impl DistributedCache for Database {
    async fn get(&self, key: &str, lang: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM translation_cache WHERE cache_key = $1")
            .bind(cache_key(key, lang))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read translation cache")
    }

    async fn set(&self, key: &str, lang: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_CACHE_ENTRY)
            .bind(cache_key(key, lang))
            .bind(lang)
            .bind(value)
            .execute(&self.pool)
            .await
            .context("Failed to write translation cache")?;
        Ok(())
    }

    async fn set_many(&self, lang: &str, entries: &[(String, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;
        for (key, value) in entries {
            sqlx::query(UPSERT_CACHE_ENTRY)
                .bind(cache_key(key, lang))
                .bind(lang)
                .bind(value)
                .execute(&mut *tx)
                .await
                .context("Failed to write translation cache")?;
        }
        tx.commit().await.context("Failed to commit translation cache")?;
        Ok(())
    }

    async fn purge_language(&self, lang: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM translation_cache WHERE language = $1")
            .bind(lang)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to purge cached '{}' translations", lang))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserLanguageLookup for Database {
    async fn language_of(&self, user_id: i64) -> Result<Option<String>> {
        let language: Option<Option<String>> =
            sqlx::query_scalar("SELECT language_code FROM users WHERE telegram_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to look up user language")?;
        Ok(language.flatten())
    }
}
