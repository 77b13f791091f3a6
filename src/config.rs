use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Translation backend
    pub backend_url: String,
    pub backend_timeout: Duration,
    /// Command line that starts the backend; enables the lifecycle manager
    pub backend_command: Option<String>,
    pub backend_startup_timeout: Duration,

    // Builder
    pub build_call_timeout: Duration,
    pub build_call_delay: Duration,
    pub prebuilt_dir: PathBuf,
    /// Cron expression (with seconds) for periodic full rebuilds
    pub rebuild_schedule: Option<String>,

    // Languages and state
    pub initial_languages: Vec<String>,
    pub state_file: PathBuf,
    pub database_url: Option<String>,

    // Caches
    pub runtime_cache_ttl: Duration,

    // Admin API
    pub admin_api_key: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Translation backend
            backend_url: std::env::var("TRANSLATION_BACKEND_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),
            backend_timeout: Duration::from_secs(parse_or("BACKEND_TIMEOUT_SECS", 8)?),
            backend_command: optional("BACKEND_COMMAND"),
            backend_startup_timeout: Duration::from_secs(parse_or(
                "BACKEND_STARTUP_TIMEOUT_SECS",
                120,
            )?),

            // Builder
            build_call_timeout: Duration::from_secs(parse_or("BUILD_CALL_TIMEOUT_SECS", 10)?),
            build_call_delay: Duration::from_millis(parse_or("BUILD_CALL_DELAY_MS", 50)?),
            prebuilt_dir: std::env::var("PREBUILT_DIR")
                .unwrap_or_else(|_| "generated/translations".to_string())
                .into(),
            rebuild_schedule: optional("REBUILD_SCHEDULE"),

            // Languages and state
            initial_languages: std::env::var("INITIAL_LANGUAGES")
                .unwrap_or_else(|_| "en,ru".to_string())
                .split(',')
                .map(|code| code.trim().to_lowercase())
                .filter(|code| !code.is_empty())
                .collect(),
            state_file: std::env::var("STATE_FILE")
                .unwrap_or_else(|_| "data/state.json".to_string())
                .into(),
            database_url: optional("DATABASE_URL"),

            // Caches
            runtime_cache_ttl: Duration::from_secs(
                parse_or::<u64>("RUNTIME_CACHE_TTL_HOURS", 24)?
                    .checked_mul(60 * 60)
                    .context("RUNTIME_CACHE_TTL_HOURS is too large")?,
            ),

            // Admin API
            admin_api_key: optional("ADMIN_API_KEY"),
            port: parse_or("PORT", 8080)?,
        })
    }
}

/// Unset and empty variables both count as absent.
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", name, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 14] = [
        "TRANSLATION_BACKEND_URL",
        "BACKEND_TIMEOUT_SECS",
        "BACKEND_COMMAND",
        "BACKEND_STARTUP_TIMEOUT_SECS",
        "BUILD_CALL_TIMEOUT_SECS",
        "BUILD_CALL_DELAY_MS",
        "PREBUILT_DIR",
        "REBUILD_SCHEDULE",
        "INITIAL_LANGUAGES",
        "STATE_FILE",
        "DATABASE_URL",
        "RUNTIME_CACHE_TTL_HOURS",
        "ADMIN_API_KEY",
        "PORT",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.backend_url, "http://127.0.0.1:5000");
        assert_eq!(config.backend_timeout, Duration::from_secs(8));
        assert_eq!(config.build_call_timeout, Duration::from_secs(10));
        assert_eq!(config.build_call_delay, Duration::from_millis(50));
        assert_eq!(config.prebuilt_dir, PathBuf::from("generated/translations"));
        assert_eq!(config.initial_languages, vec!["en", "ru"]);
        assert_eq!(config.runtime_cache_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.port, 8080);
        assert!(config.backend_command.is_none());
        assert!(config.database_url.is_none());
        assert!(config.admin_api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("TRANSLATION_BACKEND_URL", "http://translate:5000");
        std::env::set_var("INITIAL_LANGUAGES", "EN, fr ,,ja");
        std::env::set_var("BUILD_CALL_DELAY_MS", "0");
        std::env::set_var("BACKEND_COMMAND", "libretranslate --load-only {languages}");
        std::env::set_var("ADMIN_API_KEY", "  ");

        let config = Config::from_env().unwrap();
        assert_eq!(config.backend_url, "http://translate:5000");
        assert_eq!(config.initial_languages, vec!["en", "fr", "ja"]);
        assert_eq!(config.build_call_delay, Duration::ZERO);
        assert_eq!(
            config.backend_command.as_deref(),
            Some("libretranslate --load-only {languages}")
        );
        assert!(config.admin_api_key.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_an_error() {
        clear_env();
        std::env::set_var("PORT", "eighty");

        let error = Config::from_env().unwrap_err();
        assert!(error.to_string().contains("PORT"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_oversized_cache_ttl_is_an_error() {
        clear_env();
        std::env::set_var("RUNTIME_CACHE_TTL_HOURS", "18446744073709551615");

        let error = Config::from_env().unwrap_err();
        assert!(error.to_string().contains("RUNTIME_CACHE_TTL_HOURS"));

        clear_env();
    }
}
