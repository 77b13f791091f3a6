//! HTTP client for the machine-translation backend.
//!
//! Wire contract (LibreTranslate-compatible):
//! - `POST /translate` with `{q, source, target, format: "text"}` → `{translatedText}`
//! - `GET /languages` → `[{code, ...}]`
//!
//! The client is stateless and never retries; callers decide what a failure
//! means. The underlying `reqwest::Client` pools connections, so cloning a
//! `BackendClient` is cheap and shares the pool.

use crate::error::{TranslationError, TranslationResult};
use crate::i18n::SOURCE_LANGUAGE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Phrase used by the live-translation half of a probe.
const PROBE_TEXT: &str = "Hello";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    code: String,
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Backend answered and translated a phrase; `languages` are the codes it serves.
    Ready { languages: Vec<String> },
    NotReady { reason: String },
}

impl ProbeStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeStatus::Ready { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build translation backend HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Translate `text` from `source` to `target` within the per-call deadline.
    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> TranslationResult<String> {
        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
        };

        let response = self
            .http
            .post(format!("{}/translate", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(TranslationError::BackendBadResponse {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let parsed: TranslateResponse = serde_json::from_str(&body)
            .map_err(|e| TranslationError::BackendMalformed(e.to_string()))?;

        debug!("Backend translated {} chars {}→{}", text.len(), source, target);
        Ok(parsed.translated_text)
    }

    /// Codes of the languages the backend currently serves.
    pub async fn languages(&self) -> TranslationResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/languages", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(TranslationError::BackendBadResponse {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let entries: Vec<LanguageEntry> = serde_json::from_str(&body)
            .map_err(|e| TranslationError::BackendMalformed(e.to_string()))?;

        Ok(entries.into_iter().map(|entry| entry.code).collect())
    }

    /// Check that the backend answers and can actually translate.
    ///
    /// Lists the languages, then translates a short phrase into `target`, or
    /// into the first non-English language served when `target` is `None`.
    pub async fn probe(&self, target: Option<&str>) -> ProbeStatus {
        let languages = match self.languages().await {
            Ok(languages) => languages,
            Err(e) => {
                return ProbeStatus::NotReady {
                    reason: e.to_string(),
                }
            }
        };

        let target = match target {
            Some(target) => target.to_string(),
            None => match languages.iter().find(|code| code.as_str() != SOURCE_LANGUAGE) {
                Some(code) => code.clone(),
                None => {
                    return ProbeStatus::NotReady {
                        reason: "backend serves no target language".to_string(),
                    }
                }
            },
        };

        match self.translate(PROBE_TEXT, SOURCE_LANGUAGE, &target).await {
            Ok(translated) if !translated.trim().is_empty() => ProbeStatus::Ready { languages },
            Ok(_) => ProbeStatus::NotReady {
                reason: format!("backend returned an empty translation for '{}'", target),
            },
            Err(e) => ProbeStatus::NotReady {
                reason: e.to_string(),
            },
        }
    }

    fn classify(&self, error: reqwest::Error) -> TranslationError {
        if error.is_timeout() {
            TranslationError::BackendTimeout(self.timeout)
        } else if error.is_decode() {
            TranslationError::BackendMalformed(error.to_string())
        } else {
            TranslationError::BackendUnavailable(error.to_string())
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
