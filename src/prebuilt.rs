//! Prebuilt translation store: precomputed translations on disk.
//!
//! Layout of the store directory (`generated/translations/` by default):
//! - `all.json`: `{ "<lang>": { "<templateKey>": "<text>" } }`, authoritative
//! - `<lang>.json`: flat per-language view of `all.json`
//! - `metadata.json`: `BuildMetadata` of the last build
//!
//! Every file is written through a temporary sibling and a rename, so a
//! failed save leaves the previous file intact. Loading tolerates partial
//! stores: when `all.json` is missing or corrupt, the per-language files that
//! parse are used instead.

use crate::error::{TranslationError, TranslationResult};
use crate::i18n::{TemplateCatalogue, SOURCE_LANGUAGE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// `lang → templateKey → translated text`
pub type TranslationData = BTreeMap<String, BTreeMap<String, String>>;

const ALL_FILE: &str = "all.json";
const METADATA_FILE: &str = "metadata.json";

/// Summary of the last build, stored as `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub build_time: DateTime<Utc>,
    pub total_templates: usize,
    /// Languages in the store, source language included
    pub total_languages: usize,
    pub successful_translations: usize,
    pub failed_translations: usize,
    /// `successful / (successful + failed)` as a rounded percentage
    pub efficiency: u8,
    /// Build duration in milliseconds
    pub build_duration: u64,
    pub supported_languages: Vec<String>,
}

impl BuildMetadata {
    /// Compute metadata over the whole dataset.
    ///
    /// An entry counts as successful when it is non-empty and differs from
    /// the English source; anything else (missing, empty, equal to source)
    /// is a failure. Counting every target language on every build keeps
    /// `successful + failed == templates × (languages − 1)` true for partial
    /// builds as well.
    pub fn summarize(
        data: &TranslationData,
        catalogue: &TemplateCatalogue,
        duration: Duration,
    ) -> Self {
        let mut successful = 0;
        let mut failed = 0;

        for (lang, entries) in data {
            if lang == SOURCE_LANGUAGE {
                continue;
            }
            for (key, source) in catalogue.iter() {
                match entries.get(key) {
                    Some(text) if !text.trim().is_empty() && text != source => successful += 1,
                    _ => failed += 1,
                }
            }
        }

        let total = successful + failed;
        let efficiency = if total == 0 {
            100
        } else {
            ((successful as f64 / total as f64) * 100.0).round() as u8
        };

        let mut languages: Vec<String> = data.keys().cloned().collect();
        if !languages.iter().any(|l| l == SOURCE_LANGUAGE) {
            languages.insert(0, SOURCE_LANGUAGE.to_string());
        }

        Self {
            build_time: Utc::now(),
            total_templates: catalogue.len(),
            total_languages: languages.len(),
            successful_translations: successful,
            failed_translations: failed,
            efficiency,
            build_duration: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            supported_languages: languages,
        }
    }
}

/// Contents of the store as read from disk.
#[derive(Debug, Clone, Default)]
pub struct PrebuiltSnapshot {
    pub data: TranslationData,
    pub metadata: Option<BuildMetadata>,
}

impl PrebuiltSnapshot {
    /// True when no target language has any entry.
    pub fn is_empty(&self) -> bool {
        self.data
            .iter()
            .all(|(lang, entries)| lang == SOURCE_LANGUAGE || entries.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct PrebuiltStore {
    dir: PathBuf,
}

impl PrebuiltStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn language_path(&self, lang: &str) -> PathBuf {
        self.dir.join(format!("{}.json", lang))
    }

    /// Read whatever parses. Never fails; problems are logged.
    pub async fn load(&self) -> PrebuiltSnapshot {
        let data = match read_json::<TranslationData>(&self.dir.join(ALL_FILE)).await {
            Ok(Some(data)) => data,
            Ok(None) => self.load_language_files().await,
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", ALL_FILE, e);
                self.load_language_files().await
            }
        };

        let metadata = match read_json::<BuildMetadata>(&self.dir.join(METADATA_FILE)).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", METADATA_FILE, e);
                None
            }
        };

        info!(
            "Loaded prebuilt translations for {} language(s) from {}",
            data.len(),
            self.dir.display()
        );
        PrebuiltSnapshot { data, metadata }
    }

    async fn load_language_files(&self) -> TranslationData {
        let mut data = TranslationData::new();

        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!("No prebuilt directory at {}: {}", self.dir.display(), e);
                return data;
            }
        };

        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(lang) = file_name.strip_suffix(".json") else {
                continue;
            };
            if file_name == ALL_FILE || file_name == METADATA_FILE {
                continue;
            }

            match read_json::<BTreeMap<String, String>>(&path).await {
                Ok(Some(entries)) => {
                    data.insert(lang.to_string(), entries);
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable {}: {}", path.display(), e),
            }
        }

        data
    }

    /// Write `all.json`, then each `<lang>.json`, then `metadata.json`.
    ///
    /// Every file is staged next to its target first; nothing is renamed into
    /// place until all staged writes succeeded, so a failed save leaves the
    /// previous store untouched.
    pub async fn save(
        &self,
        data: &TranslationData,
        metadata: &BuildMetadata,
    ) -> TranslationResult<()> {
        let mut files = vec![(self.dir.join(ALL_FILE), to_pretty_json(data)?)];
        for (lang, entries) in data {
            files.push((self.language_path(lang), to_pretty_json(entries)?));
        }
        files.push((self.dir.join(METADATA_FILE), to_pretty_json(metadata)?));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(TranslationError::persistence)?;

        let mut staged = Vec::with_capacity(files.len());
        for (path, content) in &files {
            let tmp = staging_path(path);
            if let Err(e) = tokio::fs::write(&tmp, content).await {
                for leftover in staged.iter().chain(std::iter::once(&tmp)) {
                    let _ = tokio::fs::remove_file(leftover).await;
                }
                return Err(TranslationError::persistence(format!(
                    "failed to write {}: {}",
                    tmp.display(),
                    e
                )));
            }
            staged.push(tmp);
        }

        for ((path, _), tmp) in files.iter().zip(&staged) {
            tokio::fs::rename(tmp, path).await.map_err(|e| {
                TranslationError::persistence(format!("failed to move {}: {}", path.display(), e))
            })?;
        }

        debug!("Saved prebuilt translations to {}", self.dir.display());
        Ok(())
    }

    /// Delete the per-language file of a removed language.
    pub async fn remove_language_file(&self, lang: &str) -> TranslationResult<()> {
        match tokio::fs::remove_file(self.language_path(lang)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TranslationError::persistence(e)),
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// serde_json's pretty printer indents with two spaces
fn to_pretty_json<T: Serialize>(value: &T) -> TranslationResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(TranslationError::persistence)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
