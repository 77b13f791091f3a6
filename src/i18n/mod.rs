//! Internationalization (i18n) data and registry.
//!
//! # Architecture
//!
//! - `language`: master catalogue of every language the storefront can offer
//! - `registry`: the persisted set of currently enabled languages
//! - `templates`: canonical English source text keyed by template key
//! - `fallback`: hand-authored translations of common phrases
//! - `placeholders`: `{name}` substitution and preservation checks
//! - `metrics`: lookup and backend counters
//!
//! # Example
//!
//! ```rust,ignore
//! use storefront_translations::i18n::{Language, TemplateCatalogue};
//!
//! let russian = Language::from_code("ru").unwrap();
//! let welcome = TemplateCatalogue::builtin().get("welcome");
//! ```

mod fallback;
mod language;
mod metrics;
mod placeholders;
mod registry;
mod templates;

pub use fallback::FallbackDictionary;
pub use language::{Language, SOURCE_LANGUAGE};
pub use metrics::{MetricsReport, Tier, TranslationMetrics};
pub use placeholders::{
    apply_replacements, has_translatable_text, placeholder_names, placeholders_preserved,
    replacements, Replacements,
};
pub use registry::{LanguageRegistry, ENABLED_LANGUAGES_KEY};
pub use templates::TemplateCatalogue;
