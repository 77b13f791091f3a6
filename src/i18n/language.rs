//! Master language catalogue.
//!
//! Every language the storefront can ever offer is listed here. Which of them
//! are offered right now is decided by the `LanguageRegistry`; a code that is
//! not in this catalogue can never be enabled.

/// Code of the source language all templates are written in.
pub const SOURCE_LANGUAGE: &str = "en";

/// A language from the master catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Stable lowercase code understood by the translation backend (e.g. "en", "ru")
    pub code: &'static str,

    /// English display name (e.g. "Russian")
    pub name: &'static str,

    /// Name of the language in the language itself (e.g. "Русский")
    pub native_name: &'static str,

    /// Flag emoji shown on language-picker buttons
    pub flag: &'static str,
}

const CATALOGUE: &[Language] = &[
    Language {
        code: "en",
        name: "English",
        native_name: "English",
        flag: "🇬🇧",
    },
    Language {
        code: "ru",
        name: "Russian",
        native_name: "Русский",
        flag: "🇷🇺",
    },
    Language {
        code: "uk",
        name: "Ukrainian",
        native_name: "Українська",
        flag: "🇺🇦",
    },
    Language {
        code: "es",
        name: "Spanish",
        native_name: "Español",
        flag: "🇪🇸",
    },
    Language {
        code: "fr",
        name: "French",
        native_name: "Français",
        flag: "🇫🇷",
    },
    Language {
        code: "de",
        name: "German",
        native_name: "Deutsch",
        flag: "🇩🇪",
    },
    Language {
        code: "it",
        name: "Italian",
        native_name: "Italiano",
        flag: "🇮🇹",
    },
    Language {
        code: "pt",
        name: "Portuguese",
        native_name: "Português",
        flag: "🇵🇹",
    },
    Language {
        code: "tr",
        name: "Turkish",
        native_name: "Türkçe",
        flag: "🇹🇷",
    },
    Language {
        code: "ar",
        name: "Arabic",
        native_name: "العربية",
        flag: "🇸🇦",
    },
    Language {
        code: "zh",
        name: "Chinese",
        native_name: "中文",
        flag: "🇨🇳",
    },
    Language {
        code: "ja",
        name: "Japanese",
        native_name: "日本語",
        flag: "🇯🇵",
    },
    Language {
        code: "ko",
        name: "Korean",
        native_name: "한국어",
        flag: "🇰🇷",
    },
];

impl Language {
    /// Look up a language in the master catalogue.
    ///
    /// # Returns
    /// * `Some(&Language)` if the code is known
    /// * `None` otherwise (codes are matched case-sensitively)
    pub fn from_code(code: &str) -> Option<&'static Language> {
        CATALOGUE.iter().find(|lang| lang.code == code)
    }

    /// The source language (English).
    pub fn source() -> &'static Language {
        &CATALOGUE[0]
    }

    /// Every language in the master catalogue, source language first.
    pub fn all() -> &'static [Language] {
        CATALOGUE
    }

    /// Whether `code` is part of the master catalogue.
    pub fn is_known(code: &str) -> bool {
        Self::from_code(code).is_some()
    }

    /// Whether this is the source language.
    pub fn is_source(&self) -> bool {
        self.code == SOURCE_LANGUAGE
    }

    /// Button label, e.g. "🇷🇺 Русский".
    pub fn label(&self) -> String {
        format!("{} {}", self.flag, self.native_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_is_english() {
        let source = Language::source();
        assert_eq!(source.code, SOURCE_LANGUAGE);
        assert_eq!(source.name, "English");
        assert!(source.is_source());
    }

    #[test]
    fn test_from_code_known() {
        let russian = Language::from_code("ru").expect("ru should be in the catalogue");
        assert_eq!(russian.native_name, "Русский");
        assert!(!russian.is_source());
    }

    #[test]
    fn test_from_code_unknown() {
        assert!(Language::from_code("xx").is_none());
        assert!(Language::from_code("").is_none());
        assert!(Language::from_code("EN").is_none());
    }

    #[test]
    fn test_codes_are_unique_and_lowercase() {
        let mut codes: Vec<&str> = Language::all().iter().map(|l| l.code).collect();
        assert!(codes.iter().all(|c| c.chars().all(|ch| ch.is_ascii_lowercase())));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), Language::all().len());
    }

    #[test]
    fn test_label() {
        let french = Language::from_code("fr").unwrap();
        assert_eq!(french.label(), "🇫🇷 Français");
    }
}
