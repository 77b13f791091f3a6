//! `{placeholder}` handling.
//!
//! Substitution is a single left-to-right pass, so a replacement value that
//! itself looks like `{name}` is never expanded again.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Values substituted into `{name}` tokens.
pub type Replacements = HashMap<String, String>;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
    })
}

/// Replace every `{name}` with `replacements["name"]`. Unknown names stay verbatim.
pub fn apply_replacements(text: &str, replacements: &Replacements) -> String {
    if replacements.is_empty() || !text.contains('{') {
        return text.to_string();
    }

    placeholder_regex()
        .replace_all(text, |caps: &regex::Captures| match replacements.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder names in order of appearance (duplicates kept).
pub fn placeholder_names(text: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// True if `translated` carries exactly the same multiset of placeholders as `source`.
///
/// Machine translation occasionally drops or translates `{name}` tokens; such
/// output would leak a literal placeholder or lose a value, so it is rejected.
pub fn placeholders_preserved(source: &str, translated: &str) -> bool {
    let mut expected = placeholder_names(source);
    let mut actual = placeholder_names(translated);
    expected.sort_unstable();
    actual.sort_unstable();
    expected == actual
}

/// True if anything besides placeholders, digits, punctuation and symbols
/// is left, i.e. there is something a translator could change.
pub fn has_translatable_text(text: &str) -> bool {
    placeholder_regex()
        .replace_all(text, "")
        .chars()
        .any(char::is_alphabetic)
}

/// Build a `Replacements` map from string pairs.
pub fn replacements<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Replacements
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_has_translatable_text() {
        assert!(has_translatable_text("Buy"));
        assert!(has_translatable_text("Hello {name}"));
        assert!(!has_translatable_text("{amount} {currency}"));
        assert!(!has_translatable_text("⟦0⟧ ⟦1⟧ - 42!"));
        assert!(!has_translatable_text(""));
    }

    #[test]
    fn test_apply_single() {
        let r = replacements([("name", "Ada")]);
        assert_eq!(apply_replacements("Welcome, {name}", &r), "Welcome, Ada");
    }

    #[test]
    fn test_apply_repeated_and_unknown() {
        let r = replacements([("a", "1")]);
        assert_eq!(apply_replacements("{a}-{a}-{b}", &r), "1-1-{b}");
    }

    #[test]
    fn test_apply_does_not_expand_values() {
        let r = replacements([("a", "{b}"), ("b", "x")]);
        assert_eq!(apply_replacements("{a}", &r), "{b}");
    }

    #[test]
    fn test_apply_ignores_non_identifiers() {
        let r = replacements([("1", "x")]);
        assert_eq!(apply_replacements("{ a } {1}", &r), "{ a } {1}");
    }

    #[test]
    fn test_placeholder_names_order() {
        assert_eq!(
            placeholder_names("Send `{amount}` {currency} to {address}"),
            vec!["amount", "currency", "address"]
        );
    }

    #[test]
    fn test_placeholders_preserved() {
        assert!(placeholders_preserved("Hi {name}", "Привет, {name}"));
        assert!(!placeholders_preserved("Hi {name}", "Привет, {имя}"));
        assert!(!placeholders_preserved("Hi {name}", "Hi {name} {name}"));
        assert!(placeholders_preserved("No tokens", "Sin tokens"));
    }

    proptest! {
        #[test]
        fn prop_value_appears_once_and_token_disappears(
            prefix in "[a-zA-Z ,.!]{0,20}",
            suffix in "[a-zA-Z ,.!]{0,20}",
            value in "[A-Za-z0-9]{1,12}",
        ) {
            let template = format!("{}{{p}}{}", prefix, suffix);
            let r = replacements([("p", format!("<{}>", value))]);
            let rendered = apply_replacements(&template, &r);
            let marker = format!("<{}>", value);

            prop_assert_eq!(rendered.matches(&marker).count(), 1);
            prop_assert!(!rendered.contains("{p}"), "rendered output still contains the {{p}} token");
        }
    }
}
