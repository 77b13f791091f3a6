//! Template catalogue: canonical English source text for every UI string.
//!
//! Keys are stable. Source text is never edited in place once released; a
//! wording change gets a new key so prebuilt translations of the old text are
//! not served for the new one.

use std::collections::BTreeMap;

/// Built-in storefront templates.
///
/// Strings may contain `{placeholder}` tokens and Telegram Markdown
/// (`*bold*`, `_italic_`, `` `code` ``, `[text](url)`).
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    // ==================== Welcome / Navigation ====================
    ("welcome", "👋 Welcome, {firstName}!"),
    (
        "welcome_intro",
        "Browse the catalogue, pay with crypto and receive your license key instantly.",
    ),
    ("main_menu", "Main menu"),
    ("back_button", "Back"),
    ("cancel_button", "Cancel"),
    ("help_button", "Help"),
    ("settings_button", "Settings"),
    ("support_button", "Support"),
    // ==================== Catalogue ====================
    ("catalog_title", "*Catalogue*"),
    ("catalog_empty", "There are no products available right now."),
    ("product_card", "*{productName}*\n{description}\n\nPrice: `{price}` {currency}"),
    ("product_out_of_stock", "Out of stock"),
    ("buy_button", "Buy"),
    ("details_button", "Details"),
    // ==================== Checkout ====================
    ("checkout_title", "*Checkout*"),
    ("payment_instructions", "Send *exactly* `{amount}` {currency} to _the address below_"),
    ("payment_address", "Address: `{address}`"),
    ("payment_expires", "This invoice expires in {minutes} minutes."),
    ("payment_waiting", "Waiting for payment…"),
    ("payment_confirmed", "✅ Payment confirmed!"),
    ("payment_expired", "⌛ The invoice has expired. Please create a new order."),
    ("check_payment_button", "Check payment"),
    // ==================== Orders / Keys ====================
    ("order_created", "Order #{orderId} created."),
    ("order_delivered", "Your license key for *{productName}*:\n`{licenseKey}`"),
    ("orders_title", "My orders"),
    ("orders_empty", "You have no orders yet."),
    ("key_activation_help", "Read the [activation guide]({guideUrl}) before using your key."),
    // ==================== Language ====================
    ("language_title", "Choose your language"),
    ("language_changed", "Language changed to {language}."),
    // ==================== Errors ====================
    ("error_generic", "❌ Something went wrong. Please try again later."),
    ("error_rate_limited", "Please slow down and try again in a moment."),
    ("error_not_found", "Not found."),
];

/// Read-only set of `{key: sourceText}`.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalogue {
    entries: BTreeMap<String, String>,
}

impl TemplateCatalogue {
    /// Catalogue with the built-in storefront templates.
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN_TEMPLATES.iter().copied())
    }

    /// Catalogue from arbitrary `(key, sourceText)` pairs. Later duplicates
    /// of a key are ignored.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = BTreeMap::new();
        for (key, source) in pairs {
            entries.entry(key.into()).or_insert_with(|| source.into());
        }
        Self { entries }
    }

    /// Source text of a template.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// `(key, sourceText)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The catalogue as a plain map, i.e. the `en` section of the prebuilt store.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.clone()
    }
}
