//! Fallback dictionary: hand-authored translations of common UI phrases.
//!
//! Used when nothing better is cached and the backend is unreachable, so the
//! most visible buttons are localized even on a cold start. Keys are the
//! English source text, exactly as written in the template catalogue.

use std::collections::HashMap;

type Table = &'static [(&'static str, &'static str)];

const RU: Table = &[
    ("Buy", "Купить"),
    ("Back", "Назад"),
    ("Cancel", "Отмена"),
    ("Help", "Помощь"),
    ("Settings", "Настройки"),
    ("Support", "Поддержка"),
    ("Main menu", "Главное меню"),
    ("Details", "Подробнее"),
    ("Out of stock", "Нет в наличии"),
    ("Check payment", "Проверить оплату"),
    ("My orders", "Мои заказы"),
    ("Choose your language", "Выберите язык"),
    ("Waiting for payment…", "Ожидание оплаты…"),
    ("Not found.", "Не найдено."),
    ("Language changed to {language}.", "Язык изменён на {language}."),
];

const UK: Table = &[
    ("Buy", "Купити"),
    ("Back", "Назад"),
    ("Cancel", "Скасувати"),
    ("Help", "Допомога"),
    ("Settings", "Налаштування"),
    ("Support", "Підтримка"),
    ("Main menu", "Головне меню"),
    ("Details", "Докладніше"),
    ("Out of stock", "Немає в наявності"),
    ("Check payment", "Перевірити оплату"),
    ("My orders", "Мої замовлення"),
    ("Choose your language", "Оберіть мову"),
    ("Waiting for payment…", "Очікування оплати…"),
    ("Not found.", "Не знайдено."),
    ("Language changed to {language}.", "Мову змінено на {language}."),
];

const ES: Table = &[
    ("Buy", "Comprar"),
    ("Back", "Atrás"),
    ("Cancel", "Cancelar"),
    ("Help", "Ayuda"),
    ("Settings", "Configuración"),
    ("Support", "Soporte"),
    ("Main menu", "Menú principal"),
    ("Details", "Detalles"),
    ("Out of stock", "Agotado"),
    ("Check payment", "Comprobar pago"),
    ("My orders", "Mis pedidos"),
    ("Choose your language", "Elige tu idioma"),
    ("Waiting for payment…", "Esperando el pago…"),
    ("Not found.", "No encontrado."),
    ("Language changed to {language}.", "Idioma cambiado a {language}."),
];

const FR: Table = &[
    ("Buy", "Acheter"),
    ("Back", "Retour"),
    ("Cancel", "Annuler"),
    ("Help", "Aide"),
    ("Settings", "Paramètres"),
    ("Support", "Assistance"),
    ("Main menu", "Menu principal"),
    ("Details", "Détails"),
    ("Out of stock", "En rupture de stock"),
    ("Check payment", "Vérifier le paiement"),
    ("My orders", "Mes commandes"),
    ("Choose your language", "Choisissez votre langue"),
    ("Waiting for payment…", "En attente du paiement…"),
    ("Not found.", "Introuvable."),
    ("Language changed to {language}.", "Langue changée en {language}."),
];

const DE: Table = &[
    ("Buy", "Kaufen"),
    ("Back", "Zurück"),
    ("Cancel", "Abbrechen"),
    ("Help", "Hilfe"),
    ("Settings", "Einstellungen"),
    ("Main menu", "Hauptmenü"),
    ("Out of stock", "Nicht vorrätig"),
    ("Check payment", "Zahlung prüfen"),
    ("My orders", "Meine Bestellungen"),
    ("Choose your language", "Wähle deine Sprache"),
    ("Waiting for payment…", "Warte auf Zahlung…"),
    ("Not found.", "Nicht gefunden."),
    ("Language changed to {language}.", "Sprache geändert zu {language}."),
];

const IT: Table = &[
    ("Buy", "Acquista"),
    ("Back", "Indietro"),
    ("Cancel", "Annulla"),
    ("Help", "Aiuto"),
    ("Settings", "Impostazioni"),
    ("Support", "Assistenza"),
    ("Main menu", "Menu principale"),
    ("Details", "Dettagli"),
    ("Out of stock", "Esaurito"),
    ("Check payment", "Verifica pagamento"),
    ("My orders", "I miei ordini"),
    ("Choose your language", "Scegli la tua lingua"),
    ("Not found.", "Non trovato."),
];

const PT: Table = &[
    ("Buy", "Comprar"),
    ("Back", "Voltar"),
    ("Cancel", "Cancelar"),
    ("Help", "Ajuda"),
    ("Settings", "Configurações"),
    ("Support", "Suporte"),
    ("Main menu", "Menu principal"),
    ("Details", "Detalhes"),
    ("Out of stock", "Esgotado"),
    ("Check payment", "Verificar pagamento"),
    ("My orders", "Meus pedidos"),
    ("Choose your language", "Escolha seu idioma"),
    ("Not found.", "Não encontrado."),
];

const TR: Table = &[
    ("Buy", "Satın al"),
    ("Back", "Geri"),
    ("Cancel", "İptal"),
    ("Help", "Yardım"),
    ("Settings", "Ayarlar"),
    ("Support", "Destek"),
    ("Main menu", "Ana menü"),
    ("Details", "Ayrıntılar"),
    ("Out of stock", "Stokta yok"),
    ("Check payment", "Ödemeyi kontrol et"),
    ("My orders", "Siparişlerim"),
    ("Choose your language", "Dilinizi seçin"),
];

const JA: Table = &[
    ("Buy", "購入"),
    ("Back", "戻る"),
    ("Cancel", "キャンセル"),
    ("Help", "ヘルプ"),
    ("Settings", "設定"),
    ("Support", "サポート"),
    ("Main menu", "メインメニュー"),
    ("Details", "詳細"),
    ("Out of stock", "在庫切れ"),
    ("Check payment", "支払いを確認"),
    ("My orders", "注文履歴"),
    ("Choose your language", "言語を選択してください"),
    ("Language changed to {language}.", "言語を{language}に変更しました。"),
];

const ZH: Table = &[
    ("Buy", "购买"),
    ("Back", "返回"),
    ("Cancel", "取消"),
    ("Help", "帮助"),
    ("Settings", "设置"),
    ("Support", "客服"),
    ("Main menu", "主菜单"),
    ("Details", "详情"),
    ("Out of stock", "缺货"),
    ("Check payment", "检查付款"),
    ("My orders", "我的订单"),
    ("Choose your language", "选择语言"),
];

const BUILTIN: &[(&str, Table)] = &[
    ("ru", RU),
    ("uk", UK),
    ("es", ES),
    ("fr", FR),
    ("de", DE),
    ("it", IT),
    ("pt", PT),
    ("tr", TR),
    ("ja", JA),
    ("zh", ZH),
];

/// `(language, English text) → translation` lookup table.
#[derive(Debug, Clone, Default)]
pub struct FallbackDictionary {
    by_language: HashMap<String, HashMap<String, String>>,
}

impl FallbackDictionary {
    /// Dictionary with the hand-authored phrases above.
    pub fn builtin() -> Self {
        let mut dictionary = Self::default();
        for (lang, table) in BUILTIN {
            for (source, translated) in table.iter() {
                dictionary.insert(lang, source, translated);
            }
        }
        dictionary
    }

    /// Dictionary with no entries (every lookup misses).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lang: &str, source: &str, translated: &str) {
        self.by_language
            .entry(lang.to_string())
            .or_default()
            .insert(source.to_string(), translated.to_string());
    }

    pub fn get(&self, lang: &str, source: &str) -> Option<&str> {
        self.by_language
            .get(lang)
            .and_then(|table| table.get(source))
            .map(String::as_str)
    }

    /// Number of phrases available for `lang`.
    pub fn coverage(&self, lang: &str) -> usize {
        self.by_language.get(lang).map(HashMap::len).unwrap_or(0)
    }
}
