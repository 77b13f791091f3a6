//! Markdown-safe translation.
//!
//! Telegram messages use a small Markdown dialect: `*bold*`, `_italic_`,
//! `` `code` ``, `[text](url)` and `~strikethrough~`. Machine translation
//! mangles those markers, so a string is translated in pieces:
//!
//! 1. the tokenizer splits it into plain text and spans;
//! 2. every span is replaced by a sentinel `⟦n⟧`, giving the skeleton;
//! 3. the skeleton is translated through the resolver;
//! 4. each span's content is translated on its own (recursively, so nested
//!    spans survive); code content and link URLs are never translated;
//! 5. the sentinels are replaced by the rebuilt spans.
//!
//! Input with an unclosed marker is logged and translated as plain text.
//! Input that already contains `⟦` or `⟧` skips the skeleton and is
//! translated one segment at a time.

use crate::i18n::{has_translatable_text, Replacements};
use crate::resolver::Resolver;
use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tracing::warn;

/// Characters that must be backslash-escaped to appear literally.
const SPECIAL_CHARS: [char; 19] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

const ZERO_WIDTH_CHARS: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

const SENTINEL_OPEN: char = '⟦';
const SENTINEL_CLOSE: char = '⟧';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Bold,
    Italic,
    Code,
    Link,
    Strikethrough,
}

impl SpanKind {
    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'*' => Some(SpanKind::Bold),
            b'_' => Some(SpanKind::Italic),
            b'~' => Some(SpanKind::Strikethrough),
            b'`' => Some(SpanKind::Code),
            _ => None,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            SpanKind::Bold => "*",
            SpanKind::Italic => "_",
            SpanKind::Code => "`",
            SpanKind::Strikethrough => "~",
            SpanKind::Link => "",
        }
    }
}

/// A formatted sub-range. `content` is the text between the markers (for a
/// link, the text between the brackets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub content: String,
    pub url: Option<String>,
}

impl Span {
    fn render(&self, content: &str) -> String {
        match (self.kind, &self.url) {
            (SpanKind::Link, Some(url)) => format!("[{}]({})", content, url),
            (kind, _) => format!("{}{}{}", kind.marker(), content, kind.marker()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Span(Span),
}

/// An opening marker without its closing counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unbalanced '{marker}' at byte {position}")]
pub struct Unbalanced {
    pub marker: char,
    pub position: usize,
}

/// Split `text` into plain text and top-level spans.
///
/// Backslash escapes and `{placeholder}` tokens are copied verbatim and
/// never open a span. `[` that does not start a complete `[text](url)` is
/// plain text. Doubled markers with nothing between them (`**`) are plain
/// text as well.
pub fn tokenize(text: &str) -> Result<Vec<Segment>, Unbalanced> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let end = char_end(text, i + 1);
                plain.push_str(&text[i..end]);
                i = end;
            }
            b'{' => {
                let end = placeholder_end(bytes, i).unwrap_or(i + 1);
                plain.push_str(&text[i..end]);
                i = end;
            }
            b'[' => match link_bounds(bytes, i) {
                Some((text_end, url_end)) => {
                    flush(&mut plain, &mut segments);
                    segments.push(Segment::Span(Span {
                        kind: SpanKind::Link,
                        content: text[i + 1..text_end].to_string(),
                        url: Some(text[text_end + 2..url_end].to_string()),
                    }));
                    i = url_end + 1;
                }
                None => {
                    plain.push('[');
                    i += 1;
                }
            },
            marker @ (b'*' | b'_' | b'~' | b'`') => {
                let close = if marker == b'`' {
                    find_byte(bytes, i + 1, b'`')
                } else {
                    find_closing(bytes, i + 1, marker)
                };
                let close = close.ok_or(Unbalanced {
                    marker: char::from(marker),
                    position: i,
                })?;

                if close == i + 1 {
                    plain.push_str(&text[i..=close]);
                } else if let Some(kind) = SpanKind::from_marker(marker) {
                    flush(&mut plain, &mut segments);
                    segments.push(Segment::Span(Span {
                        kind,
                        content: text[i + 1..close].to_string(),
                        url: None,
                    }));
                }
                i = close + 1;
            }
            _ => {
                let end = char_end(text, i);
                plain.push_str(&text[i..end]);
                i = end;
            }
        }
    }

    flush(&mut plain, &mut segments);
    Ok(segments)
}

fn flush(plain: &mut String, segments: &mut Vec<Segment>) {
    if !plain.is_empty() {
        segments.push(Segment::Text(std::mem::take(plain)));
    }
}

/// Byte index just past the character starting at `i` (or `text.len()`).
fn char_end(text: &str, i: usize) -> usize {
    text.get(i..)
        .and_then(|rest| rest.chars().next())
        .map_or(text.len(), |c| i + c.len_utf8())
}

/// End (exclusive) of a `{name}` token starting at `start`.
fn placeholder_end(bytes: &[u8], start: usize) -> Option<usize> {
    let first = *bytes.get(start + 1)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut j = start + 2;
    while let Some(&b) = bytes.get(j) {
        match b {
            b'}' => return Some(j + 1),
            b if b.is_ascii_alphanumeric() || b == b'_' => j += 1,
            _ => return None,
        }
    }
    None
}

fn find_byte(bytes: &[u8], from: usize, target: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == target)
        .map(|offset| from + offset)
}

/// Closing `marker` for a span opened just before `from`. Escapes,
/// placeholders and inline code are stepped over.
fn find_closing(bytes: &[u8], from: usize, marker: u8) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'{' => j = placeholder_end(bytes, j).unwrap_or(j + 1),
            b'`' => j = find_byte(bytes, j + 1, b'`').map_or(j + 1, |close| close + 1),
            b if b == marker => return Some(j),
            _ => j += 1,
        }
    }
    None
}

/// `(index of ']', index of ')')` for a `[text](url)` starting at `start`.
fn link_bounds(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let text_end = find_byte(bytes, start + 1, b']')?;
    if text_end == start + 1 || bytes.get(text_end + 1) != Some(&b'(') {
        return None;
    }
    let url_end = find_byte(bytes, text_end + 2, b')')?;
    (url_end > text_end + 2).then_some((text_end, url_end))
}

fn sentinel(index: usize) -> String {
    format!("{}{}{}", SENTINEL_OPEN, index, SENTINEL_CLOSE)
}

/// Skeleton text with one sentinel per span, plus the spans in order.
fn skeletonize(segments: Vec<Segment>) -> (String, Vec<Span>) {
    let mut skeleton = String::new();
    let mut spans = Vec::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => skeleton.push_str(&text),
            Segment::Span(span) => {
                skeleton.push_str(&sentinel(spans.len()));
                spans.push(span);
            }
        }
    }
    (skeleton, spans)
}

/// Every sentinel `0..count` appears exactly once.
fn sentinels_intact(text: &str, count: usize) -> bool {
    (0..count).all(|index| text.matches(&sentinel(index)).count() == 1)
}

/// Translate `text` into `lang` without disturbing its Markdown.
pub async fn translate_markdown(resolver: &Resolver, text: &str, lang: &str) -> String {
    if !resolver.translates_into(lang) {
        return text.to_string();
    }
    translate_fragment(resolver, text, lang).await
}

fn translate_fragment<'a>(
    resolver: &'a Resolver,
    text: &'a str,
    lang: &'a str,
) -> BoxFuture<'a, String> {
    async move {
        let segments = match tokenize(text) {
            Ok(segments) => segments,
            Err(unbalanced) => {
                warn!("Markdown unbalanced ({}), translating as plain text", unbalanced);
                return translate_plain(resolver, text, lang).await;
            }
        };

        if !segments.iter().any(|s| matches!(s, Segment::Span(_))) {
            return translate_plain(resolver, text, lang).await;
        }

        // Literal sentinel characters would be confused with the markers
        if text.contains([SENTINEL_OPEN, SENTINEL_CLOSE]) {
            return translate_segments(resolver, segments, lang).await;
        }

        let (skeleton, spans) = skeletonize(segments);
        let translated_skeleton = translate_plain(resolver, &skeleton, lang).await;
        let mut output = if sentinels_intact(&translated_skeleton, spans.len()) {
            translated_skeleton
        } else {
            warn!(
                "Translation of '{}' into {} lost span markers, keeping source skeleton",
                skeleton, lang
            );
            skeleton
        };

        for (index, span) in spans.iter().enumerate() {
            let rendered = translate_span(resolver, span, lang).await;
            output = output.replacen(&sentinel(index), &rendered, 1);
        }

        output
    }
    .boxed()
}

async fn translate_span(resolver: &Resolver, span: &Span, lang: &str) -> String {
    let content = match span.kind {
        SpanKind::Code => span.content.clone(),
        _ => translate_fragment(resolver, &span.content, lang).await,
    };
    span.render(&content)
}

/// Piece-by-piece translation: text runs and spans are translated on their
/// own and concatenated in source order. Word order across spans is lost.
async fn translate_segments(resolver: &Resolver, segments: Vec<Segment>, lang: &str) -> String {
    let mut output = String::new();
    for segment in &segments {
        match segment {
            Segment::Text(text) => output.push_str(&translate_plain(resolver, text, lang).await),
            Segment::Span(span) => output.push_str(&translate_span(resolver, span, lang).await),
        }
    }
    output
}

async fn translate_plain(resolver: &Resolver, text: &str, lang: &str) -> String {
    if !has_translatable_text(text) {
        return text.to_string();
    }

    // Surrounding whitespace is kept out of the lookup and restored afterwards
    let trimmed = text.trim();
    let start = text.len() - text.trim_start().len();
    let translated = resolver.resolve(trimmed, lang, &Replacements::new()).await;
    format!("{}{}{}", &text[..start], translated, &text[start + trimmed.len()..])
}

/// Repair common Markdown damage: collapse runs of three or more identical
/// markers to two, drop zero-width characters, and close markers left open.
pub fn sanitize_markdown(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut run: Option<(char, usize)> = None;

    for c in text.chars().filter(|c| !ZERO_WIDTH_CHARS.contains(c)) {
        let is_marker = matches!(c, '*' | '_' | '~' | '`');
        run = match run {
            Some((previous, count)) if previous == c && is_marker => Some((c, count + 1)),
            _ if is_marker => Some((c, 1)),
            _ => None,
        };
        if let Some((_, count)) = run {
            if count > 2 {
                continue;
            }
        }
        cleaned.push(c);
    }

    // Each appended marker balances the earliest unclosed one
    for _ in 0..cleaned.len() {
        match tokenize(&cleaned) {
            Ok(_) => break,
            Err(unbalanced) => cleaned.push(unbalanced.marker),
        }
    }
    cleaned
}

/// Backslash-escape every Markdown metacharacter so `text` renders literally.
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);

    for c in text.chars() {
        if SPECIAL_CHARS.contains(&c) {
            result.push('\\');
        }
        result.push(c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::i18n::{FallbackDictionary, LanguageRegistry, TemplateCatalogue};
    use crate::state::InMemoryStateStore;
    use proptest::prelude::*;
    use std::sync::Arc;

    async fn russian_resolver() -> Resolver {
        let registry = LanguageRegistry::load(
            Arc::new(InMemoryStateStore::new()),
            &["en".to_string(), "ru".to_string()],
        )
        .await
        .unwrap();
        let mut fallback = FallbackDictionary::empty();
        fallback.insert("ru", "exactly", "ровно");
        fallback.insert("ru", "address", "адрес");
        fallback.insert("ru", "Send ⟦0⟧ ⟦1⟧ BTC to ⟦2⟧", "Отправьте ⟦0⟧ ⟦1⟧ BTC на ⟦2⟧");
        fallback.insert("ru", "guide", "руководство");
        fallback.insert("ru", "Read the ⟦0⟧", "Прочитайте ⟦0⟧");
        fallback.insert("ru", "Hello", "Привет");
        fallback.insert("ru", "Lost ⟦0⟧", "Потеряно");
        fallback.insert("ru", "word", "слово");

        Resolver::new(
            Arc::new(TemplateCatalogue::from_pairs([("welcome", "Welcome")])),
            Arc::new(registry),
            Arc::new(MemoryCache::default()),
        )
        .with_fallback(fallback)
    }

    /// Span kinds with their nesting depth, in source order.
    fn structure(text: &str) -> Vec<(usize, SpanKind)> {
        fn walk(text: &str, depth: usize, out: &mut Vec<(usize, SpanKind)>) {
            for segment in tokenize(text).unwrap() {
                if let Segment::Span(span) = segment {
                    out.push((depth, span.kind));
                    if span.kind != SpanKind::Code {
                        walk(&span.content, depth + 1, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(text, 0, &mut out);
        out
    }

    // ==================== Tokenizer Tests ====================

    #[test]
    fn test_tokenize_all_span_kinds() {
        let segments = tokenize("a *b* _c_ `d` [e](http://x.io) ~f~").unwrap();
        let kinds: Vec<SpanKind> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Span(span) => Some(span.kind),
                Segment::Text(_) => None,
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                SpanKind::Bold,
                SpanKind::Italic,
                SpanKind::Code,
                SpanKind::Link,
                SpanKind::Strikethrough
            ]
        );
        assert!(segments.contains(&Segment::Span(Span {
            kind: SpanKind::Link,
            content: "e".to_string(),
            url: Some("http://x.io".to_string()),
        })));
    }

    #[test]
    fn test_tokenize_placeholder_with_underscore() {
        let segments = tokenize("Hi {first_name}, see {order_id}").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Text("Hi {first_name}, see {order_id}".to_string())]
        );
    }

    #[test]
    fn test_tokenize_escaped_marker_is_text() {
        let segments = tokenize(r"5 \* 3 = 15").unwrap();
        assert_eq!(segments, vec![Segment::Text(r"5 \* 3 = 15".to_string())]);
    }

    #[test]
    fn test_tokenize_code_hides_other_markers() {
        let segments = tokenize("*run `a*b` now*").unwrap();
        assert_eq!(segments.len(), 1);
        match &segments[0] {
            Segment::Span(span) => {
                assert_eq!(span.kind, SpanKind::Bold);
                assert_eq!(span.content, "run `a*b` now");
            }
            other => panic!("unexpected segment {:?}", other),
        }
    }

    #[test]
    fn test_tokenize_unbalanced() {
        assert_eq!(
            tokenize("Send *exactly now"),
            Err(Unbalanced {
                marker: '*',
                position: 5
            })
        );
        assert!(tokenize("open `code").is_err());
    }

    #[test]
    fn test_tokenize_brackets_without_url_are_text() {
        let segments = tokenize("Step [1] done").unwrap();
        assert_eq!(segments, vec![Segment::Text("Step [1] done".to_string())]);
    }

    // ==================== Translation Tests ====================

    #[tokio::test]
    async fn test_markdown_round_trip_with_inline_code() {
        let resolver = russian_resolver().await;
        let source = "Send *exactly* `{amount}` BTC to _address_";

        let translated = translate_markdown(&resolver, source, "ru").await;

        assert_eq!(translated, "Отправьте *ровно* `{amount}` BTC на _адрес_");
        assert_eq!(structure(&translated), structure(source));
    }

    #[tokio::test]
    async fn test_link_url_is_never_translated() {
        let resolver = russian_resolver().await;

        let source = "Read the [guide](https://example.com/guide)";
        let translated = translate_markdown(&resolver, source, "ru").await;
        assert_eq!(translated, "Прочитайте [руководство](https://example.com/guide)");
    }

    #[tokio::test]
    async fn test_nested_spans_translate_inside_out() {
        let resolver = russian_resolver().await;

        let translated = translate_markdown(&resolver, "*Hello _word_*", "ru").await;
        assert_eq!(structure(&translated), structure("*Hello _word_*"));
        assert!(translated.contains("_слово_"));
    }

    #[tokio::test]
    async fn test_lost_sentinel_keeps_source_skeleton() {
        let resolver = russian_resolver().await;

        let translated = translate_markdown(&resolver, "Lost *word*", "ru").await;
        assert_eq!(translated, "Lost *слово*");
    }

    #[tokio::test]
    async fn test_literal_sentinel_in_source_keeps_order() {
        let resolver = russian_resolver().await;

        let translated = translate_markdown(&resolver, "Use ⟦0⟧ and *bold*", "ru").await;
        assert_eq!(translated, "Use ⟦0⟧ and *bold*");

        let translated = translate_markdown(&resolver, "⟦0⟧ *word* ⟧", "ru").await;
        assert_eq!(translated, "⟦0⟧ *слово* ⟧");
    }

    #[tokio::test]
    async fn test_unbalanced_input_translated_as_plain_text() {
        let resolver = russian_resolver().await;

        assert_eq!(translate_markdown(&resolver, "*Hello", "ru").await, "*Hello");
    }

    #[tokio::test]
    async fn test_source_language_untouched() {
        let resolver = russian_resolver().await;
        let source = "Send *exactly* `{amount}` BTC";

        assert_eq!(translate_markdown(&resolver, source, "en").await, source);
    }

    // ==================== Sanitize / Escape Tests ====================

    #[test]
    fn test_sanitize_collapses_marker_runs() {
        assert_eq!(sanitize_markdown("***bold***"), "**bold**");
        assert_eq!(sanitize_markdown("a ____ b"), "a __ b");
    }

    #[test]
    fn test_sanitize_strips_zero_width() {
        assert_eq!(sanitize_markdown("Bu\u{200B}y\u{FEFF}"), "Buy");
    }

    #[test]
    fn test_sanitize_closes_open_markers() {
        assert_eq!(sanitize_markdown("Send *exactly"), "Send *exactly*");
        assert_eq!(sanitize_markdown("_a *b"), "_a *b_");
        assert!(tokenize(&sanitize_markdown("`x *y _z")).is_ok());
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("Price: 1.5 (approx)!"), r"Price: 1\.5 \(approx\)\!");
        assert_eq!(escape_markdown("plain"), "plain");
        assert_eq!(escape_markdown(r"a\b"), r"a\\b");
    }

    proptest! {
        #[test]
        fn prop_escaped_text_has_no_spans(text in "[ -~]{0,40}") {
            let escaped = escape_markdown(&text);
            let segments = tokenize(&escaped).unwrap();
            prop_assert!(segments.iter().all(|s| matches!(s, Segment::Text(_))));
        }

        #[test]
        fn prop_sanitized_text_tokenizes(text in "[a-z *_~`]{0,30}") {
            prop_assert!(tokenize(&sanitize_markdown(&text)).is_ok());
        }
    }
}
