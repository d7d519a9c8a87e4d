//! Journal text tokenizer.
//!
//! The markup convention is deliberately small:
//!
//! - blank lines separate paragraphs; single line breaks stay inside a paragraph
//! - a line made only of asterisks (at least [`TokenizerOptions::separator_min_stars`])
//!   is a section rule, a line holding a single `*` is a star divider
//! - `{image-N}` anywhere in a line references image `N`
//! - `Place: ...` / `Date: ...` on the first lines form the metadata head
//!
//! Tokenizing is pure and total: every input produces a token list.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

const IMAGE_OPEN: &str = "{image-";
const BYTE_ORDER_MARK: char = '\u{FEFF}';

/// Tokenizer behaviour switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerOptions {
    /// Minimum run of asterisks that forms a section rule.
    pub separator_min_stars: usize,
    /// Treat a line holding exactly one `*` as a star divider.
    pub star_divider: bool,
    /// Extract `Place:` / `Date:` lines at the start of the document.
    pub metadata_head: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            separator_min_stars: 6,
            star_divider: true,
            metadata_head: true,
        }
    }
}

impl TokenizerOptions {
    /// Override the asterisk threshold for section rules.
    pub fn with_separator_min_stars(mut self, stars: usize) -> Self {
        self.separator_min_stars = stars.max(1);
        self
    }

    /// Enable or disable the single-star divider.
    pub fn with_star_divider(mut self, enabled: bool) -> Self {
        self.star_divider = enabled;
        self
    }
}

/// Visual flavour of a separator token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorStyle {
    /// Horizontal section rule (`******`).
    Rule,
    /// Decorative single star divider (`*`).
    Star,
}

/// Leading place/date head of a journal entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub place: Option<String>,
    pub date: Option<String>,
}

impl Metadata {
    /// Label/value pairs in display order (date first, then place).
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.date
            .as_deref()
            .map(|date| ("Date", date))
            .into_iter()
            .chain(self.place.as_deref().map(|place| ("Place", place)))
    }

    pub fn is_empty(&self) -> bool {
        self.place.is_none() && self.date.is_none()
    }
}

/// Resolved storage location for an image reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Path or URL handed to the presentation layer.
    pub location: String,
    /// Intrinsic pixel width, when the header could be read.
    pub width: Option<u16>,
    /// Intrinsic pixel height, when the header could be read.
    pub height: Option<u16>,
}

impl ImageSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            width: None,
            height: None,
        }
    }

    pub fn with_dimensions(mut self, width: u16, height: u16) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn dimensions(&self) -> Option<(u16, u16)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

/// `{image-N}` reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Digits captured from the reference, kept verbatim.
    pub number: String,
    /// Set once an image resolver located the file.
    pub source: Option<ImageSource>,
}

impl ImageRef {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            source: None,
        }
    }

    /// File stem used on storage, e.g. `image-12`.
    pub fn stem(&self) -> String {
        format!("image-{}", self.number)
    }

    pub fn is_resolved(&self) -> bool {
        self.source.is_some()
    }
}

/// Parsed unit of a journal document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Token {
    Metadata(Metadata),
    Text(Arc<str>),
    Separator(SeparatorStyle),
    ImageRef(ImageRef),
}

impl Token {
    /// Atomic tokens are never split across pages.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn text(text: impl AsRef<str>) -> Self {
        Self::Text(Arc::from(text.as_ref()))
    }
}

/// Tokenize raw journal text.
pub fn tokenize(raw: &str, options: &TokenizerOptions) -> Vec<Token> {
    let normalized = normalize_newlines(raw);
    let mut lines = normalized.split('\n').peekable();
    let mut out = Vec::new();

    while lines.peek().is_some_and(|line| line.trim().is_empty()) {
        lines.next();
    }

    if options.metadata_head {
        let mut meta = Metadata::default();
        for _ in 0..2 {
            let Some(line) = lines.peek() else {
                break;
            };
            match parse_head_line(line) {
                Some(HeadField::Place(value)) if meta.place.is_none() => {
                    meta.place = Some(value.to_string())
                }
                Some(HeadField::Date(value)) if meta.date.is_none() => {
                    meta.date = Some(value.to_string())
                }
                _ => break,
            }
            lines.next();
        }
        if !meta.is_empty() {
            out.push(Token::Metadata(meta));
        }
    }

    let mut paragraph = String::new();
    for line in lines {
        if line.trim().is_empty() {
            flush_paragraph(&mut paragraph, &mut out);
            continue;
        }
        if let Some(style) = separator_style(line, options) {
            flush_paragraph(&mut paragraph, &mut out);
            out.push(Token::Separator(style));
            continue;
        }
        push_line(line.trim_end(), &mut paragraph, &mut out);
    }
    flush_paragraph(&mut paragraph, &mut out);

    log::trace!("tokenized {} bytes into {} tokens", raw.len(), out.len());
    out
}

fn normalize_newlines(raw: &str) -> String {
    let raw = raw.strip_prefix(BYTE_ORDER_MARK).unwrap_or(raw);
    if !raw.contains('\r') {
        return raw.to_string();
    }
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

enum HeadField<'a> {
    Place(&'a str),
    Date(&'a str),
}

fn parse_head_line(line: &str) -> Option<HeadField<'_>> {
    let (key, value) = line.trim().split_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let key = key.trim_end();
    if key.eq_ignore_ascii_case("place") {
        Some(HeadField::Place(value))
    } else if key.eq_ignore_ascii_case("date") {
        Some(HeadField::Date(value))
    } else {
        None
    }
}

fn separator_style(line: &str, options: &TokenizerOptions) -> Option<SeparatorStyle> {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b == b'*') {
        return None;
    }
    if trimmed.len() >= options.separator_min_stars.max(1) {
        return Some(SeparatorStyle::Rule);
    }
    if trimmed.len() == 1 && options.star_divider {
        return Some(SeparatorStyle::Star);
    }
    None
}

/// Append one content line, splitting it around image references.
fn push_line(line: &str, paragraph: &mut String, out: &mut Vec<Token>) {
    let mut rest = line;
    while let Some((before, number, after)) = next_image_ref(rest) {
        append_line(paragraph, before);
        flush_paragraph(paragraph, out);
        out.push(Token::ImageRef(ImageRef::new(number)));
        rest = after;
    }
    append_line(paragraph, rest);
}

fn append_line(paragraph: &mut String, line: &str) {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return;
    }
    if !paragraph.is_empty() {
        paragraph.push('\n');
    }
    paragraph.push_str(line);
}

fn flush_paragraph(paragraph: &mut String, out: &mut Vec<Token>) {
    let trimmed = paragraph.trim();
    if !trimmed.is_empty() {
        out.push(Token::text(trimmed));
    }
    paragraph.clear();
}

/// Find the first well-formed `{image-<digits>}` in `line`.
fn next_image_ref(line: &str) -> Option<(&str, &str, &str)> {
    let mut search_from = 0;
    while let Some(found) = line[search_from..].find(IMAGE_OPEN) {
        let open = search_from + found;
        let digits_start = open + IMAGE_OPEN.len();
        let digits_len = line[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let close = digits_start + digits_len;
        if digits_len > 0 && line[close..].starts_with('}') {
            return Some((&line[..open], &line[digits_start..close], &line[close + 1..]));
        }
        search_from = digits_start;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> TokenizerOptions {
        TokenizerOptions::default()
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().filter_map(Token::as_text).collect()
    }

    #[test]
    fn blank_lines_split_paragraphs_and_single_breaks_stay_inside() {
        let tokens = tokenize("first line\nsecond line\n\n\nthird", &opts());
        assert_eq!(texts(&tokens), vec!["first line\nsecond line", "third"]);
    }

    #[test]
    fn asterisk_run_at_threshold_is_a_rule() {
        let tokens = tokenize("before\n******\nafter", &opts());
        assert_eq!(
            tokens,
            vec![
                Token::text("before"),
                Token::Separator(SeparatorStyle::Rule),
                Token::text("after"),
            ]
        );
    }

    #[test]
    fn short_asterisk_run_stays_text() {
        let tokens = tokenize("*****", &opts());
        assert_eq!(tokens, vec![Token::text("*****")]);
    }

    #[test]
    fn separator_threshold_is_configurable() {
        let options = opts().with_separator_min_stars(8);
        let tokens = tokenize("******\n\n********", &options);
        assert_eq!(
            tokens,
            vec![
                Token::text("******"),
                Token::Separator(SeparatorStyle::Rule)
            ]
        );
    }

    #[test]
    fn lone_star_is_a_divider_unless_disabled() {
        let tokens = tokenize("a\n  *  \nb", &opts());
        assert_eq!(tokens[1], Token::Separator(SeparatorStyle::Star));

        let tokens = tokenize("a\n*\nb", &opts().with_star_divider(false));
        assert_eq!(tokens, vec![Token::text("a\n*\nb")]);
    }

    #[test]
    fn consecutive_separators_are_kept_independently() {
        let tokens = tokenize("******\n******\n*", &opts());
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(Token::is_atomic));
    }

    #[test]
    fn image_reference_splits_surrounding_text() {
        let tokens = tokenize("We arrived {image-12} at dusk", &opts());
        assert_eq!(
            tokens,
            vec![
                Token::text("We arrived"),
                Token::ImageRef(ImageRef::new("12")),
                Token::text("at dusk"),
            ]
        );
    }

    #[test]
    fn malformed_image_references_are_text() {
        let tokens = tokenize("{image-} {image-x1} {image-3", &opts());
        assert_eq!(tokens, vec![Token::text("{image-} {image-x1} {image-3")]);
    }

    #[test]
    fn adjacent_image_references_yield_separate_tokens() {
        let tokens = tokenize("{image-1}{image-2}", &opts());
        assert_eq!(
            tokens,
            vec![
                Token::ImageRef(ImageRef::new("1")),
                Token::ImageRef(ImageRef::new("2")),
            ]
        );
    }

    #[test]
    fn metadata_head_is_extracted_case_insensitively_in_either_order() {
        let tokens = tokenize("\n\ndate : 1993\nPLACE: Paris\n\nHello", &opts());
        assert_eq!(
            tokens[0],
            Token::Metadata(Metadata {
                place: Some("Paris".into()),
                date: Some("1993".into()),
            })
        );
        assert_eq!(texts(&tokens), vec!["Hello"]);
    }

    #[test]
    fn metadata_lines_in_the_body_are_plain_text() {
        let tokens = tokenize("Intro\n\nPlace: Rome", &opts());
        assert_eq!(texts(&tokens), vec!["Intro", "Place: Rome"]);
        assert!(!matches!(tokens[0], Token::Metadata(_)));
    }

    #[test]
    fn empty_metadata_value_is_not_metadata() {
        let tokens = tokenize("Place:\nbody", &opts());
        assert_eq!(tokens, vec![Token::text("Place:\nbody")]);
    }

    #[test]
    fn repeated_head_key_ends_the_head() {
        let tokens = tokenize("Place: A\nPlace: B", &opts());
        assert_eq!(
            tokens,
            vec![
                Token::Metadata(Metadata {
                    place: Some("A".into()),
                    date: None
                }),
                Token::text("Place: B"),
            ]
        );
    }

    #[test]
    fn metadata_entries_list_date_before_place() {
        let meta = Metadata {
            place: Some("Paris".into()),
            date: Some("1993".into()),
        };
        let entries: Vec<_> = meta.entries().collect();
        assert_eq!(entries, vec![("Date", "1993"), ("Place", "Paris")]);
    }

    #[test]
    fn crlf_and_bom_are_normalized() {
        let tokens = tokenize("\u{FEFF}one\r\ntwo\r\n\r\nthree", &opts());
        assert_eq!(texts(&tokens), vec!["one\ntwo", "three"]);
    }

    #[test]
    fn empty_and_whitespace_input_yield_no_tokens() {
        assert!(tokenize("", &opts()).is_empty());
        assert!(tokenize(" \n\t\n", &opts()).is_empty());
    }
}
