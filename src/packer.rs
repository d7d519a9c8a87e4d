//! Greedy page packer.
//!
//! Consumes tokens from a [`Cursor`] into one page at a time, consulting a
//! [`MeasurementOracle`] for every tentative addition. There is no
//! cross-page backtracking: once a page is closed it is final.
//!
//! Overflow policy:
//!
//! - an atomic block (metadata, separator, image) that does not fit a
//!   non-empty page is deferred whole to the next page
//! - an atomic block that does not fit an empty page is placed alone
//!   ([`Overflow::OversizedAtomic`])
//! - text is split at word boundaries, keeping whitespace with the preceding
//!   word, and the remainder continues on the next page
//! - a single word wider than an empty page is split at a character boundary
//!   ([`Overflow::HardSplit`]), always consuming at least one character

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::measure::MeasurementOracle;
use crate::tokenizer::{ImageRef, Metadata, SeparatorStyle, Token};

/// Position in a token stream: token index plus byte offset into a text token.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor {
    pub token: usize,
    pub offset: usize,
}

impl Cursor {
    pub const START: Cursor = Cursor {
        token: 0,
        offset: 0,
    };

    pub fn new(token: usize, offset: usize) -> Self {
        Self { token, offset }
    }

    fn next_token(self) -> Self {
        Self {
            token: self.token + 1,
            offset: 0,
        }
    }
}

/// Shared slice of a text token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSlice {
    source: Arc<str>,
    range: Range<usize>,
}

impl TextSlice {
    pub fn as_str(&self) -> &str {
        self.source.get(self.range.clone()).unwrap_or_default()
    }

    /// Byte range within the originating token.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// `true` when the slice covers its whole token.
    pub fn is_whole(&self) -> bool {
        self.range.start == 0 && self.range.end == self.source.len()
    }
}

/// Renderable payload of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockContent {
    Metadata(Metadata),
    Text(TextSlice),
    Separator(SeparatorStyle),
    Image(ImageRef),
}

/// Packer-level renderable unit derived from one token or a text fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderBlock {
    /// Index of the originating token.
    pub token_index: usize,
    pub content: BlockContent,
}

impl RenderBlock {
    pub fn new(token_index: usize, content: BlockContent) -> Self {
        Self {
            token_index,
            content,
        }
    }

    /// Text block covering `range` of `source`.
    pub fn text(token_index: usize, source: Arc<str>, range: Range<usize>) -> Self {
        Self::new(token_index, BlockContent::Text(TextSlice { source, range }))
    }

    fn from_atomic(token_index: usize, token: &Token) -> Option<Self> {
        let content = match token {
            Token::Metadata(meta) => BlockContent::Metadata(meta.clone()),
            Token::Separator(style) => BlockContent::Separator(*style),
            Token::ImageRef(image) => BlockContent::Image(image.clone()),
            Token::Text(_) => return None,
        };
        Some(Self::new(token_index, content))
    }

    pub fn is_atomic(&self) -> bool {
        !matches!(self.content, BlockContent::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            BlockContent::Text(slice) => Some(slice.as_str()),
            _ => None,
        }
    }

    /// Plain-text rendering used by dumps and logs.
    pub fn plain_text(&self) -> Cow<'_, str> {
        match &self.content {
            BlockContent::Text(slice) => Cow::Borrowed(slice.as_str().trim_end()),
            BlockContent::Separator(SeparatorStyle::Rule) => Cow::Borrowed("******"),
            BlockContent::Separator(SeparatorStyle::Star) => Cow::Borrowed("*"),
            BlockContent::Metadata(meta) => Cow::Owned(
                meta.entries()
                    .map(|(label, value)| format!("{label}: {value}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            BlockContent::Image(image) => match &image.source {
                Some(source) => Cow::Owned(format!("[{}: {}]", image.stem(), source.location)),
                None => Cow::Owned(format!("[{}]", image.stem())),
            },
        }
    }

    fn set_text_range(&mut self, range: Range<usize>) {
        if let BlockContent::Text(slice) = &mut self.content {
            slice.range = range;
        }
    }
}

/// Fallback policy that produced an over-capacity or split page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    /// A single atomic block larger than an empty page, placed alone.
    OversizedAtomic,
    /// A word larger than an empty page, split at a character boundary.
    HardSplit,
}

/// Blocks stored inline for typical pages.
pub type PageBlocks = SmallVec<[RenderBlock; 8]>;

/// One built page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// 0-based page index within the current layout generation.
    pub index: usize,
    pub blocks: PageBlocks,
    /// Cursor of the first consumed content.
    pub start: Cursor,
    /// Cursor just past the last consumed content.
    pub end: Cursor,
    pub overflow: Option<Overflow>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// `true` when `cursor` falls inside this page's consumed range.
    pub fn contains(&self, cursor: Cursor) -> bool {
        if self.start == self.end {
            return cursor == self.start;
        }
        self.start <= cursor && cursor < self.end
    }

    /// Blocks joined by blank lines.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(RenderBlock::plain_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result of one packing step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackStep {
    Page { page: Page, next: Cursor },
    EndOfStream,
}

enum TextFit {
    Whole,
    Partial(usize),
    Deferred,
    HardSplit(usize),
}

/// Greedy packer over a token slice with exclusive access to an oracle.
pub struct PagePacker<'a, O: ?Sized> {
    tokens: &'a [Token],
    oracle: &'a mut O,
}

impl<'a, O: MeasurementOracle + ?Sized> PagePacker<'a, O> {
    pub fn new(tokens: &'a [Token], oracle: &'a mut O) -> Self {
        Self { tokens, oracle }
    }

    /// Build the page starting at `cursor`.
    ///
    /// `page_index` is recorded on the page. An exhausted stream yields
    /// [`PackStep::EndOfStream`], except that an empty document yields one
    /// empty page at index 0.
    pub fn pack_next(&mut self, cursor: Cursor, page_index: usize) -> PackStep {
        let start = self.normalize(cursor);
        if start.token >= self.tokens.len() {
            if page_index == 0 && start == self.normalize(Cursor::START) {
                return PackStep::Page {
                    page: Page {
                        index: 0,
                        blocks: PageBlocks::new(),
                        start,
                        end: start,
                        overflow: None,
                    },
                    next: start,
                };
            }
            return PackStep::EndOfStream;
        }

        let tokens = self.tokens;
        let mut blocks = PageBlocks::new();
        let mut at = start;
        let mut overflow = None;
        while let Some(token) = tokens.get(at.token) {
            if let Token::Text(text) = token {
                match self.place_text(&mut blocks, at, text) {
                    TextFit::Whole => {
                        at = at.next_token();
                        continue;
                    }
                    TextFit::Partial(offset) => at.offset = offset,
                    TextFit::Deferred => {}
                    TextFit::HardSplit(offset) => {
                        overflow = Some(Overflow::HardSplit);
                        at.offset = offset;
                    }
                }
                break;
            }

            let Some(block) = RenderBlock::from_atomic(at.token, token) else {
                break;
            };
            blocks.push(block);
            if self.oracle.fits(&blocks) {
                at = at.next_token();
                continue;
            }
            if blocks.len() > 1 {
                blocks.pop();
            } else {
                overflow = Some(Overflow::OversizedAtomic);
                at = at.next_token();
            }
            break;
        }

        let next = self.normalize(at);
        let page = Page {
            index: page_index,
            blocks,
            start,
            end: next,
            overflow,
        };
        match page.overflow {
            Some(kind) => log::warn!(
                "page {page_index} exceeds capacity {} ({kind:?}, token {})",
                self.oracle.capacity(),
                start.token
            ),
            None => log::debug!(
                "packed page {page_index}: {} blocks, tokens {}..{}",
                page.blocks.len(),
                start.token,
                next.token
            ),
        }
        PackStep::Page { page, next }
    }

    /// Pack every remaining page from the start of the stream.
    pub fn pack_all(&mut self) -> Vec<Page> {
        let mut pages = Vec::new();
        let mut cursor = Cursor::START;
        while let PackStep::Page { page, next } = self.pack_next(cursor, pages.len()) {
            pages.push(page);
            if next.token >= self.tokens.len() {
                break;
            }
            cursor = next;
        }
        pages
    }

    /// Skip fully consumed text and stray offsets on atomic tokens.
    fn normalize(&self, cursor: Cursor) -> Cursor {
        match self.tokens.get(cursor.token) {
            Some(Token::Text(text)) if cursor.offset >= text.len() => cursor.next_token(),
            Some(Token::Text(_)) | None => cursor,
            Some(_) if cursor.offset > 0 => cursor.next_token(),
            Some(_) => cursor,
        }
    }

    fn place_text(&mut self, blocks: &mut PageBlocks, at: Cursor, text: &Arc<str>) -> TextFit {
        let end = text.len();
        blocks.push(RenderBlock::text(at.token, Arc::clone(text), at.offset..end));
        if self.oracle.fits(blocks) {
            return TextFit::Whole;
        }

        let words = word_starts(text, at.offset);
        if let Some(cut) = self.longest_fit(blocks, at.offset, &words) {
            set_last_range(blocks, at.offset..cut);
            return TextFit::Partial(cut);
        }
        if blocks.len() > 1 {
            blocks.pop();
            return TextFit::Deferred;
        }

        let word_end = words.first().copied().unwrap_or(end);
        let chars = char_ends(text, at.offset, word_end);
        let cut = self
            .longest_fit(blocks, at.offset, &chars)
            .or_else(|| chars.first().copied())
            .unwrap_or(end);
        set_last_range(blocks, at.offset..cut);
        TextFit::HardSplit(cut)
    }

    /// Largest cut in ascending `cuts` for which the page still fits.
    fn longest_fit(&mut self, blocks: &mut PageBlocks, from: usize, cuts: &[usize]) -> Option<usize> {
        let oracle = &mut *self.oracle;
        let fitting = cuts.partition_point(|&cut| {
            set_last_range(blocks, from..cut);
            oracle.fits(blocks)
        });
        fitting.checked_sub(1).and_then(|i| cuts.get(i).copied())
    }
}

fn set_last_range(blocks: &mut PageBlocks, range: Range<usize>) {
    if let Some(last) = blocks.last_mut() {
        last.set_text_range(range);
    }
}

/// Byte offsets after `from` where a word begins right after whitespace.
fn word_starts(text: &str, from: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut prev_space = false;
    for (i, ch) in text[from..].char_indices() {
        let space = ch.is_whitespace();
        if prev_space && !space {
            out.push(from + i);
        }
        prev_space = space;
    }
    out
}

/// Byte offsets just past each character of `text[from..to]`.
fn char_ends(text: &str, from: usize, to: usize) -> Vec<usize> {
    text[from..to]
        .char_indices()
        .map(|(i, ch)| from + i + ch.len_utf8())
        .collect()
}
