use std::path::Path;
use std::sync::Arc;

use diary_pager::{
    BlockContent, BudgetConfig, BudgetOracle, Page, PaginationSession, Token,
};

const WORDS: &[&str] = &[
    "we", "walked", "along", "the", "old", "harbour", "wall", "towards", "a", "bakery",
    "that", "grandmother", "remembered", "from", "before", "the", "war",
];

/// Deterministic prose of exactly `chars` bytes, ending on a letter.
pub fn prose(chars: usize, seed: usize) -> String {
    let mut out = String::with_capacity(chars + 16);
    let mut i = seed;
    while out.len() < chars {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(WORDS[i % WORDS.len()]);
        i += 7;
    }
    out.truncate(chars);
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    while out.len() < chars {
        out.push('x');
    }
    out
}

/// Journal with a metadata head, `sections` sections of `paragraphs` each,
/// separated by rules, with an image reference after every section.
pub fn journal(sections: usize, paragraphs: usize) -> String {
    let mut out = String::from("Place: Vilnius\nDate: 1991\n\n");
    for s in 0..sections {
        if s > 0 {
            out.push_str("******\n\n");
        }
        for p in 0..paragraphs {
            out.push_str(&prose(120 + (s * 31 + p * 17) % 240, s * 13 + p));
            out.push_str("\n\n");
        }
        out.push_str(&format!("{{image-{}}}\n\n", s + 1));
        out.push_str("*\n\n");
    }
    out
}

pub fn chars_session(tokens: Vec<Token>, capacity: u32) -> PaginationSession<BudgetOracle> {
    PaginationSession::new(tokens, BudgetOracle::new(BudgetConfig::characters(capacity)))
}

/// Text ranges each page holds for `token`, in page order.
pub fn text_ranges(pages: &[Page], token: usize) -> Vec<std::ops::Range<usize>> {
    pages
        .iter()
        .flat_map(|page| page.blocks.iter())
        .filter(|block| block.token_index == token)
        .filter_map(|block| match &block.content {
            BlockContent::Text(slice) => Some(slice.range()),
            _ => None,
        })
        .collect()
}

/// Token indices in the order blocks appear across pages, deduplicated
/// for consecutive fragments of the same token.
pub fn token_order(pages: &[Page]) -> Vec<usize> {
    let mut order: Vec<usize> = Vec::new();
    for block in pages.iter().flat_map(|page| page.blocks.iter()) {
        if order.last() != Some(&block.token_index) {
            order.push(block.token_index);
        }
    }
    order
}

pub fn text_of(token: &Token) -> Option<Arc<str>> {
    match token {
        Token::Text(text) => Some(Arc::clone(text)),
        _ => None,
    }
}

/// Minimal PNG header with the given dimensions.
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

/// Lay out `<root>/<id>/book.txt` and `<root>/<id>/images/`.
pub fn write_book(root: &Path, id: &str, text: &str, images: &[(&str, Vec<u8>)]) {
    let book = root.join(id);
    std::fs::create_dir_all(book.join("images")).unwrap();
    std::fs::write(book.join("book.txt"), text).unwrap();
    for (name, bytes) in images {
        std::fs::write(book.join("images").join(name), bytes).unwrap();
    }
}
