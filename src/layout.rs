//! Heuristic presentation surface for the rendered-height strategy.
//!
//! Lays page candidates out the way the reader displays them: word-wrapped
//! paragraphs, a fixed-height metadata pill row, separator rules, and images
//! scaled into the content box with a caption line.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::measure::{LayoutProfileId, PresentationSurface};
use crate::packer::{BlockContent, RenderBlock};
use crate::tokenizer::ImageRef;

const CAPTION_SCALE: f32 = 0.8;

/// Optional text measurement hook for glyph-accurate line fitting.
pub trait TextMeasurer: Send + Sync {
    /// Rendered width of `text` in pixels.
    fn measure_text_px(&self, text: &str, font_size_px: f32, family: FontFamily) -> f32;

    /// Distinguishes measurers in layout profiles.
    fn profile_tag(&self) -> &str {
        "custom"
    }
}

/// Generic font family used by the width model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFamily {
    Serif,
    Sans,
    Mono,
}

/// Page geometry and typography for the heuristic surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Viewport width in pixels.
    pub display_width: u32,
    /// Viewport height in pixels.
    pub display_height: u32,
    pub margin_left: u32,
    pub margin_right: u32,
    pub margin_top: u32,
    pub margin_bottom: u32,
    /// Body font size.
    pub font_size_px: f32,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    pub font_family: FontFamily,
    pub min_line_height_px: u32,
    pub max_line_height_px: u32,
    /// Vertical gap between consecutive blocks.
    pub block_gap_px: u32,
    /// Height of a section rule or star divider, including its margins.
    pub separator_height_px: u32,
    /// Height of the place/date pill row.
    pub metadata_height_px: u32,
    /// Reserve a caption line under every image.
    pub image_captions: bool,
    /// Maximum image height as a share of the content height.
    pub max_image_height_ratio: f32,
}

impl LayoutConfig {
    /// Convenience for a viewport size with sensible defaults.
    pub fn for_display(width: u32, height: u32) -> Self {
        Self {
            display_width: width,
            display_height: height,
            ..Self::default()
        }
    }

    pub fn with_font_size(mut self, font_size_px: f32) -> Self {
        self.font_size_px = font_size_px;
        self
    }

    pub fn with_margins(mut self, horizontal: u32, vertical: u32) -> Self {
        self.margin_left = horizontal;
        self.margin_right = horizontal;
        self.margin_top = vertical;
        self.margin_bottom = vertical;
        self
    }

    pub fn content_width(&self) -> u32 {
        self.display_width
            .saturating_sub(self.margin_left + self.margin_right)
            .max(1)
    }

    pub fn content_height(&self) -> u32 {
        self.display_height
            .saturating_sub(self.margin_top + self.margin_bottom)
            .max(1)
    }

    fn line_height_for(&self, font_size_px: f32) -> u32 {
        let min = self.min_line_height_px.min(self.max_line_height_px);
        let max = self.max_line_height_px.max(self.min_line_height_px);
        (font_size_px * self.line_height)
            .round()
            .clamp(min as f32, max as f32) as u32
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            display_width: 480,
            display_height: 800,
            margin_left: 28,
            margin_right: 28,
            margin_top: 40,
            margin_bottom: 56,
            font_size_px: 18.0,
            line_height: 1.5,
            font_family: FontFamily::Serif,
            min_line_height_px: 14,
            max_line_height_px: 48,
            block_gap_px: 12,
            separator_height_px: 36,
            metadata_height_px: 40,
            image_captions: true,
            max_image_height_ratio: 0.6,
        }
    }
}

/// Surface that estimates layout from a per-glyph width model.
#[derive(Clone)]
pub struct HeuristicSurface {
    cfg: LayoutConfig,
    text_measurer: Option<Arc<dyn TextMeasurer>>,
    profile: LayoutProfileId,
}

impl fmt::Debug for HeuristicSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeuristicSurface")
            .field("cfg", &self.cfg)
            .field("text_measurer", &self.text_measurer.is_some())
            .finish_non_exhaustive()
    }
}

impl HeuristicSurface {
    pub fn new(cfg: LayoutConfig) -> Self {
        Self {
            profile: LayoutProfileId::of_debug("heuristic", &cfg),
            cfg,
            text_measurer: None,
        }
    }

    /// Use `measurer` for text widths instead of the built-in model.
    pub fn with_text_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        let payload = format!("{}|{:?}", measurer.profile_tag(), self.cfg);
        self.profile = LayoutProfileId::of_debug("measured", &payload);
        self.text_measurer = Some(measurer);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.cfg
    }

    fn text_width(&self, text: &str, font_size_px: f32) -> f32 {
        match &self.text_measurer {
            Some(measurer) => measurer.measure_text_px(text, font_size_px, self.cfg.font_family),
            None => heuristic_text_width(text, font_size_px, self.cfg.font_family),
        }
    }

    /// Wrapped line count of one hard line.
    fn wrapped_lines(&self, line: &str) -> u32 {
        let max = self.cfg.content_width() as f32;
        let size = self.cfg.font_size_px;
        let space = self.text_width(" ", size);
        let mut lines = 1u32;
        let mut x = 0.0f32;
        for word in line.split_whitespace() {
            let w = self.text_width(word, size);
            if x > 0.0 && x + space + w > max {
                lines += 1;
                x = 0.0;
            } else if x > 0.0 {
                x += space;
            }
            if x == 0.0 && w > max {
                let spans = (w / max).ceil().max(1.0);
                lines += spans as u32 - 1;
                x = w - (spans - 1.0) * max;
            } else {
                x += w;
            }
        }
        lines
    }

    fn text_height(&self, text: &str) -> u32 {
        let lines: u32 = text
            .trim_end()
            .split('\n')
            .map(|line| self.wrapped_lines(line))
            .sum();
        lines * self.cfg.line_height_for(self.cfg.font_size_px)
    }

    /// Displayed `(width, height)` of an image, excluding its caption.
    pub fn image_box(&self, image: &ImageRef) -> (u32, u32) {
        let content_w = self.cfg.content_width().max(8) as f32;
        let content_h = self.cfg.content_height().max(16) as f32;
        let max_h = (content_h * self.cfg.max_image_height_ratio)
            .round()
            .clamp(40.0_f32.min(content_h), content_h);

        let dims = image.source.as_ref().and_then(|s| s.dimensions());
        let (w, h) = match dims {
            Some((w, h)) => {
                let (w, h) = (f32::from(w), f32::from(h));
                let scale = (content_w / w).min(max_h / h).min(1.0);
                ((w * scale).round().max(24.0), (h * scale).round().max(18.0))
            }
            None => {
                let w = (content_w * 0.72).round().clamp(60.0_f32.min(content_w), content_w);
                (w, (w * 0.62).round().clamp(36.0_f32.min(max_h), max_h))
            }
        };
        (w.min(content_w) as u32, h.min(max_h).max(18.0) as u32)
    }

    fn image_height(&self, image: &ImageRef) -> u32 {
        let (_, h) = self.image_box(image);
        if !self.cfg.image_captions {
            return h;
        }
        let caption_size = self.cfg.font_size_px * CAPTION_SCALE;
        h + 6 + self.cfg.line_height_for(caption_size)
    }

    fn block_height(&self, block: &RenderBlock) -> u32 {
        match &block.content {
            BlockContent::Metadata(_) => self.cfg.metadata_height_px,
            BlockContent::Separator(_) => self.cfg.separator_height_px,
            BlockContent::Image(image) => self.image_height(image),
            BlockContent::Text(slice) => self.text_height(slice.as_str()),
        }
    }
}

impl PresentationSurface for HeuristicSurface {
    fn measure_extent(&mut self, blocks: &[RenderBlock]) -> u32 {
        let gaps = blocks.len().saturating_sub(1) as u32 * self.cfg.block_gap_px;
        blocks.iter().map(|b| self.block_height(b)).sum::<u32>() + gaps
    }

    fn available_extent(&self) -> u32 {
        self.cfg.content_height()
    }

    fn profile(&self) -> LayoutProfileId {
        self.profile
    }
}

/// Width estimate from per-glyph classes and family modifiers.
pub fn heuristic_text_width(text: &str, font_size_px: f32, family: FontFamily) -> f32 {
    let em: f32 = match family {
        FontFamily::Mono => text
            .chars()
            .map(|ch| if ch == ' ' { 0.52 } else { 0.58 })
            .sum(),
        _ => text.chars().map(glyph_em_width).sum(),
    };
    let family_scale = match family {
        FontFamily::Serif => 1.03,
        FontFamily::Sans => 0.99,
        FontFamily::Mono => 1.0,
    };
    em * font_size_px * family_scale
}

fn glyph_em_width(ch: char) -> f32 {
    match ch {
        ' ' | '\u{00A0}' => 0.32,
        '\t' => 1.28,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}'..='\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        // Hebrew, CJK and other scripts: a conservative average.
        _ => 0.58,
    }
}
