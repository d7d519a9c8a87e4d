//! Measurement oracles answering "does this candidate page fit?".
//!
//! The packer is written against [`MeasurementOracle`] only. Two strategies
//! are provided:
//!
//! - [`BudgetOracle`]: a cheap proxy cost (estimated lines or characters, with
//!   fixed weights for atomic blocks) compared against a per-page budget.
//! - [`RenderedHeightOracle`]: lays the candidate out on a
//!   [`PresentationSurface`] and compares the resulting extent.
//!
//! Oracles must be monotone: adding content to a candidate never turns a
//! "does not fit" into a "fits".

use serde::{Deserialize, Serialize};

use crate::packer::{BlockContent, RenderBlock};

/// Stable fingerprint of every layout-affecting oracle setting.
///
/// Two oracles with equal profiles paginate a document identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutProfileId(pub [u8; 32]);

impl LayoutProfileId {
    /// Build a deterministic profile id from arbitrary payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        const SEEDS: [u64; 4] = [
            0xcbf2_9ce4_8422_2325,
            0x9e37_79b9_7f4a_7c15,
            0xd6e8_feb8_6659_fd93,
            0xa076_1d64_78bd_642f,
        ];
        let mut out = [0u8; 32];
        for (lane, seed) in out.chunks_exact_mut(8).zip(SEEDS) {
            let hash = bytes.iter().fold(seed, |hash, b| {
                (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
            });
            lane.copy_from_slice(&hash.to_le_bytes());
        }
        Self(out)
    }

    /// Profile id of a `Debug`-printable configuration value.
    pub fn of_debug(tag: &str, config: &impl core::fmt::Debug) -> Self {
        let payload = format!("{tag}|{config:?}");
        Self::from_bytes(payload.as_bytes())
    }

    /// Short hex prefix for logs.
    pub fn short_hex(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Answers whether candidate page content fits the current capacity.
pub trait MeasurementOracle {
    /// `true` when `candidate` (a complete page in order) fits one page.
    fn fits(&mut self, candidate: &[RenderBlock]) -> bool;

    /// Per-page capacity in the oracle's own unit.
    fn capacity(&self) -> u32;

    /// Fingerprint of the layout-affecting configuration.
    fn profile(&self) -> LayoutProfileId;
}

impl<O: MeasurementOracle + ?Sized> MeasurementOracle for Box<O> {
    fn fits(&mut self, candidate: &[RenderBlock]) -> bool {
        (**self).fits(candidate)
    }

    fn capacity(&self) -> u32 {
        (**self).capacity()
    }

    fn profile(&self) -> LayoutProfileId {
        (**self).profile()
    }
}

/// Unit in which the budget oracle estimates text cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum BudgetUnit {
    /// Estimated wrapped lines: `ceil(chars / chars_per_line)` per source line.
    Lines { chars_per_line: u32 },
    /// Raw character count.
    Characters,
}

/// Budget strategy settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Cost unit for text.
    pub unit: BudgetUnit,
    /// Per-page budget.
    pub capacity: u32,
    /// Cost charged between two consecutive blocks.
    pub block_gap: u32,
    /// Cost of a section rule or star divider.
    pub separator_weight: u32,
    /// Cost of an image block.
    pub image_weight: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self::lines(24, 42)
    }
}

impl BudgetConfig {
    /// Line-based budget of `lines` lines of `chars_per_line` characters.
    pub fn lines(lines: u32, chars_per_line: u32) -> Self {
        Self {
            unit: BudgetUnit::Lines {
                chars_per_line: chars_per_line.max(1),
            },
            capacity: lines,
            block_gap: 1,
            separator_weight: 1,
            image_weight: (lines / 3).max(1),
        }
    }

    /// Character budget; blocks are joined by a two-character gap.
    pub fn characters(capacity: u32) -> Self {
        Self {
            unit: BudgetUnit::Characters,
            capacity,
            block_gap: 2,
            separator_weight: 22,
            image_weight: (capacity / 4).max(1),
        }
    }

    /// Responsive character budget for a viewport width in CSS pixels.
    pub fn for_viewport_width(width_px: u32) -> Self {
        let capacity = match width_px {
            0..=420 => 1400,
            421..=900 => 2000,
            _ => 2400,
        };
        Self::characters(capacity)
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_block_gap(mut self, gap: u32) -> Self {
        self.block_gap = gap;
        self
    }

    pub fn with_image_weight(mut self, weight: u32) -> Self {
        self.image_weight = weight;
        self
    }

    pub fn with_separator_weight(mut self, weight: u32) -> Self {
        self.separator_weight = weight;
        self
    }

    /// Cost of one block in isolation.
    pub fn block_cost(&self, block: &RenderBlock) -> u64 {
        match &block.content {
            BlockContent::Metadata(_) => 1,
            BlockContent::Separator(_) => u64::from(self.separator_weight),
            BlockContent::Image(_) => u64::from(self.image_weight),
            BlockContent::Text(slice) => self.text_cost(slice.as_str()),
        }
    }

    fn text_cost(&self, text: &str) -> u64 {
        let text = text.trim_end();
        match self.unit {
            BudgetUnit::Characters => text.chars().count() as u64,
            BudgetUnit::Lines { chars_per_line } => {
                let per_line = u64::from(chars_per_line.max(1));
                text.split('\n')
                    .map(|line| (line.chars().count() as u64).div_ceil(per_line).max(1))
                    .sum()
            }
        }
    }

    /// Cost of a whole candidate page, gaps included.
    pub fn page_cost(&self, blocks: &[RenderBlock]) -> u64 {
        let gaps = blocks.len().saturating_sub(1) as u64 * u64::from(self.block_gap);
        blocks.iter().map(|b| self.block_cost(b)).sum::<u64>() + gaps
    }
}

/// Cheap proxy-cost oracle.
#[derive(Clone, Debug)]
pub struct BudgetOracle {
    cfg: BudgetConfig,
    profile: LayoutProfileId,
}

impl BudgetOracle {
    pub fn new(cfg: BudgetConfig) -> Self {
        Self {
            profile: LayoutProfileId::of_debug("budget", &cfg),
            cfg,
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.cfg
    }
}

impl Default for BudgetOracle {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

impl MeasurementOracle for BudgetOracle {
    fn fits(&mut self, candidate: &[RenderBlock]) -> bool {
        self.cfg.page_cost(candidate) <= u64::from(self.cfg.capacity)
    }

    fn capacity(&self) -> u32 {
        self.cfg.capacity
    }

    fn profile(&self) -> LayoutProfileId {
        self.profile
    }
}

/// Off-flow presentation container used by the rendered-height strategy.
pub trait PresentationSurface {
    /// Laid-out extent of `blocks` stacked as one page.
    fn measure_extent(&mut self, blocks: &[RenderBlock]) -> u32;

    /// Extent available for page content.
    fn available_extent(&self) -> u32;

    /// Fingerprint of layout-affecting surface settings.
    fn profile(&self) -> LayoutProfileId;
}

/// Oracle that measures candidates on a presentation surface.
#[derive(Clone, Debug)]
pub struct RenderedHeightOracle<S> {
    surface: S,
}

impl<S: PresentationSurface> RenderedHeightOracle<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}

impl<S: PresentationSurface> MeasurementOracle for RenderedHeightOracle<S> {
    fn fits(&mut self, candidate: &[RenderBlock]) -> bool {
        self.surface.measure_extent(candidate) <= self.surface.available_extent()
    }

    fn capacity(&self) -> u32 {
        self.surface.available_extent()
    }

    fn profile(&self) -> LayoutProfileId {
        self.surface.profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{ImageRef, Metadata, SeparatorStyle};
    use std::sync::Arc;

    fn text(s: &str) -> RenderBlock {
        RenderBlock::text(0, Arc::from(s), 0..s.len())
    }

    #[test]
    fn profile_ids_are_stable_and_distinguish_configs() {
        let a = BudgetOracle::new(BudgetConfig::characters(300));
        let b = BudgetOracle::new(BudgetConfig::characters(300));
        let c = BudgetOracle::new(BudgetConfig::characters(301));
        assert_eq!(a.profile(), b.profile());
        assert_ne!(a.profile(), c.profile());
        assert_eq!(a.profile().short_hex().len(), 8);
    }

    #[test]
    fn viewport_width_selects_character_target() {
        assert_eq!(BudgetConfig::for_viewport_width(375).capacity, 1400);
        assert_eq!(BudgetConfig::for_viewport_width(420).capacity, 1400);
        assert_eq!(BudgetConfig::for_viewport_width(768).capacity, 2000);
        assert_eq!(BudgetConfig::for_viewport_width(1280).capacity, 2400);
    }

    #[test]
    fn metadata_always_costs_one_unit() {
        let cfg = BudgetConfig::characters(10);
        let block = RenderBlock::new(
            0,
            BlockContent::Metadata(Metadata {
                place: Some("A very long place name".into()),
                date: None,
            }),
        );
        assert_eq!(cfg.block_cost(&block), 1);
    }

    #[test]
    fn line_budget_counts_wrapped_and_hard_lines() {
        let cfg = BudgetConfig::lines(10, 10);
        assert_eq!(cfg.block_cost(&text("0123456789")), 1);
        assert_eq!(cfg.block_cost(&text("0123456789a")), 2);
        assert_eq!(cfg.block_cost(&text("a\nb\n\nc")), 4);
    }

    #[test]
    fn trailing_whitespace_is_free() {
        let cfg = BudgetConfig::characters(5);
        assert_eq!(cfg.block_cost(&text("abc   ")), 3);
    }

    #[test]
    fn page_cost_includes_gaps_between_blocks() {
        let cfg = BudgetConfig::characters(100).with_image_weight(10);
        let blocks = [
            text("abcd"),
            RenderBlock::new(1, BlockContent::Image(ImageRef::new("1"))),
            RenderBlock::new(2, BlockContent::Separator(SeparatorStyle::Rule)),
        ];
        assert_eq!(cfg.page_cost(&blocks), 4 + 10 + 22 + 2 * 2);
    }

    #[test]
    fn budget_oracle_fits_up_to_capacity_inclusive() {
        let mut oracle = BudgetOracle::new(BudgetConfig::characters(4));
        assert!(oracle.fits(&[text("abcd")]));
        assert!(!oracle.fits(&[text("abcde")]));
        assert!(oracle.fits(&[]));
    }
}
