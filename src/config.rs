//! Aggregate, serde-loadable pager configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PagerError, Result};
use crate::layout::{HeuristicSurface, LayoutConfig};
use crate::measure::{BudgetConfig, BudgetOracle, BudgetUnit, RenderedHeightOracle};
use crate::navigator::GestureConfig;
use crate::reader::DynOracle;
use crate::session::SessionOptions;
use crate::tokenizer::TokenizerOptions;

/// Measurement strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum OracleConfig {
    /// Estimate cost from character or line budgets.
    Budget(BudgetConfig),
    /// Measure laid-out height on a heuristic surface.
    Rendered(LayoutConfig),
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self::Budget(BudgetConfig::default())
    }
}

impl OracleConfig {
    /// Instantiate the configured oracle.
    pub fn build(&self) -> DynOracle {
        match *self {
            Self::Budget(cfg) => Box::new(BudgetOracle::new(cfg)),
            Self::Rendered(cfg) => Box::new(RenderedHeightOracle::new(HeuristicSurface::new(cfg))),
        }
    }

    /// Same strategy sized for a new viewport.
    ///
    /// Character budgets follow the responsive width breakpoints, line
    /// budgets are kept, rendered layouts take the new display size.
    pub fn for_viewport(&self, width: u32, height: u32) -> Self {
        match *self {
            Self::Budget(cfg) => match cfg.unit {
                BudgetUnit::Characters => {
                    let sized = BudgetConfig::for_viewport_width(width);
                    Self::Budget(cfg.with_capacity(sized.capacity))
                }
                BudgetUnit::Lines { .. } => Self::Budget(cfg),
            },
            Self::Rendered(cfg) => Self::Rendered(LayoutConfig {
                display_width: width,
                display_height: height,
                ..cfg
            }),
        }
    }
}

/// Every knob of the pager in one place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    pub tokenizer: TokenizerOptions,
    pub oracle: OracleConfig,
    pub session: SessionOptions,
    pub gesture: GestureConfig,
}

impl PagerConfig {
    pub fn with_oracle(mut self, oracle: OracleConfig) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerOptions) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    pub fn with_gesture(mut self, gesture: GestureConfig) -> Self {
        self.gesture = gesture;
        self
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PagerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_json_str(&json)?;
        log::debug!("loaded pager config from {}", path.display());
        Ok(cfg)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build_oracle(&self) -> DynOracle {
        self.oracle.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MeasurementOracle;
    use crate::navigator::SwipeDirection;

    #[test]
    fn empty_object_is_the_default() {
        assert_eq!(PagerConfig::from_json_str("{}").unwrap(), PagerConfig::default());
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let cfg = PagerConfig::from_json_str(
            r#"{
                "tokenizer": { "separator_min_stars": 3 },
                "oracle": { "strategy": "budget", "unit": { "unit": "characters" }, "capacity": 900 },
                "gesture": { "forward": "right" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.tokenizer.separator_min_stars, 3);
        assert!(cfg.tokenizer.star_divider);
        let OracleConfig::Budget(budget) = cfg.oracle else {
            panic!("expected budget oracle");
        };
        assert_eq!(budget.unit, BudgetUnit::Characters);
        assert_eq!(budget.capacity, 900);
        assert_eq!(cfg.gesture.forward, SwipeDirection::Right);
        assert_eq!(cfg.gesture.distance_threshold, 60.0);
    }

    #[test]
    fn rendered_strategy_round_trips_through_json() {
        let cfg = PagerConfig::default()
            .with_oracle(OracleConfig::Rendered(LayoutConfig::for_display(390, 844)));
        let parsed = PagerConfig::from_json_str(&cfg.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = PagerConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, PagerError::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PagerConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PagerError::Io { .. }));
    }

    #[test]
    fn viewport_resizing_follows_width_breakpoints() {
        let narrow = OracleConfig::Budget(BudgetConfig::characters(2000)).for_viewport(390, 844);
        assert_eq!(narrow.build().capacity(), 1400);
        let wide = narrow.for_viewport(1280, 800);
        assert_eq!(wide.build().capacity(), 2400);
        assert_ne!(narrow.build().profile(), wide.build().profile());
    }
}
