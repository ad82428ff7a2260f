//! Edge filters applied to a fully confirmed setup
//!
//! Structure position is the only hard veto. Session time, volatility and
//! sweep quality degrade the score and log a warning but never reject; the
//! overall score likewise only warns when below `MIN_OVERALL_SCORE`.

pub mod structure;
pub mod sweep_quality;
pub mod time;
pub mod volatility;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use structure::{StructureCheck, StructureFilter};
pub use sweep_quality::SweepQualityScorer;
pub use time::{TimeFilter, TimeWindow};
pub use volatility::{DailyVix, StaticVix, VixSource, VolRegime, VolatilityFilter};

use crate::{detectors::LiquiditySweep, params::ModelParams, Direction, OHLCV};

/// Score given to a soft filter that did not pass
pub const DEGRADED_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterScores {
    pub time_score: f64,
    pub volatility_score: f64,
    pub structure_score: f64,
    /// 0..=10
    pub sweep_quality: f64,
    /// Mean of the time, volatility and structure scores
    pub overall_score: f64,
    pub vix: Option<f64>,
    pub range_position: Option<f64>,
}

/// The four edge filters with their thresholds
#[derive(Debug, Clone)]
pub struct FilterSuite {
    pub time: TimeFilter,
    pub volatility: VolatilityFilter,
    pub structure: StructureFilter,
    pub sweep_quality: SweepQualityScorer,
    pub min_sweep_quality: f64,
    pub min_overall_score: f64,
}

impl FilterSuite {
    pub fn new(params: &ModelParams, vix: Arc<dyn VixSource>) -> Self {
        Self {
            time: TimeFilter::default(),
            volatility: VolatilityFilter::new(params.max_vix_level, vix),
            structure: StructureFilter::default(),
            sweep_quality: SweepQualityScorer::default(),
            min_sweep_quality: params.min_sweep_quality,
            min_overall_score: params.min_overall_score,
        }
    }

    /// Score a confirmed setup. `None` means structure vetoed it.
    pub fn evaluate<T: OHLCV>(
        &self,
        current: &T,
        direction: Direction,
        entry: f64,
        sweep: &LiquiditySweep,
        ltf_bars: &[T],
    ) -> Option<FilterScores> {
        let time = current.time();

        let window = self.time.classify(time);
        let time_score = if window.is_tradeable() {
            debug!(?window, "time filter passed");
            window.quality_multiplier()
        } else {
            warn!(%time, "outside trading window, continuing with degraded score");
            DEGRADED_SCORE
        };

        let (regime, vix) = self.volatility.classify(time);
        let volatility_score = if regime.is_favorable() {
            debug!(?regime, ?vix, "volatility filter passed");
            regime.quality_multiplier()
        } else {
            warn!(?regime, ?vix, "volatility unfavourable, continuing with degraded score");
            DEGRADED_SCORE
        };

        let structure = self.structure.check(direction, entry, ltf_bars);
        if !structure.at_extreme {
            warn!(%direction, position = ?structure.position, "structure filter failed");
            return None;
        }

        let sweep_quality = self.sweep_quality.score_sweep(sweep, ltf_bars);
        if sweep_quality < self.min_sweep_quality {
            warn!(sweep_quality, min = self.min_sweep_quality, "low sweep quality");
        }

        let overall_score = (time_score + volatility_score + structure.score) / 3.0;
        if overall_score < self.min_overall_score {
            warn!(overall_score, min = self.min_overall_score, "low overall filter score");
        }

        Some(FilterScores {
            time_score,
            volatility_score,
            structure_score: structure.score,
            sweep_quality,
            overall_score,
            vix,
            range_position: structure.position,
        })
    }
}

/// Filter layer: either a full suite or nothing at all
#[derive(Debug, Clone, Default)]
pub enum EdgeFilters {
    Enabled(FilterSuite),
    #[default]
    Disabled,
}

impl EdgeFilters {
    /// Enabled when `USE_EDGE_FILTERS` is set
    pub fn from_params(params: &ModelParams, vix: Arc<dyn VixSource>) -> Self {
        if params.use_edge_filters {
            EdgeFilters::Enabled(FilterSuite::new(params, vix))
        } else {
            EdgeFilters::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, EdgeFilters::Enabled(_))
    }
}
