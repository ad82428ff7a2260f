//! Inverse fair value gaps on the lower timeframe (confirmation stage 3)
//!
//! An inversion is a three-bar gap that the following bar closes straight
//! through. For a short, a bullish gap must fail (close below its bottom);
//! for a long, a bearish gap must fail (close above its top).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{fvg::FvgKind, helpers};
use crate::{params::ModelParams, Direction, OHLCV};

/// Bars examined: a gap triple plus the inverting bar
pub const IFVG_WINDOW: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IfvgInversion {
    /// Kind of the gap that was disrespected
    pub disrespected: FvgKind,
    pub fvg_top: f64,
    pub fvg_bottom: f64,
    pub inversion_close: f64,
    pub inversion_time: DateTime<Utc>,
    pub direction: Direction,
}

/// Stateless inverse-FVG detector
#[derive(Debug, Clone)]
pub struct IfvgDetector {
    pub min_size_ticks: u32,
}

impl Default for IfvgDetector {
    fn default() -> Self {
        Self::from_params(&ModelParams::default())
    }
}

impl IfvgDetector {
    pub fn new(min_size_ticks: u32) -> Self {
        Self { min_size_ticks }
    }

    pub fn from_params(params: &ModelParams) -> Self {
        Self::new(params.ifvg_min_size_ticks)
    }

    /// Look at the last [`IFVG_WINDOW`] bars only.
    pub fn detect_ifvg_inversion<T: OHLCV>(
        &self,
        bars: &[T],
        direction: Direction,
        min_tick: f64,
    ) -> Option<IfvgInversion> {
        if bars.len() < IFVG_WINDOW {
            return None;
        }
        let [c1, c2, c3, c4] = &bars[bars.len() - IFVG_WINDOW..] else {
            return None;
        };

        let min_size = helpers::ticks_to_points(self.min_size_ticks, min_tick);
        let kind = match direction {
            Direction::Short => FvgKind::Bullish,
            Direction::Long => FvgKind::Bearish,
        };
        let (top, bottom) = helpers::three_bar_gap(c1, c2, c3, kind, min_size)?;

        let inverted = match direction {
            Direction::Short => c4.close() < bottom,
            Direction::Long => c4.close() > top,
        };
        if !inverted {
            return None;
        }

        Some(IfvgInversion {
            disrespected: kind,
            fvg_top: top,
            fvg_bottom: bottom,
            inversion_close: c4.close(),
            inversion_time: c4.time(),
            direction,
        })
    }
}
