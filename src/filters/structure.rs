//! Range-position filter: shorts near the top of the recent range, longs
//! near the bottom. The only filter that can veto a signal.

use serde::{Deserialize, Serialize};

use crate::{Direction, OHLCV};

/// One regular session of five-minute bars
pub const STRUCTURE_LOOKBACK: usize = 78;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureCheck {
    pub at_extreme: bool,
    /// `None` when there were too few bars to measure the range
    pub position: Option<f64>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureFilter {
    pub lookback_bars: usize,
    pub short_min_position: f64,
    pub long_max_position: f64,
}

impl Default for StructureFilter {
    fn default() -> Self {
        Self {
            lookback_bars: STRUCTURE_LOOKBACK,
            short_min_position: 0.70,
            long_max_position: 0.30,
        }
    }
}

impl StructureFilter {
    /// Where `entry` sits in the high/low range of the last `lookback_bars`,
    /// 0.0 at the low and 1.0 at the high. A flat range reads 0.5.
    pub fn range_position<T: OHLCV>(&self, entry: f64, bars: &[T]) -> Option<f64> {
        if self.lookback_bars == 0 || bars.len() < self.lookback_bars {
            return None;
        }
        let recent = &bars[bars.len() - self.lookback_bars..];
        let (high, low) = recent.iter().fold((f64::NEG_INFINITY, f64::INFINITY), |(h, l), b| {
            (h.max(b.high()), l.min(b.low()))
        });

        let size = high - low;
        if size == 0.0 {
            return Some(0.5);
        }
        Some((entry - low) / size)
    }

    /// Score 0.7..=1.0 scaled by how deep into the extreme zone the entry is;
    /// 0.0 outside it.
    pub fn quality_score(&self, direction: Direction, position: f64) -> f64 {
        let normalized = match direction {
            Direction::Short if position >= self.short_min_position => {
                (position - self.short_min_position) / (1.0 - self.short_min_position)
            },
            Direction::Long if position <= self.long_max_position => {
                (self.long_max_position - position) / self.long_max_position
            },
            _ => return 0.0,
        };
        0.7 + normalized * 0.3
    }

    pub fn check<T: OHLCV>(&self, direction: Direction, entry: f64, bars: &[T]) -> StructureCheck {
        let Some(position) = self.range_position(entry, bars) else {
            return StructureCheck { at_extreme: false, position: None, score: 0.0 };
        };

        let at_extreme = match direction {
            Direction::Short => position >= self.short_min_position,
            Direction::Long => position <= self.long_max_position,
        };
        StructureCheck {
            at_extreme,
            position: Some(position),
            score: self.quality_score(direction, position),
        }
    }
}
