//! Sweep quality score on a 0..=10 scale
//!
//! Base 5. Sweeping an overnight extreme adds 3, a previous-session extreme
//! adds 2 and a long rejection wick adds 1.

use chrono::Timelike;
use chrono_tz::{America::New_York, Tz};
use tracing::debug;

use crate::{detectors::LiquiditySweep, OHLCV};

pub const BASE_SCORE: f64 = 5.0;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct SweepQualityScorer {
    pub tz: Tz,
    /// Overnight session start/end as seconds after local midnight
    pub overnight_start: u32,
    pub overnight_end: u32,
    /// Bars searched for overnight trading near the level
    pub overnight_scan_bars: usize,
    pub overnight_tolerance: f64,
    /// Bars per session; the previous session is the one before the last
    pub session_bars: usize,
    pub prior_session_tolerance: f64,
    /// Wick beyond which a sweep counts as clean, in points
    pub clean_wick: f64,
}

impl Default for SweepQualityScorer {
    fn default() -> Self {
        Self {
            tz: New_York,
            overnight_start: 17 * 3600,
            overnight_end: 9 * 3600 + 30 * 60,
            overnight_scan_bars: 100,
            overnight_tolerance: 10.0,
            session_bars: 78,
            prior_session_tolerance: 5.0,
            clean_wick: 5.0,
        }
    }
}

impl SweepQualityScorer {
    pub fn score_sweep<T: OHLCV>(&self, sweep: &LiquiditySweep, bars: &[T]) -> f64 {
        let mut score = BASE_SCORE;
        let level = sweep.swing_level;

        if self.is_overnight_extreme(level, bars) {
            debug!(level, "+3 overnight extreme swept");
            score += 3.0;
        }
        if self.is_previous_session_extreme(level, bars) {
            debug!(level, "+2 previous session extreme swept");
            score += 2.0;
        }
        if self.is_clean_sweep(sweep) {
            debug!(level, "+1 clean sweep");
            score += 1.0;
        }

        score.min(MAX_SCORE)
    }

    /// Some recent overnight bar traded within tolerance of `level`
    pub fn is_overnight_extreme<T: OHLCV>(&self, level: f64, bars: &[T]) -> bool {
        bars[bars.len().saturating_sub(self.overnight_scan_bars)..]
            .iter()
            .filter(|b| {
                let secs = b.time().with_timezone(&self.tz).num_seconds_from_midnight();
                secs >= self.overnight_start || secs <= self.overnight_end
            })
            .any(|b| {
                (b.high() - level).abs() < self.overnight_tolerance
                    || (b.low() - level).abs() < self.overnight_tolerance
            })
    }

    /// `level` is within tolerance of the previous session's high or low
    pub fn is_previous_session_extreme<T: OHLCV>(&self, level: f64, bars: &[T]) -> bool {
        if self.session_bars == 0 || bars.len() < 2 * self.session_bars {
            return false;
        }
        let end = bars.len() - self.session_bars;
        let prior = &bars[end - self.session_bars..end];
        let (high, low) = prior.iter().fold((f64::NEG_INFINITY, f64::INFINITY), |(h, l), b| {
            (h.max(b.high()), l.min(b.low()))
        });

        (level - high).abs() < self.prior_session_tolerance
            || (level - low).abs() < self.prior_session_tolerance
    }

    pub fn is_clean_sweep(&self, sweep: &LiquiditySweep) -> bool {
        (sweep.extreme_price - sweep.close_price).abs() > self.clean_wick
    }
}
