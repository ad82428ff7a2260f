//! Change in state of delivery (confirmation stage 4)
//!
//! Before a buyside sweep price is delivered higher by a run of up-close
//! candles. The state changes once price closes below the open of the
//! oldest candle in that run. Longs mirror this with down-close candles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::swing::LiquiditySweep;
use crate::{Direction, OHLCVExt, OHLCV};

/// Minimum bars handed to the detector
pub const CISD_MIN_BARS: usize = 10;
/// The sweep bar must have at least this many bars before it
pub const CISD_MIN_SWEEP_INDEX: usize = 5;
/// Longest delivery run examined before the sweep
pub const CISD_MAX_RUN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CisdBreak {
    /// Open of the oldest candle in the delivery run
    pub cisd_level: f64,
    pub origin_time: DateTime<Utc>,
    pub run_length: usize,
    pub break_close: f64,
    pub time: DateTime<Utc>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default)]
pub struct CisdDetector;

impl CisdDetector {
    pub fn new() -> Self {
        Self
    }

    /// Locate the sweep bar by timestamp, walk back over the delivery run and
    /// test the last bar's close against the run's origin.
    pub fn detect_cisd<T: OHLCV>(
        &self,
        bars: &[T],
        sweep: &LiquiditySweep,
        direction: Direction,
    ) -> Option<CisdBreak> {
        if bars.len() < CISD_MIN_BARS {
            return None;
        }

        let sweep_index = bars.iter().position(|b| b.time() == sweep.time)?;
        if sweep_index < CISD_MIN_SWEEP_INDEX {
            return None;
        }

        let in_run = |bar: &T| match direction {
            Direction::Short => bar.is_bullish(),
            Direction::Long => bar.is_bearish(),
        };

        let origin_index = (sweep_index.saturating_sub(CISD_MAX_RUN)..sweep_index)
            .rev()
            .take_while(|&i| in_run(&bars[i]))
            .last()?;
        let origin = &bars[origin_index];
        let level = origin.open();

        let current = bars.last()?;
        let broken = match direction {
            Direction::Short => current.close() < level,
            Direction::Long => current.close() > level,
        };
        if !broken {
            return None;
        }

        Some(CisdBreak {
            cisd_level: level,
            origin_time: origin.time(),
            run_length: sweep_index - origin_index,
            break_close: current.close(),
            time: current.time(),
            direction,
        })
    }
}
