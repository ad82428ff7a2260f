//! Swing points and liquidity sweeps (confirmation stage 1)
//!
//! A swing high is a bar whose high is strictly greater than the highs of the
//! `w` bars on each side (`w = MIN_SWING_CANDLES`); swing lows mirror this.
//! Resting liquidity sits beyond those swings. A sweep is a bar that trades
//! through the most recent swing by the buffer and then closes back inside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers::ticks_to_points;
use crate::{params::ModelParams, Direction, Period, OHLCV};

/// Minimum bars needed before swings are identified
pub const SWING_LOOKBACK: usize = 20;
/// Swings kept per side as liquidity targets
pub const LIQUIDITY_LEVEL_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed swing. `index` is relative to the scanned slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub index: usize,
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// Which side's liquidity was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    /// Stops above a swing high were run; sets up a short
    Buyside,
    /// Stops below a swing low were run; sets up a long
    Sellside,
}

impl SweepKind {
    #[inline]
    pub fn direction(self) -> Direction {
        match self {
            SweepKind::Buyside => Direction::Short,
            SweepKind::Sellside => Direction::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySweep {
    pub kind: SweepKind,
    /// Price of the swept swing
    pub swing_level: f64,
    /// High (buyside) or low (sellside) of the sweeping bar
    pub extreme_price: f64,
    pub close_price: f64,
    pub time: DateTime<Utc>,
    pub direction: Direction,
}

/// Recent swing prices on each side, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevels {
    pub buyside: Vec<f64>,
    pub sellside: Vec<f64>,
}

/// Scan for strict swing highs and lows. Pure; returns `(highs, lows)`.
pub fn find_swings<T: OHLCV>(bars: &[T], window: usize) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();

    if window == 0 || bars.len() <= 2 * window {
        return (highs, lows);
    }

    for i in window..bars.len() - window {
        let bar = &bars[i];
        let mut neighbours = (i - window..i).chain(i + 1..=i + window);

        if neighbours.clone().all(|j| bar.high() > bars[j].high()) {
            highs.push(SwingPoint {
                kind: SwingKind::High,
                index: i,
                time: bar.time(),
                price: bar.high(),
            });
        }
        if neighbours.all(|j| bar.low() < bars[j].low()) {
            lows.push(SwingPoint {
                kind: SwingKind::Low,
                index: i,
                time: bar.time(),
                price: bar.low(),
            });
        }
    }

    (highs, lows)
}

/// Stateful swing tracker and sweep detector.
///
/// Every scan replaces the stored swings; the most recent scan wins.
#[derive(Debug, Clone)]
pub struct SwingDetector {
    pub min_swing_candles: Period,
    pub sweep_buffer_ticks: u32,
    swing_highs: Vec<SwingPoint>,
    swing_lows: Vec<SwingPoint>,
}

impl Default for SwingDetector {
    fn default() -> Self {
        Self::from_params(&ModelParams::default())
    }
}

impl SwingDetector {
    pub fn new(min_swing_candles: Period, sweep_buffer_ticks: u32) -> Self {
        Self {
            min_swing_candles,
            sweep_buffer_ticks,
            swing_highs: Vec::new(),
            swing_lows: Vec::new(),
        }
    }

    pub fn from_params(params: &ModelParams) -> Self {
        Self::new(params.min_swing_candles, params.sweep_buffer_ticks)
    }

    pub fn swing_highs(&self) -> &[SwingPoint] {
        &self.swing_highs
    }

    pub fn swing_lows(&self) -> &[SwingPoint] {
        &self.swing_lows
    }

    /// Rescan `bars` and store the swings found.
    ///
    /// Fewer than [`SWING_LOOKBACK`] bars clears the stored swings.
    pub fn identify_swings<T: OHLCV>(&mut self, bars: &[T]) -> (&[SwingPoint], &[SwingPoint]) {
        if bars.len() < SWING_LOOKBACK {
            self.swing_highs.clear();
            self.swing_lows.clear();
        } else {
            let (highs, lows) = find_swings(bars, self.min_swing_candles.get());
            self.swing_highs = highs;
            self.swing_lows = lows;
        }
        (&self.swing_highs, &self.swing_lows)
    }

    /// Refresh swings from `prior_bars`, then test `current` for a sweep.
    pub fn detect_sweep<T: OHLCV>(
        &mut self,
        current: &T,
        prior_bars: &[T],
        min_tick: f64,
    ) -> Option<LiquiditySweep> {
        self.identify_swings(prior_bars);
        self.check_sweep(current, min_tick)
    }

    /// Test `current` against the most recent stored swing on each side.
    /// Buyside is checked first.
    pub fn check_sweep<T: OHLCV>(&self, current: &T, min_tick: f64) -> Option<LiquiditySweep> {
        let buffer = ticks_to_points(self.sweep_buffer_ticks, min_tick);

        if let Some(swing) = self.swing_highs.last() {
            if current.high() >= swing.price + buffer && current.close() < swing.price {
                debug!(level = swing.price, high = current.high(), "buyside sweep");
                return Some(LiquiditySweep {
                    kind: SweepKind::Buyside,
                    swing_level: swing.price,
                    extreme_price: current.high(),
                    close_price: current.close(),
                    time: current.time(),
                    direction: SweepKind::Buyside.direction(),
                });
            }
        }

        if let Some(swing) = self.swing_lows.last() {
            if current.low() <= swing.price - buffer && current.close() > swing.price {
                debug!(level = swing.price, low = current.low(), "sellside sweep");
                return Some(LiquiditySweep {
                    kind: SweepKind::Sellside,
                    swing_level: swing.price,
                    extreme_price: current.low(),
                    close_price: current.close(),
                    time: current.time(),
                    direction: SweepKind::Sellside.direction(),
                });
            }
        }

        None
    }

    /// Last [`LIQUIDITY_LEVEL_COUNT`] swing prices per side
    pub fn liquidity_levels(&self) -> LiquidityLevels {
        LiquidityLevels {
            buyside: recent_prices(&self.swing_highs),
            sellside: recent_prices(&self.swing_lows),
        }
    }
}

fn recent_prices(points: &[SwingPoint]) -> Vec<f64> {
    points[points.len().saturating_sub(LIQUIDITY_LEVEL_COUNT)..]
        .iter()
        .map(|p| p.price)
        .collect()
}
