//! # Confirmation Model
//!
//! Multi-stage liquidity-sweep confirmation pipeline for intraday futures.
//!
//! A trade signal is emitted only when four (or five) independent detectors
//! fire in order on the same episode: a liquidity sweep, a higher-timeframe
//! fair value gap delivery, a lower-timeframe inverse FVG, a change in state
//! of delivery (CISD) and, optionally, momentum confluence.
//!
//! ## Quick Start
//!
//! ```rust
//! use confirmation_model::prelude::*;
//!
//! let params = ModelParams::default();
//! let mut generator = SignalGenerator::new(&params, EdgeFilters::Disabled);
//!
//! // One-minute bars from your feed, aggregated to a higher timeframe
//! let ltf: Vec<Bar> = vec![];
//! let htf = aggregate(&ltf, 15).unwrap();
//!
//! let signal = generator.check_for_signal(&ltf, &htf, 0.25).unwrap();
//! assert!(signal.is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod backtest;
pub mod detectors;
pub mod exits;
pub mod filters;
pub mod params;
pub mod pipeline;
pub mod sizing;

pub mod prelude {
    pub use crate::{
        // Backtesting
        backtest::{
            simulate_trade, BacktestOptions, BacktestOutcome, BacktestReport, Backtester,
            ExitPolicy, ExitReason, TradeRecord, TradeResult,
        },
        backtest_parallel,
        // Detectors
        detectors::*,
        // Exits
        exits::{ExitDecision, StopReason, StopUpdate, TrailingStop},
        // Filters
        filters::{
            DailyVix, EdgeFilters, FilterScores, FilterSuite, StaticVix, StructureFilter,
            SweepQualityScorer, TimeFilter, TimeWindow, VixSource, VolRegime, VolatilityFilter,
        },
        // Parameters
        params::{InstrumentSpec, ModelParams, ParamMeta, ParamType},
        // Pipeline
        pipeline::{ConfirmationState, Signal, SignalGenerator, Stage},
        // Sizing
        sizing::{ContractBracket, PositionSize, PositionSizer},
        // Bars
        aggregate,
        validate_bars,
        BacktestError,
        Bar,
        Direction,
        // Errors
        ModelError,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can cross the crate boundary.
///
/// Detectors never return these: a missing confirmation is `None`. An error
/// means the caller violated a contract (malformed bar, bad configuration).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(ModelError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ModelError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Bar count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ModelError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core bar data trait. Prices are in instrument points.
pub trait OHLCV {
    fn time(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for bar data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Up-close candle
    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    /// Down-close candle
    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Validate bar consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(ModelError::InvalidBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(ModelError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(ModelError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate every bar, reporting the index of the first bad one.
pub fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            ModelError::InvalidBar { reason, .. } => ModelError::InvalidBar { index: i, reason },
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BAR
// ============================================================

/// Plain OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Aggregate base bars into higher-timeframe bars by fixed-size grouping.
///
/// `group_size` is the ratio of target duration to base duration. Only
/// complete groups are emitted; a trailing partial group is dropped.
pub fn aggregate<T: OHLCV>(bars: &[T], group_size: usize) -> Result<Vec<Bar>> {
    if group_size == 0 {
        return Err(ModelError::InvalidValue("group size must be > 0"));
    }

    Ok(bars
        .chunks_exact(group_size)
        .map(|chunk| {
            let first = &chunk[0];
            let last = &chunk[chunk.len() - 1];
            let (high, low, volume) = chunk.iter().fold(
                (f64::NEG_INFINITY, f64::INFINITY, 0.0),
                |(h, l, v), bar| (h.max(bar.high()), l.min(bar.low()), v + bar.volume()),
            );
            Bar::new(first.time(), first.open(), high, low, last.close(), volume)
        })
        .collect())
}

// ============================================================
// DIRECTION
// ============================================================

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Direction::Long)
    }

    #[inline]
    pub fn is_short(self) -> bool {
        matches!(self, Direction::Short)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1.0 for long, -1.0 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

// ============================================================
// PARALLEL BACKTESTING
// ============================================================

use rayon::prelude::*;

use crate::{
    backtest::{BacktestOptions, BacktestOutcome, Backtester},
    filters::EdgeFilters,
    params::{InstrumentSpec, ModelParams},
};

/// Error from backtesting a single instrument
#[derive(Debug)]
pub struct BacktestError {
    pub symbol: String,
    pub error: ModelError,
}

/// Backtest several instruments in parallel.
///
/// Every instrument gets its own [`Backtester`] and therefore its own
/// signal generator; detector state is never shared across instruments.
pub fn backtest_parallel<'a, T, I>(
    params: &ModelParams,
    filters: &EdgeFilters,
    options: &BacktestOptions,
    instruments: I,
) -> (Vec<BacktestOutcome>, Vec<BacktestError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a InstrumentSpec, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(instrument, bars)| {
            let mut backtester =
                Backtester::new(instrument.clone(), params, filters.clone(), options.clone());
            backtester.run(bars).map_err(|error| BacktestError {
                symbol: instrument.symbol.clone(),
                error,
            })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
