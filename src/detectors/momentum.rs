//! Momentum confluence (optional confirmation stage 5)
//!
//! Momentum confirms when the LTF rate of change points the trade's way by at
//! least `MIN_MOMENTUM_PCT`, the entry sits on the right side of the LTF
//! EMA(9), and most of the last three candles close in the trade direction.
//! The HTF trend, read from price against EMA(`HTF_EMA_PERIOD`), must agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::helpers;
use crate::{params::ModelParams, Direction, OHLCVExt, Period, OHLCV};

pub const LTF_EMA_PERIOD: usize = 9;
pub const RECENT_CANDLES: usize = 3;
pub const MIN_DIRECTIONAL_CANDLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfirmation {
    /// Rate of change in percent, signed so positive favours the trade
    pub momentum_score: f64,
    pub roc_pct: f64,
    pub ema: f64,
    pub directional_candles: usize,
    pub time: DateTime<Utc>,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct MomentumDetector {
    pub period: Period,
    pub min_momentum_pct: f64,
    pub htf_ema_period: Period,
}

impl Default for MomentumDetector {
    fn default() -> Self {
        Self::from_params(&ModelParams::default())
    }
}

impl MomentumDetector {
    pub fn new(period: Period, min_momentum_pct: f64, htf_ema_period: Period) -> Self {
        Self { period, min_momentum_pct, htf_ema_period }
    }

    pub fn from_params(params: &ModelParams) -> Self {
        Self::new(params.momentum_period, params.min_momentum_pct, params.htf_ema_period)
    }

    pub fn detect_momentum<T: OHLCV>(
        &self,
        ltf_bars: &[T],
        direction: Direction,
        entry: f64,
    ) -> Option<MomentumConfirmation> {
        let roc = helpers::rate_of_change(ltf_bars, self.period.get())?;
        let momentum_score = roc * direction.sign();
        if momentum_score < self.min_momentum_pct {
            return None;
        }

        let ema = helpers::ema(ltf_bars, LTF_EMA_PERIOD)?;
        let with_trend = match direction {
            Direction::Long => entry > ema,
            Direction::Short => entry < ema,
        };
        if !with_trend {
            return None;
        }

        let recent = &ltf_bars[ltf_bars.len().saturating_sub(RECENT_CANDLES)..];
        let directional_candles = recent
            .iter()
            .filter(|b| match direction {
                Direction::Long => b.is_bullish(),
                Direction::Short => b.is_bearish(),
            })
            .count();
        if directional_candles < MIN_DIRECTIONAL_CANDLES {
            return None;
        }

        let last = ltf_bars.last()?;
        Some(MomentumConfirmation {
            momentum_score,
            roc_pct: roc,
            ema,
            directional_candles,
            time: last.time(),
            direction,
        })
    }

    /// `Some(true)` when the HTF close sits on the trade's side of its EMA.
    /// `None` when there are too few HTF bars to tell.
    pub fn check_alignment<T: OHLCV>(&self, htf_bars: &[T], direction: Direction) -> Option<bool> {
        let ema = helpers::ema(htf_bars, self.htf_ema_period.get())?;
        let close = htf_bars.last()?.close();
        Some(match direction {
            Direction::Long => close > ema,
            Direction::Short => close < ema,
        })
    }
}
