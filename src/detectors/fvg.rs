//! Higher-timeframe fair value gaps (confirmation stage 2)
//!
//! HTF gaps are tracked across bars. Each delivery check ages every unfilled
//! gap by one; a gap is retired when it expires, when price closes through
//! it (invalidation) or when it delivers. A delivery is an LTF bar that
//! trades into the gap and closes back out on the far side, rejecting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers::{three_bar_gap, ticks_to_points};
use crate::{params::ModelParams, Direction, OHLCV};

/// HTF bars rescanned for gaps on every update
pub const FVG_RESCAN_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgKind {
    Bullish,
    Bearish,
}

impl FvgKind {
    /// Trade direction a delivery from this gap supports
    #[inline]
    pub fn direction(self) -> Direction {
        match self {
            FvgKind::Bullish => Direction::Long,
            FvgKind::Bearish => Direction::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub kind: FvgKind,
    pub top: f64,
    pub bottom: f64,
    pub size: f64,
    /// Time of the first bar of the triple; identifies the gap across rescans
    pub start_time: DateTime<Utc>,
    pub filled: bool,
    pub age: u32,
}

impl FairValueGap {
    /// Same gap, possibly found by a different scan
    #[inline]
    pub fn same_gap(&self, other: &FairValueGap) -> bool {
        self.kind == other.kind && self.start_time == other.start_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FvgDelivery {
    /// Gap as it was when delivered
    pub fvg: FairValueGap,
    pub delivery_time: DateTime<Utc>,
    pub delivery_close: f64,
    pub direction: Direction,
}

/// Scan consecutive triples for gaps of at least `min_size_ticks`.
///
/// Gaps come out in bar order with age 0.
pub fn identify_fvgs<T: OHLCV>(bars: &[T], min_size_ticks: u32, min_tick: f64) -> Vec<FairValueGap> {
    let min_size = ticks_to_points(min_size_ticks, min_tick);

    bars.windows(3)
        .flat_map(|w| {
            [FvgKind::Bearish, FvgKind::Bullish]
                .into_iter()
                .filter_map(move |kind| {
                    three_bar_gap(&w[0], &w[1], &w[2], kind, min_size).map(|(top, bottom)| {
                        FairValueGap {
                            kind,
                            top,
                            bottom,
                            size: top - bottom,
                            start_time: w[0].time(),
                            filled: false,
                            age: 0,
                        }
                    })
                })
        })
        .collect()
}

/// Age the unfilled gaps and test `bar` for a delivery in `direction`,
/// oldest gap first.
///
/// Stops at the first delivery; gaps after it are not aged on this bar.
/// The delivered gap is marked filled. Gaps of the other kind still age and
/// can be invalidated, but a rejection off them leaves them untouched.
pub fn check_delivery<T: OHLCV>(
    fvgs: &mut [FairValueGap],
    bar: &T,
    max_age: u32,
    direction: Direction,
) -> Option<FvgDelivery> {
    for fvg in fvgs.iter_mut().filter(|g| !g.filled) {
        fvg.age += 1;
        if fvg.age > max_age {
            debug!(kind = ?fvg.kind, age = fvg.age, "fvg expired");
            fvg.filled = true;
            continue;
        }

        let (entered, rejected, invalidated) = match fvg.kind {
            FvgKind::Bearish => (
                bar.high() >= fvg.bottom,
                bar.close() < fvg.bottom,
                bar.close() > fvg.top,
            ),
            FvgKind::Bullish => (
                bar.low() <= fvg.top,
                bar.close() > fvg.top,
                bar.close() < fvg.bottom,
            ),
        };

        if !entered {
            continue;
        }
        if rejected && fvg.kind.direction() == direction {
            let delivered = *fvg;
            fvg.filled = true;
            return Some(FvgDelivery {
                fvg: delivered,
                delivery_time: bar.time(),
                delivery_close: bar.close(),
                direction: delivered.kind.direction(),
            });
        }
        if invalidated {
            debug!(kind = ?fvg.kind, top = fvg.top, bottom = fvg.bottom, "fvg invalidated");
            fvg.filled = true;
        }
    }
    None
}

/// Active HTF gap set with age carried across rescans.
#[derive(Debug, Clone)]
pub struct HtfFvgDetector {
    pub min_fvg_size_ticks: u32,
    pub max_age: u32,
    active: Vec<FairValueGap>,
    /// Gaps already filled; a rescan must not bring them back
    retired: Vec<(FvgKind, DateTime<Utc>)>,
}

impl Default for HtfFvgDetector {
    fn default() -> Self {
        Self::from_params(&ModelParams::default())
    }
}

impl HtfFvgDetector {
    pub fn new(min_fvg_size_ticks: u32, max_age: u32) -> Self {
        Self {
            min_fvg_size_ticks,
            max_age,
            active: Vec::new(),
            retired: Vec::new(),
        }
    }

    pub fn from_params(params: &ModelParams) -> Self {
        Self::new(params.min_fvg_size_ticks, params.max_htf_fvg_age)
    }

    pub fn active_fvgs(&self) -> &[FairValueGap] {
        &self.active
    }

    /// Rescan the last [`FVG_RESCAN_WINDOW`] HTF bars and replace the active set.
    ///
    /// Gaps seen before keep their age. Gaps that scrolled out of the window
    /// are forgotten.
    pub fn update_fvgs<T: OHLCV>(&mut self, htf_bars: &[T], min_tick: f64) {
        let window = &htf_bars[htf_bars.len().saturating_sub(FVG_RESCAN_WINDOW)..];
        let found = identify_fvgs(window, self.min_fvg_size_ticks, min_tick);

        match window.first() {
            Some(first) => {
                let window_start = first.time();
                self.retired.retain(|(_, t)| *t >= window_start);
            }
            None => self.retired.clear(),
        }

        let retired = &self.retired;
        let previous = &self.active;
        let active: Vec<FairValueGap> = found
            .into_iter()
            .filter(|g| !retired.contains(&(g.kind, g.start_time)))
            .map(|mut g| {
                if let Some(prev) = previous.iter().find(|p| p.same_gap(&g)) {
                    g.age = prev.age;
                }
                g
            })
            .collect();

        debug!(active = active.len(), "htf fvgs updated");
        self.active = active;
    }

    /// Check the current LTF bar for a delivery in `direction`. Filled gaps
    /// are removed from the active set.
    pub fn check_delivery<T: OHLCV>(
        &mut self,
        bar: &T,
        direction: Direction,
    ) -> Option<FvgDelivery> {
        let delivery = check_delivery(&mut self.active, bar, self.max_age, direction);

        for fvg in self.active.iter().filter(|g| g.filled) {
            self.retired.push((fvg.kind, fvg.start_time));
        }
        self.active.retain(|g| !g.filled);

        delivery
    }
}
