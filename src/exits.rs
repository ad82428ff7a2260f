//! Trailing stop management
//!
//! Thresholds are in R, the trade's initial risk. At 1R the stop moves to
//! breakeven; from 1.5R it trails half an R behind price. Profit is taken at
//! the target or at 3R, whichever comes first.

use serde::{Deserialize, Serialize};

use crate::{pipeline::Signal, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    Original,
    Breakeven,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopUpdate {
    pub stop_loss: f64,
    pub reason: StopReason,
    /// Profit in points guaranteed by the stop
    pub profit_locked: f64,
    pub r_multiple: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExitDecision {
    Hold,
    TargetHit { r_multiple: f64 },
    ProfitLock { r_multiple: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub breakeven_at_r: f64,
    pub trail_start_r: f64,
    pub trail_distance_r: f64,
    pub profit_lock_r: f64,
}

impl Default for TrailingStop {
    fn default() -> Self {
        Self {
            breakeven_at_r: 1.0,
            trail_start_r: 1.5,
            trail_distance_r: 0.5,
            profit_lock_r: 3.0,
        }
    }
}

impl TrailingStop {
    /// Stop appropriate for `current_price`. Trailing takes precedence over
    /// breakeven once its threshold is reached.
    pub fn calculate_stop(&self, signal: &Signal, current_price: f64) -> StopUpdate {
        let r_multiple = signal.r_multiple(current_price);
        let entry = signal.entry;

        if r_multiple >= self.trail_start_r {
            let profit_locked = (r_multiple - self.trail_distance_r) * signal.risk;
            let stop_loss = match signal.direction {
                Direction::Short => entry - profit_locked,
                Direction::Long => entry + profit_locked,
            };
            return StopUpdate { stop_loss, reason: StopReason::Trailing, profit_locked, r_multiple };
        }

        if r_multiple >= self.breakeven_at_r {
            return StopUpdate {
                stop_loss: entry,
                reason: StopReason::Breakeven,
                profit_locked: 0.0,
                r_multiple,
            };
        }

        StopUpdate {
            stop_loss: signal.stop_loss,
            reason: StopReason::Original,
            profit_locked: 0.0,
            r_multiple,
        }
    }

    pub fn should_take_profit(&self, signal: &Signal, current_price: f64) -> ExitDecision {
        let r_multiple = signal.r_multiple(current_price);
        let at_target = match signal.direction {
            Direction::Short => current_price <= signal.target,
            Direction::Long => current_price >= signal.target,
        };

        if at_target {
            ExitDecision::TargetHit { r_multiple }
        } else if r_multiple >= self.profit_lock_r {
            ExitDecision::ProfitLock { r_multiple }
        } else {
            ExitDecision::Hold
        }
    }
}

/// True when `candidate` is a tighter stop than `current` for `direction`
#[inline]
pub fn is_tighter(direction: Direction, candidate: f64, current: f64) -> bool {
    match direction {
        Direction::Short => candidate < current,
        Direction::Long => candidate > current,
    }
}
