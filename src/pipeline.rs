//! The confirmation pipeline
//!
//! [`SignalGenerator`] owns one episode of confirmation state per instrument.
//! Every call evaluates the next unfilled stage on the latest bar and, when it
//! fills, continues to the following stage on that same bar. Filled stages
//! are never re-evaluated within an episode. A finished episode, successful or
//! disqualified, resets to [`Stage::Idle`]. So does an episode whose sweep bar
//! has scrolled out of the LTF window, since CISD can no longer be measured
//! against it.
//!
//! ```text
//! Idle -> Swept -> HtfConfirmed -> IfvgConfirmed -> CisdConfirmed [-> MomentumConfirmed] -> Signal
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    detectors::{
        helpers::ticks_to_points, CisdBreak, CisdDetector, FvgDelivery, HtfFvgDetector,
        IfvgDetector, IfvgInversion, LiquiditySweep, MomentumConfirmation, MomentumDetector,
        SwingDetector, CISD_MIN_SWEEP_INDEX,
    },
    filters::{EdgeFilters, FilterScores},
    params::ModelParams,
    validate_bars, Direction, ModelError, Result, OHLCV,
};

/// LTF bars required before any stage is evaluated
pub const MIN_LTF_BARS: usize = 20;
/// LTF bars required when momentum confluence is enabled
pub const MIN_LTF_BARS_WITH_MOMENTUM: usize = 30;
/// HTF bars required before any stage is evaluated
pub const MIN_HTF_BARS: usize = 20;
/// LTF bars handed to the iFVG detector
pub const IFVG_LOOKBACK_BARS: usize = 10;
/// Target projection when no opposing liquidity is known, in multiples of
/// the sweep's rejection distance
pub const FALLBACK_TARGET_MULTIPLE: f64 = 2.0;

// ============================================================
// STATE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Idle,
    Swept,
    HtfConfirmed,
    IfvgConfirmed,
    CisdConfirmed,
    MomentumConfirmed,
}

/// Confirmations gathered in the current episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationState {
    pub sweep: Option<LiquiditySweep>,
    pub htf_fvg: Option<FvgDelivery>,
    pub ifvg: Option<IfvgInversion>,
    pub cisd: Option<CisdBreak>,
    pub momentum: Option<MomentumConfirmation>,
}

impl ConfirmationState {
    pub fn stage(&self) -> Stage {
        if self.momentum.is_some() {
            Stage::MomentumConfirmed
        } else if self.cisd.is_some() {
            Stage::CisdConfirmed
        } else if self.ifvg.is_some() {
            Stage::IfvgConfirmed
        } else if self.htf_fvg.is_some() {
            Stage::HtfConfirmed
        } else if self.sweep.is_some() {
            Stage::Swept
        } else {
            Stage::Idle
        }
    }

    /// Episode direction, fixed by the sweep
    pub fn direction(&self) -> Option<Direction> {
        self.sweep.map(|s| s.direction)
    }

    /// Every recorded confirmation agrees with the sweep's direction
    pub fn is_direction_consistent(&self) -> bool {
        let Some(direction) = self.direction() else {
            return true;
        };
        [
            self.htf_fvg.map(|c| c.direction),
            self.ifvg.map(|c| c.direction),
            self.cisd.map(|c| c.direction),
            self.momentum.map(|c| c.direction),
        ]
        .into_iter()
        .flatten()
        .all(|d| d == direction)
    }

    pub fn is_complete(&self, require_momentum: bool) -> bool {
        self.sweep.is_some()
            && self.htf_fvg.is_some()
            && self.ifvg.is_some()
            && self.cisd.is_some()
            && (!require_momentum || self.momentum.is_some())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================
// SIGNAL
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub time: DateTime<Utc>,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub risk: f64,
    pub reward: f64,
    /// reward / risk, 0 when risk is 0
    pub risk_reward_ratio: f64,
    pub confirmations: ConfirmationState,
    /// `None` when edge filters are disabled
    pub filter_scores: Option<FilterScores>,
}

impl Signal {
    /// Open profit at `price` in multiples of the initial risk
    pub fn r_multiple(&self, price: f64) -> f64 {
        if self.risk <= 0.0 {
            return 0.0;
        }
        (price - self.entry) * self.direction.sign() / self.risk
    }

    pub fn meets_risk_reward(&self, min_risk_reward: f64) -> bool {
        self.risk_reward_ratio >= min_risk_reward
    }
}

// ============================================================
// GENERATOR
// ============================================================

enum MomentumOutcome {
    Confirmed(MomentumConfirmation),
    Misaligned,
    Pending,
}

/// Multi-stage signal generator for one instrument.
///
/// Not meant to be shared: run one generator per instrument.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    sweeps: SwingDetector,
    htf_fvgs: HtfFvgDetector,
    ifvg: IfvgDetector,
    cisd: CisdDetector,
    /// Present when the momentum stage is required
    momentum: Option<MomentumDetector>,
    filters: EdgeFilters,
    stop_loss_buffer_ticks: u32,
    state: ConfirmationState,
}

impl SignalGenerator {
    pub fn new(params: &ModelParams, filters: EdgeFilters) -> Self {
        Self {
            sweeps: SwingDetector::from_params(params),
            htf_fvgs: HtfFvgDetector::from_params(params),
            ifvg: IfvgDetector::from_params(params),
            cisd: CisdDetector::new(),
            momentum: params.require_momentum.then(|| MomentumDetector::from_params(params)),
            filters,
            stop_loss_buffer_ticks: params.stop_loss_buffer_ticks,
            state: ConfirmationState::default(),
        }
    }

    pub fn state(&self) -> &ConfirmationState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn requires_momentum(&self) -> bool {
        self.momentum.is_some()
    }

    pub fn filters(&self) -> &EdgeFilters {
        &self.filters
    }

    pub fn swings(&self) -> &SwingDetector {
        &self.sweeps
    }

    pub fn htf_fvgs(&self) -> &HtfFvgDetector {
        &self.htf_fvgs
    }

    /// Drop the current episode
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Evaluate the latest LTF bar.
    ///
    /// `ltf_bars` ends with the bar being evaluated; `htf_bars` holds the
    /// completed higher-timeframe bars up to it. Returns `Ok(None)` while
    /// confirmations are pending. Malformed input is an error and leaves the
    /// episode untouched.
    pub fn check_for_signal<L: OHLCV, H: OHLCV>(
        &mut self,
        ltf_bars: &[L],
        htf_bars: &[H],
        min_tick: f64,
    ) -> Result<Option<Signal>> {
        if !(min_tick.is_finite() && min_tick > 0.0) {
            return Err(ModelError::InvalidValue("min_tick must be > 0"));
        }
        validate_bars(ltf_bars)?;
        validate_bars(htf_bars)?;

        let min_ltf = if self.requires_momentum() {
            MIN_LTF_BARS_WITH_MOMENTUM
        } else {
            MIN_LTF_BARS
        };
        if ltf_bars.len() < min_ltf || htf_bars.len() < MIN_HTF_BARS {
            return Ok(None);
        }
        let Some((current, prior)) = ltf_bars.split_last() else {
            return Ok(None);
        };

        if let Some(sweep) = self.state.sweep {
            if !sweep_in_window(&sweep, ltf_bars) {
                debug!(
                    sweep_time = %sweep.time,
                    stage = ?self.stage(),
                    "sweep left the ltf window, episode abandoned"
                );
                self.reset();
            }
        }

        // Stage 1: liquidity sweep. Swings stay current for target selection.
        if self.state.sweep.is_none() {
            if let Some(sweep) = self.sweeps.detect_sweep(current, prior, min_tick) {
                info!(
                    kind = ?sweep.kind,
                    level = sweep.swing_level,
                    direction = %sweep.direction,
                    "stage 1: liquidity sweep"
                );
                self.state.sweep = Some(sweep);
            }
        } else {
            self.sweeps.identify_swings(prior);
        }
        let Some(sweep) = self.state.sweep else {
            return Ok(None);
        };
        let direction = sweep.direction;

        // Stage 2: HTF FVG delivery
        if self.state.htf_fvg.is_none() {
            self.htf_fvgs.update_fvgs(htf_bars, min_tick);
            match self.htf_fvgs.check_delivery(current, direction) {
                Some(delivery) => {
                    info!(
                        top = delivery.fvg.top,
                        bottom = delivery.fvg.bottom,
                        age = delivery.fvg.age,
                        "stage 2: htf fvg delivery"
                    );
                    self.state.htf_fvg = Some(delivery);
                },
                None => return Ok(None),
            }
        }

        // Stage 3: LTF inverse FVG
        if self.state.ifvg.is_none() {
            let window = &ltf_bars[ltf_bars.len().saturating_sub(IFVG_LOOKBACK_BARS)..];
            match self.ifvg.detect_ifvg_inversion(window, direction, min_tick) {
                Some(inversion) => {
                    info!(
                        top = inversion.fvg_top,
                        bottom = inversion.fvg_bottom,
                        close = inversion.inversion_close,
                        "stage 3: ifvg inversion"
                    );
                    self.state.ifvg = Some(inversion);
                },
                None => return Ok(None),
            }
        }

        // Stage 4: change in state of delivery
        if self.state.cisd.is_none() {
            match self.cisd.detect_cisd(ltf_bars, &sweep, direction) {
                Some(cisd) => {
                    info!(level = cisd.cisd_level, run = cisd.run_length, "stage 4: cisd");
                    self.state.cisd = Some(cisd);
                },
                None => return Ok(None),
            }
        }

        // Stage 5: momentum confluence, when required
        if self.momentum.is_some() && self.state.momentum.is_none() {
            match self.evaluate_momentum(ltf_bars, htf_bars, direction, current.close()) {
                MomentumOutcome::Confirmed(momentum) => {
                    info!(score = momentum.momentum_score, "stage 5: momentum confluence");
                    self.state.momentum = Some(momentum);
                },
                MomentumOutcome::Misaligned => {
                    warn!(%direction, "momentum against htf trend, episode disqualified");
                    self.reset();
                    return Ok(None);
                },
                MomentumOutcome::Pending => return Ok(None),
            }
        }

        info!(%direction, "all confirmations aligned");
        let entry = current.close();

        let filter_scores = match &self.filters {
            EdgeFilters::Disabled => Some(None),
            EdgeFilters::Enabled(suite) => suite
                .evaluate(current, direction, entry, &sweep, ltf_bars)
                .map(Some),
        };
        let Some(filter_scores) = filter_scores else {
            self.reset();
            return Ok(None);
        };

        let signal = self.build_signal(current, &sweep, min_tick, filter_scores);
        info!(
            %direction,
            entry = signal.entry,
            stop = signal.stop_loss,
            target = signal.target,
            rr = signal.risk_reward_ratio,
            "signal generated"
        );
        self.reset();
        Ok(Some(signal))
    }

    fn evaluate_momentum<L: OHLCV, H: OHLCV>(
        &self,
        ltf_bars: &[L],
        htf_bars: &[H],
        direction: Direction,
        entry: f64,
    ) -> MomentumOutcome {
        let Some(detector) = &self.momentum else {
            return MomentumOutcome::Pending;
        };
        let Some(momentum) = detector.detect_momentum(ltf_bars, direction, entry) else {
            return MomentumOutcome::Pending;
        };
        match detector.check_alignment(htf_bars, direction) {
            Some(true) => MomentumOutcome::Confirmed(momentum),
            Some(false) => MomentumOutcome::Misaligned,
            None => {
                debug!("htf trend unavailable, momentum pending");
                MomentumOutcome::Pending
            },
        }
    }

    fn build_signal<T: OHLCV>(
        &self,
        current: &T,
        sweep: &LiquiditySweep,
        min_tick: f64,
        filter_scores: Option<FilterScores>,
    ) -> Signal {
        let entry = current.close();
        let buffer = ticks_to_points(self.stop_loss_buffer_ticks, min_tick);
        let stop_loss = match sweep.direction {
            Direction::Short => sweep.swing_level + buffer,
            Direction::Long => sweep.swing_level - buffer,
        };
        let target = self.opposing_liquidity(sweep);

        let risk = (entry - stop_loss).abs();
        let reward = (target - entry).abs();
        let risk_reward_ratio = if risk > 0.0 { reward / risk } else { 0.0 };

        Signal {
            time: current.time(),
            direction: sweep.direction,
            entry,
            stop_loss,
            target,
            risk,
            reward,
            risk_reward_ratio,
            confirmations: self.state.clone(),
            filter_scores,
        }
    }

    /// Furthest known liquidity on the far side, or a projection of twice the
    /// sweep's rejection distance when none is known.
    fn opposing_liquidity(&self, sweep: &LiquiditySweep) -> f64 {
        let levels = self.sweeps.liquidity_levels();
        let projection = (sweep.swing_level - sweep.close_price).abs() * FALLBACK_TARGET_MULTIPLE;
        match sweep.direction {
            Direction::Short => levels
                .sellside
                .into_iter()
                .reduce(f64::min)
                .unwrap_or(sweep.swing_level - projection),
            Direction::Long => levels
                .buyside
                .into_iter()
                .reduce(f64::max)
                .unwrap_or(sweep.swing_level + projection),
        }
    }
}

/// The sweep bar is still in `bars` with enough history before it for CISD
fn sweep_in_window<T: OHLCV>(sweep: &LiquiditySweep, bars: &[T]) -> bool {
    bars.iter()
        .position(|b| b.time() == sweep.time)
        .is_some_and(|i| i >= CISD_MIN_SWEEP_INDEX)
}
