//! Bar-replay backtesting
//!
//! [`Backtester`] walks a single instrument's LTF history, asks the
//! [`SignalGenerator`] for a signal at every bar past the warmup, sizes the
//! trade and resolves it against the bars that follow with
//! [`simulate_trade`]. Capital compounds trade by trade into the sizer.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    aggregate,
    exits::{is_tighter, ExitDecision, StopReason, TrailingStop},
    filters::EdgeFilters,
    params::{InstrumentSpec, ModelParams},
    pipeline::{Signal, SignalGenerator},
    sizing::{PositionSize, PositionSizer},
    Direction, ModelError, Result, OHLCV,
};

/// Bars after the signal bar a trade may stay open
pub const MAX_HOLD_BARS: usize = 100;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

// ============================================================
// TRADES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
}

impl TradeResult {
    fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 {
            TradeResult::Win
        } else if pnl < 0.0 {
            TradeResult::Loss
        } else {
            TradeResult::Breakeven
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Stop,
    Target,
    ProfitLock,
    /// Neither stop nor target within `MAX_HOLD_BARS`
    Timeout,
}

/// How an open trade is managed after entry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ExitPolicy {
    /// Original stop and target only
    #[default]
    Fixed,
    /// Stop ratchets with [`TrailingStop`], profit locked at its threshold
    Trailing(TrailingStop),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub time: DateTime<Utc>,
    pub direction: Direction,
    pub entry: f64,
    pub exit: f64,
    pub pnl: f64,
    pub result: TradeResult,
    pub contracts: u32,
    pub bars_held: usize,
    pub exit_reason: ExitReason,
}

/// Resolve a trade against the bars following its signal bar.
///
/// Each bar checks the stop before the target. A stop still at its original
/// level loses exactly the sized risk; any other exit is valued in ticks.
/// A trade still open after `MAX_HOLD_BARS` is closed flat at entry.
pub fn simulate_trade<T: OHLCV>(
    signal: &Signal,
    position: &PositionSize,
    future_bars: &[T],
    exit_policy: &ExitPolicy,
) -> TradeRecord {
    let direction = signal.direction;
    let window = &future_bars[..future_bars.len().min(MAX_HOLD_BARS)];

    let record = |exit: f64, pnl: f64, bars_held: usize, exit_reason: ExitReason| TradeRecord {
        time: signal.time,
        direction,
        entry: signal.entry,
        exit,
        pnl,
        result: TradeResult::from_pnl(pnl),
        contracts: position.contracts,
        bars_held,
        exit_reason,
    };
    let tick_pnl = |exit: f64| {
        let ticks = (exit - signal.entry) * direction.sign() / position.min_tick;
        position.contracts as f64 * ticks * position.tick_value
    };

    let mut stop = signal.stop_loss;
    let mut stop_reason = StopReason::Original;

    for (i, bar) in window.iter().enumerate() {
        let (stop_hit, target_hit) = match direction {
            Direction::Short => (bar.high() >= stop, bar.low() <= signal.target),
            Direction::Long => (bar.low() <= stop, bar.high() >= signal.target),
        };

        if stop_hit {
            let pnl = match stop_reason {
                StopReason::Original => -position.total_risk_dollars,
                StopReason::Breakeven | StopReason::Trailing => tick_pnl(stop),
            };
            return record(stop, pnl, i + 1, ExitReason::Stop);
        }
        if target_hit {
            return record(signal.target, tick_pnl(signal.target), i + 1, ExitReason::Target);
        }

        if let ExitPolicy::Trailing(trailing) = exit_policy {
            let close = bar.close();
            if let ExitDecision::ProfitLock { r_multiple } = trailing.should_take_profit(signal, close) {
                debug!(r_multiple, close, "profit lock exit");
                return record(close, tick_pnl(close), i + 1, ExitReason::ProfitLock);
            }
            let update = trailing.calculate_stop(signal, close);
            if is_tighter(direction, update.stop_loss, stop) {
                debug!(stop = update.stop_loss, reason = ?update.reason, "stop moved");
                stop = update.stop_loss;
                stop_reason = update.reason;
            }
        }
    }

    record(signal.entry, 0.0, window.len(), ExitReason::Timeout)
}

// ============================================================
// REPORT
// ============================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestReport {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    /// Percent of trades with positive P&L
    pub win_rate: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// 0 when there are no losses
    pub profit_factor: f64,
    pub avg_win: f64,
    /// Absolute value
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    /// Per-trade returns on initial capital, annualized by √252
    pub sharpe_ratio: f64,
    /// Mean P&L per trade
    pub expectancy: f64,
    pub long_trades: usize,
    pub long_wins: usize,
    pub long_pnl: f64,
    pub short_trades: usize,
    pub short_wins: usize,
    pub short_pnl: f64,
    pub initial_capital: f64,
    pub ending_capital: f64,
}

impl BacktestReport {
    pub fn from_trades(trades: &[TradeRecord], initial_capital: f64) -> Self {
        let mut report = BacktestReport {
            initial_capital,
            ending_capital: initial_capital,
            ..Self::default()
        };
        if trades.is_empty() {
            return report;
        }

        let n = trades.len() as f64;
        report.total_trades = trades.len();
        report.largest_win = f64::NEG_INFINITY;
        report.largest_loss = f64::INFINITY;

        for trade in trades {
            match trade.result {
                TradeResult::Win => {
                    report.wins += 1;
                    report.gross_profit += trade.pnl;
                },
                TradeResult::Loss => {
                    report.losses += 1;
                    report.gross_loss += trade.pnl.abs();
                },
                TradeResult::Breakeven => report.breakevens += 1,
            }
            report.total_pnl += trade.pnl;
            report.largest_win = report.largest_win.max(trade.pnl);
            report.largest_loss = report.largest_loss.min(trade.pnl);

            let won = (trade.result == TradeResult::Win) as usize;
            match trade.direction {
                Direction::Long => {
                    report.long_trades += 1;
                    report.long_wins += won;
                    report.long_pnl += trade.pnl;
                },
                Direction::Short => {
                    report.short_trades += 1;
                    report.short_wins += won;
                    report.short_pnl += trade.pnl;
                },
            }
        }

        report.win_rate = report.wins as f64 / n * 100.0;
        report.profit_factor = if report.gross_loss > 0.0 {
            report.gross_profit / report.gross_loss
        } else {
            0.0
        };
        if report.wins > 0 {
            report.avg_win = report.gross_profit / report.wins as f64;
        }
        if report.losses > 0 {
            report.avg_loss = report.gross_loss / report.losses as f64;
        }
        report.expectancy = report.total_pnl / n;
        report.ending_capital = initial_capital + report.total_pnl;

        // Drawdown from the compounded equity curve
        let mut equity = initial_capital;
        let mut peak = initial_capital;
        for trade in trades {
            equity += trade.pnl;
            peak = peak.max(equity);
            let drawdown = peak - equity;
            let drawdown_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
            if drawdown_pct > report.max_drawdown_pct {
                report.max_drawdown_pct = drawdown_pct;
                report.max_drawdown = drawdown;
            }
        }

        if trades.len() > 1 && initial_capital != 0.0 {
            let returns: Vec<f64> = trades.iter().map(|t| t.pnl / initial_capital).collect();
            let mean = returns.iter().sum::<f64>() / n;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                report.sharpe_ratio = mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt();
            }
        }

        report
    }
}

// ============================================================
// BACKTESTER
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestOptions {
    pub initial_capital: f64,
    /// LTF bars per HTF bar
    pub htf_ratio: usize,
    /// Bars skipped before the first signal check
    pub warmup_bars: usize,
    /// Trailing LTF bars handed to the generator
    pub ltf_window: usize,
    /// Trailing HTF bars handed to the generator
    pub htf_window: usize,
    pub exit_policy: ExitPolicy,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            initial_capital: 50_000.0,
            htf_ratio: 3,
            warmup_bars: 100,
            ltf_window: 200,
            htf_window: 50,
            exit_policy: ExitPolicy::Fixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutcome {
    pub symbol: String,
    /// Signals emitted by the generator, traded or not
    pub signals_found: usize,
    pub trades: Vec<TradeRecord>,
    /// Capital after each trade, starting with the initial capital
    pub equity_curve: Vec<f64>,
    pub report: BacktestReport,
}

/// Replays one instrument's history through its own signal generator
#[derive(Debug, Clone)]
pub struct Backtester {
    instrument: InstrumentSpec,
    generator: SignalGenerator,
    sizer: PositionSizer,
    options: BacktestOptions,
    max_trades_per_day: u32,
    min_risk_reward: f64,
}

impl Backtester {
    pub fn new(
        instrument: InstrumentSpec,
        params: &ModelParams,
        filters: EdgeFilters,
        options: BacktestOptions,
    ) -> Self {
        Self {
            generator: SignalGenerator::new(params, filters),
            sizer: PositionSizer::from_params(options.initial_capital, params),
            instrument,
            options,
            max_trades_per_day: params.max_trades_per_day,
            min_risk_reward: params.min_risk_reward,
        }
    }

    pub fn instrument(&self) -> &InstrumentSpec {
        &self.instrument
    }

    pub fn options(&self) -> &BacktestOptions {
        &self.options
    }

    /// Run over `bars`, oldest first. Errors only when the history cannot
    /// cover the warmup or the options are unusable; a malformed window
    /// skips that bar.
    pub fn run<T: OHLCV>(&mut self, bars: &[T]) -> Result<BacktestOutcome> {
        let BacktestOptions { initial_capital, htf_ratio, warmup_bars, ltf_window, htf_window, .. } =
            self.options;
        if bars.len() <= warmup_bars {
            return Err(ModelError::InsufficientData { need: warmup_bars + 1, got: bars.len() });
        }
        if ltf_window == 0 || htf_window == 0 {
            return Err(ModelError::InvalidConfig("backtest windows must be > 0".into()));
        }
        let htf = aggregate(bars, htf_ratio)?;

        self.generator.reset();
        self.sizer.update_account_size(initial_capital);

        let min_tick = self.instrument.min_tick;
        let mut capital = initial_capital;
        let mut equity_curve = vec![capital];
        let mut trades = Vec::new();
        let mut trades_per_day: HashMap<NaiveDate, u32> = HashMap::new();
        let mut signals_found = 0;

        for i in warmup_bars..bars.len() {
            let ltf = &bars[(i + 1).saturating_sub(ltf_window)..=i];
            let htf_len = (i + 1) / htf_ratio;
            let htf_slice = &htf[htf_len.saturating_sub(htf_window)..htf_len];

            let signal = match self.generator.check_for_signal(ltf, htf_slice, min_tick) {
                Ok(Some(signal)) => signal,
                Ok(None) => continue,
                Err(error) => {
                    warn!(symbol = %self.instrument.symbol, bar = i, %error, "skipping bar");
                    continue;
                },
            };
            signals_found += 1;

            let day = signal.time.with_timezone(&New_York).date_naive();
            let taken = trades_per_day.entry(day).or_insert(0);
            if *taken >= self.max_trades_per_day {
                debug!(%day, taken = *taken, "daily trade limit reached");
                continue;
            }
            if !signal.meets_risk_reward(self.min_risk_reward) {
                debug!(rr = signal.risk_reward_ratio, min = self.min_risk_reward, "risk/reward too low");
                continue;
            }

            let position =
                self.sizer
                    .calculate_position_size(&self.instrument, signal.entry, signal.stop_loss);
            if !self.sizer.validate_position(&position) {
                continue;
            }

            let trade = simulate_trade(&signal, &position, &bars[i + 1..], &self.options.exit_policy);
            *taken += 1;
            capital += trade.pnl;
            equity_curve.push(capital);
            self.sizer.update_account_size(capital);

            info!(
                symbol = %self.instrument.symbol,
                direction = %trade.direction,
                entry = trade.entry,
                exit = trade.exit,
                pnl = trade.pnl,
                result = ?trade.result,
                "trade closed"
            );
            trades.push(trade);
        }

        let report = BacktestReport::from_trades(&trades, initial_capital);
        info!(
            symbol = %self.instrument.symbol,
            signals_found,
            trades = trades.len(),
            total_pnl = report.total_pnl,
            "backtest complete"
        );

        Ok(BacktestOutcome {
            symbol: self.instrument.symbol.clone(),
            signals_found,
            trades,
            equity_curve,
            report,
        })
    }
}
