//! Model configuration and parameter metadata
//!
//! [`ModelParams`] holds every tunable of the confirmation model. It loads
//! from TOML using the upper-case keys traders already know
//! (`MIN_SWING_CANDLES`, `RISK_PER_TRADE`, ...); missing keys fall back to
//! the defaults.
//!
//! # Example
//!
//! ```rust
//! use confirmation_model::params::ModelParams;
//!
//! let params = ModelParams::from_toml_str(
//!   r#"
//!   MIN_SWING_CANDLES = 5
//!   RISK_PER_TRADE = 0.01
//!   "#,
//! )
//! .unwrap();
//!
//! assert_eq!(params.min_swing_candles.get(), 5);
//! assert_eq!(params.max_trades_per_day, 2);
//!
//! for meta in ModelParams::param_meta() {
//!   println!("{}: {:?} (default: {})", meta.name, meta.param_type, meta.default);
//! }
//! ```

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{sizing::ContractBracket, ModelError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Non-negative integer (ticks, bars, trades)
  Count,
  /// Unbounded real threshold (VIX level, score, percent)
  Level,
}

/// Metadata for a single model parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Configuration key (e.g., "MIN_SWING_CANDLES")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  pub const fn level(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Level, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
      let v = min + step * i as f64;
      if v > max + 1e-9 {
        break;
      }
      values.push(v);
      i += 1;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(ModelError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period if value < 1.0 || value.fract() != 0.0 => {
        Err(ModelError::InvalidValue("Period must be a positive integer"))
      },
      ParamType::Count if value < 0.0 || value.fract() != 0.0 => {
        Err(ModelError::InvalidValue("Count must be a non-negative integer"))
      },
      _ => Ok(()),
    }
  }
}

static PARAM_META: [ParamMeta; 15] = [
  ParamMeta::period(
    "MIN_SWING_CANDLES",
    3.0,
    (1.0, 10.0, 1.0),
    "Bars on each side a swing must strictly dominate",
  ),
  ParamMeta::count(
    "SWEEP_BUFFER_TICKS",
    1.0,
    (0.0, 20.0, 1.0),
    "Ticks beyond a swing needed to count as a sweep",
  ),
  ParamMeta::count(
    "MIN_FVG_SIZE_TICKS",
    2.0,
    (0.0, 40.0, 1.0),
    "Minimum HTF fair value gap size in ticks",
  ),
  ParamMeta::count(
    "MAX_HTF_FVG_AGE",
    20.0,
    (1.0, 200.0, 1.0),
    "Delivery checks an HTF gap survives before expiring",
  ),
  ParamMeta::count(
    "STOP_LOSS_BUFFER_TICKS",
    3.0,
    (0.0, 40.0, 1.0),
    "Ticks beyond the swept level for the stop",
  ),
  ParamMeta::level("MAX_VIX_LEVEL", 20.0, (10.0, 80.0, 5.0), "Highest favourable VIX reading"),
  ParamMeta::level(
    "MIN_SWEEP_QUALITY",
    7.0,
    (0.0, 10.0, 1.0),
    "Sweep quality below which a warning is logged",
  ),
  ParamMeta::ratio(
    "MIN_OVERALL_SCORE",
    0.7,
    (0.0, 1.0, 0.1),
    "Overall filter score below which a warning is logged",
  ),
  ParamMeta::ratio(
    "RISK_PER_TRADE",
    0.005,
    (0.001, 0.05, 0.001),
    "Fraction of the account risked per trade",
  ),
  ParamMeta::count("MAX_TRADES_PER_DAY", 2.0, (1.0, 20.0, 1.0), "Trade cap per New York day"),
  ParamMeta::level(
    "MIN_RISK_REWARD",
    2.0,
    (0.0, 10.0, 0.5),
    "Minimum reward to risk ratio accepted by the backtester",
  ),
  ParamMeta::count(
    "IFVG_MIN_SIZE_TICKS",
    1.0,
    (0.0, 40.0, 1.0),
    "Minimum LTF gap size for an inversion",
  ),
  ParamMeta::period("MOMENTUM_PERIOD", 10.0, (2.0, 50.0, 1.0), "Rate of change lookback in bars"),
  ParamMeta::level(
    "MIN_MOMENTUM_PCT",
    0.05,
    (0.0, 5.0, 0.05),
    "Minimum directional rate of change in percent",
  ),
  ParamMeta::period("HTF_EMA_PERIOD", 20.0, (2.0, 200.0, 1.0), "HTF trend EMA period"),
];

// ============================================================
// MODEL PARAMETERS
// ============================================================

/// All tunables of the confirmation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default, deny_unknown_fields)]
pub struct ModelParams {
  pub min_swing_candles: Period,
  pub sweep_buffer_ticks: u32,
  pub min_fvg_size_ticks: u32,
  pub max_htf_fvg_age: u32,
  pub stop_loss_buffer_ticks: u32,
  pub max_vix_level: f64,
  pub min_sweep_quality: f64,
  pub min_overall_score: f64,
  pub use_edge_filters: bool,
  pub risk_per_trade: Ratio,
  pub max_trades_per_day: u32,
  pub min_risk_reward: f64,
  /// Enables the fifth (momentum) confirmation stage
  pub require_momentum: bool,
  pub ifvg_min_size_ticks: u32,
  pub momentum_period: Period,
  pub min_momentum_pct: f64,
  pub htf_ema_period: Period,
}

impl Default for ModelParams {
  fn default() -> Self {
    Self {
      min_swing_candles: Period::new_const(3),
      sweep_buffer_ticks: 1,
      min_fvg_size_ticks: 2,
      max_htf_fvg_age: 20,
      stop_loss_buffer_ticks: 3,
      max_vix_level: 20.0,
      min_sweep_quality: 7.0,
      min_overall_score: 0.7,
      use_edge_filters: true,
      risk_per_trade: Ratio::new_const(0.005),
      max_trades_per_day: 2,
      min_risk_reward: 2.0,
      require_momentum: false,
      ifvg_min_size_ticks: 1,
      momentum_period: Period::new_const(10),
      min_momentum_pct: 0.05,
      htf_ema_period: Period::new_const(20),
    }
  }
}

impl ModelParams {
  /// Metadata for every numeric parameter
  pub fn param_meta() -> &'static [ParamMeta] {
    &PARAM_META
  }

  /// Parse TOML and validate the result
  pub fn from_toml_str(s: &str) -> Result<Self> {
    let params: Self = toml::from_str(s).map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
    params.validate()?;
    Ok(params)
  }

  pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
      .map_err(|e| ModelError::InvalidConfig(format!("{}: {e}", path.display())))?;
    Self::from_toml_str(&contents)
  }

  /// Numeric value of a parameter by configuration key
  pub fn value_of(&self, key: &str) -> Option<f64> {
    let value = match key {
      "MIN_SWING_CANDLES" => self.min_swing_candles.get() as f64,
      "SWEEP_BUFFER_TICKS" => self.sweep_buffer_ticks as f64,
      "MIN_FVG_SIZE_TICKS" => self.min_fvg_size_ticks as f64,
      "MAX_HTF_FVG_AGE" => self.max_htf_fvg_age as f64,
      "STOP_LOSS_BUFFER_TICKS" => self.stop_loss_buffer_ticks as f64,
      "MAX_VIX_LEVEL" => self.max_vix_level,
      "MIN_SWEEP_QUALITY" => self.min_sweep_quality,
      "MIN_OVERALL_SCORE" => self.min_overall_score,
      "RISK_PER_TRADE" => self.risk_per_trade.get(),
      "MAX_TRADES_PER_DAY" => self.max_trades_per_day as f64,
      "MIN_RISK_REWARD" => self.min_risk_reward,
      "IFVG_MIN_SIZE_TICKS" => self.ifvg_min_size_ticks as f64,
      "MOMENTUM_PERIOD" => self.momentum_period.get() as f64,
      "MIN_MOMENTUM_PCT" => self.min_momentum_pct,
      "HTF_EMA_PERIOD" => self.htf_ema_period.get() as f64,
      _ => return None,
    };
    Some(value)
  }

  /// Check every numeric parameter against its metadata range
  pub fn validate(&self) -> Result<()> {
    for meta in Self::param_meta() {
      if let Some(value) = self.value_of(meta.name) {
        meta.validate(value)?;
      }
    }
    Ok(())
  }

  /// Copy of these parameters with numeric overrides applied.
  ///
  /// Keys not present keep their current value. Unknown keys are rejected.
  pub fn with_overrides(&self, overrides: &HashMap<&str, f64>) -> Result<Self> {
    if let Some(unknown) = overrides.keys().find(|k| self.value_of(k).is_none()) {
      return Err(ModelError::InvalidConfig(format!("unknown parameter {unknown}")));
    }

    let p = Self {
      min_swing_candles: get_period(overrides, "MIN_SWING_CANDLES", self.min_swing_candles)?,
      sweep_buffer_ticks: get_count(overrides, "SWEEP_BUFFER_TICKS", self.sweep_buffer_ticks),
      min_fvg_size_ticks: get_count(overrides, "MIN_FVG_SIZE_TICKS", self.min_fvg_size_ticks),
      max_htf_fvg_age: get_count(overrides, "MAX_HTF_FVG_AGE", self.max_htf_fvg_age),
      stop_loss_buffer_ticks: get_count(
        overrides,
        "STOP_LOSS_BUFFER_TICKS",
        self.stop_loss_buffer_ticks,
      ),
      max_vix_level: get_level(overrides, "MAX_VIX_LEVEL", self.max_vix_level),
      min_sweep_quality: get_level(overrides, "MIN_SWEEP_QUALITY", self.min_sweep_quality),
      min_overall_score: get_level(overrides, "MIN_OVERALL_SCORE", self.min_overall_score),
      use_edge_filters: self.use_edge_filters,
      risk_per_trade: get_ratio(overrides, "RISK_PER_TRADE", self.risk_per_trade)?,
      max_trades_per_day: get_count(overrides, "MAX_TRADES_PER_DAY", self.max_trades_per_day),
      min_risk_reward: get_level(overrides, "MIN_RISK_REWARD", self.min_risk_reward),
      require_momentum: self.require_momentum,
      ifvg_min_size_ticks: get_count(overrides, "IFVG_MIN_SIZE_TICKS", self.ifvg_min_size_ticks),
      momentum_period: get_period(overrides, "MOMENTUM_PERIOD", self.momentum_period)?,
      min_momentum_pct: get_level(overrides, "MIN_MOMENTUM_PCT", self.min_momentum_pct),
      htf_ema_period: get_period(overrides, "HTF_EMA_PERIOD", self.htf_ema_period)?,
    };

    // Range and integrality checks run on the raw override values
    for (key, value) in overrides {
      if let Some(meta) = PARAM_META.iter().find(|m| m.name == *key) {
        meta.validate(*value)?;
      }
    }
    Ok(p)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn get_ratio(params: &HashMap<&str, f64>, key: &str, current: Ratio) -> Result<Ratio> {
  params.get(key).map_or(Ok(current), |v| Ratio::new(*v))
}

fn get_period(params: &HashMap<&str, f64>, key: &str, current: Period) -> Result<Period> {
  params.get(key).map_or(Ok(current), |v| Period::new(*v as usize))
}

fn get_count(params: &HashMap<&str, f64>, key: &str, current: u32) -> u32 {
  params.get(key).map_or(current, |v| *v as u32)
}

fn get_level(params: &HashMap<&str, f64>, key: &str, current: f64) -> f64 {
  params.get(key).copied().unwrap_or(current)
}

// ============================================================
// INSTRUMENTS
// ============================================================

/// Contract metadata needed for sizing and P&L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
  pub symbol: String,
  /// Dollar value of one tick
  pub tick_value: f64,
  /// Price increment in points
  pub min_tick: f64,
  /// Stop-distance contract table; when absent the sizer uses risk alone
  #[serde(default)]
  pub brackets: Option<Vec<ContractBracket>>,
}

impl InstrumentSpec {
  pub fn new(symbol: impl Into<String>, tick_value: f64, min_tick: f64) -> Result<Self> {
    let spec = Self { symbol: symbol.into(), tick_value, min_tick, brackets: None };
    spec.validate()?;
    Ok(spec)
  }

  pub fn with_brackets(mut self, brackets: Vec<ContractBracket>) -> Self {
    self.brackets = Some(brackets);
    self
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.tick_value.is_finite() && self.tick_value > 0.0) {
      return Err(ModelError::InvalidValue("tick_value must be > 0"));
    }
    if !(self.min_tick.is_finite() && self.min_tick > 0.0) {
      return Err(ModelError::InvalidValue("min_tick must be > 0"));
    }
    Ok(())
  }

  /// Micro E-mini Nasdaq-100, bracket sized
  pub fn mnq() -> Self {
    Self {
      symbol: "MNQ".to_string(),
      tick_value: 2.0,
      min_tick: 0.25,
      brackets: Some(crate::sizing::MNQ_BRACKETS.to_vec()),
    }
  }

  /// E-mini S&P 500
  pub fn es() -> Self {
    Self { symbol: "ES".to_string(), tick_value: 50.0, min_tick: 0.25, brackets: None }
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let p = ModelParams::default();
    assert_eq!(p.min_swing_candles.get(), 3);
    assert_eq!(p.sweep_buffer_ticks, 1);
    assert_eq!(p.max_htf_fvg_age, 20);
    assert_eq!(p.risk_per_trade.get(), 0.005);
    assert!(p.use_edge_filters);
    assert!(!p.require_momentum);
    assert!(p.validate().is_ok());
  }

  #[test]
  fn test_meta_defaults_match_params() {
    let p = ModelParams::default();
    for meta in ModelParams::param_meta() {
      let value = p.value_of(meta.name).unwrap();
      assert!((value - meta.default).abs() < 1e-12, "{} default mismatch", meta.name);
      assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
    }
  }

  #[test]
  fn test_from_toml_partial() {
    let p = ModelParams::from_toml_str(
      r#"
      MIN_FVG_SIZE_TICKS = 4
      USE_EDGE_FILTERS = false
      REQUIRE_MOMENTUM = true
      "#,
    )
    .unwrap();

    assert_eq!(p.min_fvg_size_ticks, 4);
    assert!(!p.use_edge_filters);
    assert!(p.require_momentum);
    assert_eq!(p.stop_loss_buffer_ticks, 3);
  }

  #[test]
  fn test_from_toml_rejects_invalid() {
    assert!(matches!(
      ModelParams::from_toml_str("RISK_PER_TRADE = 1.5"),
      Err(ModelError::InvalidConfig(_))
    ));
    assert!(ModelParams::from_toml_str("MIN_SWING_CANDLES = 0").is_err());
    assert!(ModelParams::from_toml_str("NOT_A_KEY = 1").is_err());
    // Parses, but fails range validation
    assert!(matches!(
      ModelParams::from_toml_str("MAX_VIX_LEVEL = 500.0"),
      Err(ModelError::OutOfRange { field: "MAX_VIX_LEVEL", .. })
    ));
  }

  #[test]
  fn test_from_toml_file_missing() {
    assert!(ModelParams::from_toml_file("/nonexistent/model.toml").is_err());
  }

  #[test]
  fn test_with_overrides() {
    let base = ModelParams::default();
    let mut overrides = HashMap::new();
    overrides.insert("MIN_SWING_CANDLES", 5.0);
    overrides.insert("RISK_PER_TRADE", 0.01);

    let p = base.with_overrides(&overrides).unwrap();
    assert_eq!(p.min_swing_candles.get(), 5);
    assert_eq!(p.risk_per_trade.get(), 0.01);
    assert_eq!(p.sweep_buffer_ticks, base.sweep_buffer_ticks);

    overrides.insert("BOGUS", 1.0);
    assert!(base.with_overrides(&overrides).is_err());

    let mut fractional = HashMap::new();
    fractional.insert("SWEEP_BUFFER_TICKS", 1.5);
    assert!(base.with_overrides(&fractional).is_err());
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < 1e-9);
    assert!((grid[1] - 0.5).abs() < 1e-9);
    assert!((grid[2] - 0.7).abs() < 1e-9);
  }

  #[test]
  fn test_validate_period_and_count() {
    let period = ParamMeta::period("test", 14.0, (1.0, 20.0, 1.0), "Test");
    assert!(period.validate(14.0).is_ok());
    assert!(period.validate(14.5).is_err());
    assert!(period.validate(0.0).is_err());

    let count = ParamMeta::count("test", 2.0, (0.0, 10.0, 1.0), "Test");
    assert!(count.validate(0.0).is_ok());
    assert!(count.validate(2.5).is_err());
    assert!(count.validate(11.0).is_err());
  }

  #[test]
  fn test_instrument_spec() {
    let mnq = InstrumentSpec::mnq();
    assert_eq!(mnq.min_tick, 0.25);
    assert!(mnq.brackets.is_some());
    assert!(InstrumentSpec::new("X", 1.0, 0.0).is_err());
    assert!(InstrumentSpec::new("X", -1.0, 0.25).is_err());
    assert!(InstrumentSpec::new("X", 5.0, 0.25).is_ok());
  }
}
