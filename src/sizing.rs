//! Risk-based position sizing
//!
//! Contracts are sized so the stop distance costs at most `RISK_PER_TRADE` of
//! the account. Instruments with a bracket table are further capped by stop
//! distance. The result is never below one contract, even when one contract
//! exceeds the budget; [`PositionSizer::validate_position`] is where such a
//! position gets rejected.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    params::{InstrumentSpec, ModelParams},
    Ratio,
};

/// Slack over the risk budget accepted by `validate_position`
pub const RISK_TOLERANCE: f64 = 1.1;

/// Stop distance range in points (inclusive) mapped to a contract cap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractBracket {
    pub min_points: f64,
    pub max_points: f64,
    pub contracts: u32,
}

impl ContractBracket {
    pub const fn new(min_points: f64, max_points: f64, contracts: u32) -> Self {
        Self { min_points, max_points, contracts }
    }

    #[inline]
    pub fn contains(&self, risk_points: f64) -> bool {
        (self.min_points..=self.max_points).contains(&risk_points)
    }
}

pub const MNQ_BRACKETS: [ContractBracket; 5] = [
    ContractBracket::new(20.0, 24.0, 5),
    ContractBracket::new(25.0, 30.0, 4),
    ContractBracket::new(31.0, 40.0, 3),
    ContractBracket::new(41.0, 60.0, 2),
    ContractBracket::new(60.0, 120.0, 1),
];

/// Contract cap for a stop distance; one contract outside every bracket
pub fn bracket_contracts(brackets: &[ContractBracket], risk_points: f64) -> u32 {
    match brackets.iter().find(|b| b.contains(risk_points)) {
        Some(bracket) => {
            debug!(risk_points, contracts = bracket.contracts, "bracket matched");
            bracket.contracts
        },
        None => {
            warn!(risk_points, "risk outside brackets, using 1 contract");
            1
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub symbol: String,
    pub contracts: u32,
    pub entry: f64,
    pub stop: f64,
    pub risk_points: f64,
    pub risk_ticks: f64,
    pub risk_per_contract: f64,
    /// contracts * risk_per_contract
    pub total_risk_dollars: f64,
    /// Percent of the account at risk
    pub risk_percentage: f64,
    pub tick_value: f64,
    pub min_tick: f64,
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    account_size: f64,
    risk_per_trade: Ratio,
    max_risk_dollars: f64,
}

impl PositionSizer {
    pub fn new(account_size: f64, risk_per_trade: Ratio) -> Self {
        Self {
            account_size,
            risk_per_trade,
            max_risk_dollars: account_size * risk_per_trade.get(),
        }
    }

    pub fn from_params(account_size: f64, params: &ModelParams) -> Self {
        Self::new(account_size, params.risk_per_trade)
    }

    pub fn account_size(&self) -> f64 {
        self.account_size
    }

    pub fn risk_per_trade(&self) -> Ratio {
        self.risk_per_trade
    }

    pub fn max_risk_dollars(&self) -> f64 {
        self.max_risk_dollars
    }

    pub fn calculate_position_size(
        &self,
        instrument: &InstrumentSpec,
        entry: f64,
        stop: f64,
    ) -> PositionSize {
        let risk_points = (entry - stop).abs();
        let risk_ticks = risk_points / instrument.min_tick;
        let risk_per_contract = risk_ticks * instrument.tick_value;

        let by_risk = if risk_per_contract > 0.0 {
            (self.max_risk_dollars / risk_per_contract).floor().max(0.0) as u32
        } else {
            1
        };
        let capped = match &instrument.brackets {
            Some(brackets) => by_risk.min(bracket_contracts(brackets, risk_points)),
            None => by_risk,
        };
        let contracts = capped.max(1);

        let total_risk_dollars = contracts as f64 * risk_per_contract;
        let risk_percentage = if self.account_size != 0.0 {
            total_risk_dollars / self.account_size * 100.0
        } else {
            0.0
        };

        info!(
            symbol = %instrument.symbol,
            contracts,
            total_risk_dollars,
            risk_percentage,
            "position sized"
        );

        PositionSize {
            symbol: instrument.symbol.clone(),
            contracts,
            entry,
            stop,
            risk_points,
            risk_ticks,
            risk_per_contract,
            total_risk_dollars,
            risk_percentage,
            tick_value: instrument.tick_value,
            min_tick: instrument.min_tick,
        }
    }

    /// False when the position risks more than the budget plus tolerance
    pub fn validate_position(&self, position: &PositionSize) -> bool {
        if position.total_risk_dollars > self.max_risk_dollars * RISK_TOLERANCE {
            warn!(
                total_risk = position.total_risk_dollars,
                max_risk = self.max_risk_dollars,
                "position risk exceeds budget"
            );
            return false;
        }
        if position.contracts < 1 {
            warn!("position has no contracts");
            return false;
        }
        true
    }

    pub fn update_account_size(&mut self, account_size: f64) {
        self.account_size = account_size;
        self.max_risk_dollars = account_size * self.risk_per_trade.get();
        debug!(account_size, max_risk = self.max_risk_dollars, "account updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(50_000.0, Ratio::new_const(0.005))
    }

    #[test]
    fn test_budget() {
        assert_eq!(sizer().max_risk_dollars(), 250.0);
    }

    #[test]
    fn test_bracket_lookup() {
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 20.0), 5);
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 24.0), 5);
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 30.0), 4);
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 45.0), 2);
        // 60 falls in the first matching bracket
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 60.0), 2);
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 24.5), 1);
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 12.0), 1);
        assert_eq!(bracket_contracts(&MNQ_BRACKETS, 200.0), 1);
    }

    #[test]
    fn test_risk_only_sizing() {
        let es = InstrumentSpec::es();
        // 2 points = 8 ticks = $400 per contract, over budget: still one contract
        let pos = sizer().calculate_position_size(&es, 5000.0, 5002.0);
        assert_eq!(pos.contracts, 1);
        assert_eq!(pos.total_risk_dollars, 400.0);
        assert!(!sizer().validate_position(&pos));

        let custom = InstrumentSpec::new("MES", 1.25, 0.25).unwrap();
        let pos = sizer().calculate_position_size(&custom, 5000.0, 4990.0);
        // 40 ticks * 1.25 = 50 per contract
        assert_eq!(pos.contracts, 5);
        assert!(sizer().validate_position(&pos));
    }

    #[test]
    fn test_zero_risk_distance() {
        let pos = sizer().calculate_position_size(&InstrumentSpec::es(), 5000.0, 5000.0);
        assert_eq!(pos.contracts, 1);
        assert_eq!(pos.total_risk_dollars, 0.0);
    }

    #[test]
    fn test_update_account_size() {
        let mut s = sizer();
        s.update_account_size(100_000.0);
        assert_eq!(s.max_risk_dollars(), 500.0);
        assert_eq!(s.account_size(), 100_000.0);
    }
}
