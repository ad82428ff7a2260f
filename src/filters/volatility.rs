//! Volatility-regime edge filter
//!
//! Sweep reversals work best in calm markets. The VIX reading comes from a
//! [`VixSource`]; the filter itself does no I/O.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// VIX at or below this is the low-volatility regime
pub const LOW_VIX_LEVEL: f64 = 15.0;

/// Supplies the VIX level in force at a given time
pub trait VixSource: Send + Sync {
    fn vix_at(&self, time: DateTime<Utc>) -> Option<f64>;
}

/// Fixed reading, or permanently unavailable with `StaticVix(None)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticVix(pub Option<f64>);

impl VixSource for StaticVix {
    fn vix_at(&self, _time: DateTime<Utc>) -> Option<f64> {
        self.0
    }
}

/// Daily VIX closes keyed by New York trading date.
///
/// A lookup returns the latest close on or before the bar's date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyVix {
    closes: BTreeMap<NaiveDate, f64>,
}

impl DailyVix {
    pub fn new(closes: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self { closes: closes.into_iter().collect() }
    }
}

impl VixSource for DailyVix {
    fn vix_at(&self, time: DateTime<Utc>) -> Option<f64> {
        let date = time.with_timezone(&New_York).date_naive();
        self.closes.range(..=date).next_back().map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolRegime {
    Low,
    Moderate,
    High,
    Unavailable,
}

impl VolRegime {
    pub fn is_favorable(self) -> bool {
        matches!(self, VolRegime::Low | VolRegime::Moderate)
    }

    pub fn quality_multiplier(self) -> f64 {
        match self {
            VolRegime::Low => 1.0,
            VolRegime::Moderate => 0.7,
            VolRegime::High | VolRegime::Unavailable => 0.0,
        }
    }
}

#[derive(Clone)]
pub struct VolatilityFilter {
    pub max_vix: f64,
    source: Arc<dyn VixSource>,
}

impl fmt::Debug for VolatilityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolatilityFilter")
            .field("max_vix", &self.max_vix)
            .finish_non_exhaustive()
    }
}

impl VolatilityFilter {
    pub fn new(max_vix: f64, source: Arc<dyn VixSource>) -> Self {
        Self { max_vix, source }
    }

    /// Regime at `time` together with the reading it was based on
    pub fn classify(&self, time: DateTime<Utc>) -> (VolRegime, Option<f64>) {
        let vix = self.source.vix_at(time).filter(|v| v.is_finite());
        let regime = match vix {
            None => VolRegime::Unavailable,
            Some(v) if v <= LOW_VIX_LEVEL => VolRegime::Low,
            Some(v) if v <= self.max_vix => VolRegime::Moderate,
            Some(_) => VolRegime::High,
        };
        (regime, vix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap()
    }

    fn filter(vix: Option<f64>) -> VolatilityFilter {
        VolatilityFilter::new(20.0, Arc::new(StaticVix(vix)))
    }

    #[test]
    fn test_regimes() {
        assert_eq!(filter(Some(12.0)).classify(now()), (VolRegime::Low, Some(12.0)));
        assert_eq!(filter(Some(15.0)).classify(now()).0, VolRegime::Low);
        assert_eq!(filter(Some(18.5)).classify(now()).0, VolRegime::Moderate);
        assert_eq!(filter(Some(20.0)).classify(now()).0, VolRegime::Moderate);
        assert_eq!(filter(Some(27.0)).classify(now()).0, VolRegime::High);
        assert_eq!(filter(None).classify(now()), (VolRegime::Unavailable, None));
        assert_eq!(filter(Some(f64::NAN)).classify(now()).0, VolRegime::Unavailable);
    }

    #[test]
    fn test_multipliers() {
        assert_eq!(VolRegime::Low.quality_multiplier(), 1.0);
        assert_eq!(VolRegime::Moderate.quality_multiplier(), 0.7);
        assert!(!VolRegime::High.is_favorable());
    }

    #[test]
    fn test_daily_vix_uses_latest_prior_close() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let source = DailyVix::new([(d(1), 14.0), (d(4), 22.0)]);

        assert_eq!(source.vix_at(now()), Some(22.0));
        let before = Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap();
        assert_eq!(source.vix_at(before), Some(14.0));
        let too_early = Utc.with_ymd_and_hms(2024, 2, 28, 15, 0, 0).unwrap();
        assert_eq!(source.vix_at(too_early), None);
    }
}
