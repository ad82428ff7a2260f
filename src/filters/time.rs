//! Session-time edge filter
//!
//! The first half hour of the New York cash session carries the most
//! liquidity and the most resting stops. Windows are inclusive at both ends
//! and evaluated in exchange local time, so DST is handled by the zone.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::{America::New_York, Tz};
use serde::{Deserialize, Serialize};

const fn hms(h: u32, m: u32) -> u32 {
    h * 3600 + m * 60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeWindow {
    Optimal,
    Acceptable,
    Outside,
}

impl TimeWindow {
    pub fn is_tradeable(self) -> bool {
        !matches!(self, TimeWindow::Outside)
    }

    pub fn quality_multiplier(self) -> f64 {
        match self {
            TimeWindow::Optimal => 1.0,
            TimeWindow::Acceptable => 0.7,
            TimeWindow::Outside => 0.0,
        }
    }
}

/// Window bounds are seconds after local midnight
#[derive(Debug, Clone)]
pub struct TimeFilter {
    pub tz: Tz,
    pub optimal: (u32, u32),
    pub acceptable: (u32, u32),
}

impl Default for TimeFilter {
    fn default() -> Self {
        Self {
            tz: New_York,
            optimal: (hms(9, 30), hms(10, 0)),
            acceptable: (hms(9, 30), hms(11, 0)),
        }
    }
}

impl TimeFilter {
    pub fn classify(&self, time: DateTime<Utc>) -> TimeWindow {
        let secs = time.with_timezone(&self.tz).num_seconds_from_midnight();
        let within = |(start, end): (u32, u32)| (start..=end).contains(&secs);

        if within(self.optimal) {
            TimeWindow::Optimal
        } else if within(self.acceptable) {
            TimeWindow::Acceptable
        } else {
            TimeWindow::Outside
        }
    }

    pub fn quality_multiplier(&self, time: DateTime<Utc>) -> f64 {
        self.classify(time).quality_multiplier()
    }
}
