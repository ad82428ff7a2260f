//! Common helper functions shared across the confirmation detectors
//!
//! Tick conversion, the three-bar gap test and the trailing indicators used
//! by momentum confluence.

use super::fvg::FvgKind;
use crate::OHLCV;

// ============================================================
// TICKS
// ============================================================

/// Convert a tick count into a price distance
#[inline]
pub fn ticks_to_points(ticks: u32, min_tick: f64) -> f64 {
    ticks as f64 * min_tick
}

// ============================================================
// THREE-BAR GAP
// ============================================================

/// Gap bounds `(top, bottom)` for the triple `c1, c2, c3`, if the middle bar
/// lies strictly inside the zone spanned by the outer bars.
///
/// - Bearish: top = `c1.high`, bottom = `c3.low`
/// - Bullish: bottom = `c1.low`, top = `c3.high`
///
/// `min_size` is in points; the gap must be at least that tall.
#[inline]
pub fn three_bar_gap<T: OHLCV>(
    c1: &T,
    c2: &T,
    c3: &T,
    kind: FvgKind,
    min_size: f64,
) -> Option<(f64, f64)> {
    let (top, bottom) = match kind {
        FvgKind::Bearish => (c1.high(), c3.low()),
        FvgKind::Bullish => (c3.high(), c1.low()),
    };

    let inside = c2.high() < top && c2.low() > bottom;
    if inside && top - bottom >= min_size {
        Some((top, bottom))
    } else {
        None
    }
}

// ============================================================
// INDICATORS
// ============================================================

/// Exponential moving average of closes, seeded with the SMA of the first
/// `period` closes. Returns the value at the last bar.
pub fn ema<T: OHLCV>(bars: &[T], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = bars[..period].iter().map(|b| b.close()).sum::<f64>() / period as f64;

    Some(
        bars[period..]
            .iter()
            .fold(seed, |prev, bar| alpha * bar.close() + (1.0 - alpha) * prev),
    )
}

/// Percent change of the last close versus the close `period` bars earlier
pub fn rate_of_change<T: OHLCV>(bars: &[T], period: usize) -> Option<f64> {
    if period == 0 || bars.len() <= period {
        return None;
    }

    let current = bars[bars.len() - 1].close();
    let previous = bars[bars.len() - 1 - period].close();
    if previous == 0.0 {
        return None;
    }

    Some((current - previous) / previous * 100.0)
}
