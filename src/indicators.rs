// src/indicators.rs
//! Pure indicator math over a closing-price slice, most-recent last.
//! No state, no I/O; callers re-run these over whatever window they hold.

/// Arithmetic mean of the last `period` closes.
///
/// Returns `None` when fewer than `period` values are available. No
/// smoothing, no lookback beyond the window.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder's smoothed RSI over the full slice.
///
/// Needs more than `period` closes (`period` deltas to seed the averages).
/// Seed averages are the simple mean of gains/losses over the first `period`
/// deltas; each later delta folds in as
/// `avg = (avg * (period - 1) + value) / period`.
///
/// A window with no losses saturates at 100 rather than dividing by zero.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for w in closes[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for w in closes[period..].windows(2) {
        let delta = w[1] - w[0];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}
