// src/thresholds.rs
//! Classifies an open position's unrealized P/L against configured
//! take-profit / stop-loss percentages.

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdState {
    Hold,
    Tp1,
    Tp2,
    Sl,
}

impl fmt::Display for ThresholdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThresholdState::Hold => "HOLD",
            ThresholdState::Tp1 => "TP1",
            ThresholdState::Tp2 => "TP2",
            ThresholdState::Sl => "SL",
        };
        f.write_str(s)
    }
}

/// All percentages are positive; `sl_pct` is a drawdown magnitude.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdPolicy {
    pub tp1_pct: f64,
    pub tp2_pct: f64,
    pub sl_pct: f64,
}

impl ThresholdPolicy {
    /// First match wins. TP2 is checked before TP1 because any P/L that
    /// clears TP2 also clears TP1 numerically.
    pub fn classify(&self, pnl_pct: f64) -> ThresholdState {
        if pnl_pct >= self.tp2_pct {
            ThresholdState::Tp2
        } else if pnl_pct >= self.tp1_pct {
            ThresholdState::Tp1
        } else if pnl_pct <= -self.sl_pct {
            ThresholdState::Sl
        } else {
            ThresholdState::Hold
        }
    }

    /// Fraction of the position the alert suggests closing.
    pub fn suggested_reduction(&self, state: ThresholdState) -> Option<f64> {
        match state {
            ThresholdState::Tp1 => Some(0.5),
            ThresholdState::Tp2 => Some(0.8),
            ThresholdState::Sl => Some(1.0),
            ThresholdState::Hold => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy {
            tp1_pct: 3.0,
            tp2_pct: 6.0,
            sl_pct: 2.0,
        }
    }

    #[test]
    fn tp2_wins_over_tp1() {
        assert_eq!(policy().classify(6.5), ThresholdState::Tp2);
    }

    #[test]
    fn tp1_band() {
        assert_eq!(policy().classify(3.1), ThresholdState::Tp1);
        assert_eq!(policy().classify(3.0), ThresholdState::Tp1);
        assert_eq!(policy().classify(5.9), ThresholdState::Tp1);
    }

    #[test]
    fn sl_on_drawdown() {
        assert_eq!(policy().classify(-2.5), ThresholdState::Sl);
        assert_eq!(policy().classify(-2.0), ThresholdState::Sl);
    }

    #[test]
    fn flat_is_hold() {
        assert_eq!(policy().classify(0.0), ThresholdState::Hold);
        assert_eq!(policy().classify(2.9), ThresholdState::Hold);
        assert_eq!(policy().classify(-1.9), ThresholdState::Hold);
    }

    #[test]
    fn reductions() {
        let p = policy();
        assert_eq!(p.suggested_reduction(ThresholdState::Tp1), Some(0.5));
        assert_eq!(p.suggested_reduction(ThresholdState::Tp2), Some(0.8));
        assert_eq!(p.suggested_reduction(ThresholdState::Sl), Some(1.0));
        assert_eq!(p.suggested_reduction(ThresholdState::Hold), None);
    }
}
