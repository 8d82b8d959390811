// src/strategies/momentum.rs
use crate::error::SentryError;
use crate::indicators::{rsi, sma};
use crate::types::SignalAction;
use serde::Deserialize;

/// Tunable thresholds. These are configuration, not validated market truth;
/// `Settings` carries the deployment's values.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalTuning {
    pub fast_sma_period: usize,
    pub slow_sma_period: usize,
    pub rsi_period: usize,
    pub buy_rsi_floor: f64,
    pub buy_rsi_ceiling: f64,
    pub exit_rsi: f64,
}

impl Default for SignalTuning {
    fn default() -> Self {
        Self {
            fast_sma_period: 20,
            slow_sma_period: 50,
            rsi_period: 14,
            buy_rsi_floor: 50.0,
            buy_rsi_ceiling: 70.0,
            exit_rsi: 45.0,
        }
    }
}

/// What the classifier concluded for one symbol, with the indicator values
/// that led there.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub action: SignalAction,
    pub sma_fast: f64,
    pub sma_slow: f64,
    pub rsi: f64,
    pub rationale: String,
}

/// Trend/momentum classifier over a closing-price sequence.
///
/// Evaluates the indicator set twice, on the full window and on the window
/// without its last bar, to see this bar's crossover and RSI direction.
/// Deterministic and side-effect free.
pub struct MomentumClassifier {
    tuning: SignalTuning,
}

impl MomentumClassifier {
    pub fn new(tuning: SignalTuning) -> Self {
        Self { tuning }
    }

    /// Bars needed before any classification: the slow SMA (or the RSI seed)
    /// must also be computable on the previous-bar window.
    pub fn required_history(&self) -> usize {
        self.tuning
            .slow_sma_period
            .max(self.tuning.rsi_period + 1)
            + 1
    }

    pub fn assess(&self, closes: &[f64]) -> Result<Assessment, SentryError> {
        let need = self.required_history();
        if closes.len() < need {
            return Err(SentryError::InsufficientHistory {
                have: closes.len(),
                need,
            });
        }

        let t = &self.tuning;
        let previous = &closes[..closes.len() - 1];
        let insufficient = || SentryError::InsufficientHistory {
            have: closes.len(),
            need,
        };

        let sma_fast = sma(closes, t.fast_sma_period).ok_or_else(insufficient)?;
        let sma_slow = sma(closes, t.slow_sma_period).ok_or_else(insufficient)?;
        let rsi_now = rsi(closes, t.rsi_period).ok_or_else(insufficient)?;
        let prev_fast = sma(previous, t.fast_sma_period).ok_or_else(insufficient)?;
        let prev_slow = sma(previous, t.slow_sma_period).ok_or_else(insufficient)?;
        let rsi_prev = rsi(previous, t.rsi_period).ok_or_else(insufficient)?;

        let crossed_up = prev_fast <= prev_slow && sma_fast > sma_slow;
        let trending = sma_fast > sma_slow;
        let rsi_rising = rsi_now > rsi_prev;
        let rsi_in_band = rsi_now >= t.buy_rsi_floor && rsi_now <= t.buy_rsi_ceiling;

        let (action, rationale) = if (crossed_up || (trending && rsi_rising)) && rsi_in_band {
            let mut held = Vec::new();
            if crossed_up {
                held.push(format!(
                    "SMA{} crossed above SMA{}",
                    t.fast_sma_period, t.slow_sma_period
                ));
            }
            if trending {
                held.push(format!(
                    "SMA{} above SMA{}",
                    t.fast_sma_period, t.slow_sma_period
                ));
            }
            if rsi_rising {
                held.push("RSI rising".to_string());
            }
            held.push(format!("RSI {:.1}", rsi_now));
            (SignalAction::Buy, held.join(", "))
        } else if sma_fast < sma_slow && rsi_now < t.exit_rsi {
            (
                SignalAction::Exit,
                format!(
                    "SMA{} below SMA{}, RSI {:.1} < {:.0}",
                    t.fast_sma_period, t.slow_sma_period, rsi_now, t.exit_rsi
                ),
            )
        } else {
            (SignalAction::Hold, "no actionable setup".to_string())
        };

        Ok(Assessment {
            action,
            sma_fast,
            sma_slow,
            rsi: rsi_now,
            rationale,
        })
    }
}
