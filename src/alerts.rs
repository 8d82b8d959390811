// src/alerts.rs
//! Re-alert discipline. Remembers the last emitted state per symbol and
//! domain so an unchanged condition does not notify every scan cycle.

use crate::thresholds::ThresholdState;
use crate::types::SignalAction;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct AlertGate {
    cooldown: Duration,
    last_signal: HashMap<String, SignalAction>,
    signal_emitted_at: HashMap<(String, SignalAction), Instant>,
    last_threshold: HashMap<String, ThresholdState>,
}

impl AlertGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_signal: HashMap::new(),
            signal_emitted_at: HashMap::new(),
            last_threshold: HashMap::new(),
        }
    }

    /// Signal domain (BUY/EXIT): emit only when the action differs from the
    /// last stored one AND the per-(symbol, action) cooldown has elapsed.
    ///
    /// A change blocked by the cooldown leaves the stored state untouched, so
    /// a still-true condition fires as soon as the window closes. State and
    /// timestamp update together with a positive decision.
    pub fn permit_signal(&mut self, symbol: &str, action: SignalAction, now: Instant) -> bool {
        if self.last_signal.get(symbol) == Some(&action) {
            return false;
        }
        let key = (symbol.to_string(), action);
        if let Some(at) = self.signal_emitted_at.get(&key) {
            if now.duration_since(*at) < self.cooldown {
                return false;
            }
        }
        self.last_signal.insert(symbol.to_string(), action);
        self.signal_emitted_at.insert(key, now);
        true
    }

    /// Threshold domain (TP1/TP2/SL): emit only on a change to a non-HOLD
    /// state. De-escalation back to HOLD resets the stored state silently,
    /// which re-arms the edge for the next crossing.
    pub fn permit_threshold(&mut self, symbol: &str, state: ThresholdState) -> bool {
        let previous = self
            .last_threshold
            .insert(symbol.to_string(), state)
            .unwrap_or(ThresholdState::Hold);
        state != previous && state != ThresholdState::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(7200);

    fn gate() -> AlertGate {
        AlertGate::new(COOLDOWN)
    }

    #[test]
    fn threshold_emits_once_while_state_holds() {
        let mut g = gate();
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Tp1));
        assert!(!g.permit_threshold("SOLUSDT", ThresholdState::Tp1));
    }

    #[test]
    fn threshold_deescalation_is_silent_then_rearms() {
        let mut g = gate();
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Tp1));
        assert!(!g.permit_threshold("SOLUSDT", ThresholdState::Hold));
        // Re-reaching TP1 after dropping back emits again.
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Tp1));
    }

    #[test]
    fn threshold_escalation_emits() {
        let mut g = gate();
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Tp1));
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Tp2));
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Sl));
    }

    #[test]
    fn signal_unchanged_action_never_reemits() {
        let mut g = gate();
        let t0 = Instant::now();
        assert!(g.permit_signal("SOLUSDT", SignalAction::Buy, t0));
        assert!(!g.permit_signal("SOLUSDT", SignalAction::Buy, t0 + COOLDOWN * 2));
    }

    #[test]
    fn signal_oscillation_bounded_by_cooldown() {
        let mut g = gate();
        let t0 = Instant::now();
        assert!(g.permit_signal("SOLUSDT", SignalAction::Buy, t0));
        // Flip to EXIT immediately: a change, but within no prior EXIT emission,
        // so it passes; flip back to BUY is throttled by BUY's own timestamp.
        assert!(g.permit_signal("SOLUSDT", SignalAction::Exit, t0 + Duration::from_secs(60)));
        assert!(!g.permit_signal("SOLUSDT", SignalAction::Buy, t0 + Duration::from_secs(120)));
        // After the BUY cooldown expires the pending change fires.
        assert!(g.permit_signal("SOLUSDT", SignalAction::Buy, t0 + COOLDOWN));
    }

    #[test]
    fn signal_suppression_keeps_state_for_later() {
        let mut g = gate();
        let t0 = Instant::now();
        assert!(g.permit_signal("SOLUSDT", SignalAction::Buy, t0));
        assert!(g.permit_signal("SOLUSDT", SignalAction::Exit, t0 + Duration::from_secs(1)));
        // BUY blocked by cooldown: stored state must still read EXIT...
        assert!(!g.permit_signal("SOLUSDT", SignalAction::Buy, t0 + Duration::from_secs(2)));
        // ...so EXIT stays deduplicated,
        assert!(!g.permit_signal("SOLUSDT", SignalAction::Exit, t0 + Duration::from_secs(3)));
        // and BUY emits once its window closes.
        assert!(g.permit_signal("SOLUSDT", SignalAction::Buy, t0 + COOLDOWN + Duration::from_secs(1)));
    }

    #[test]
    fn symbols_are_independent() {
        let mut g = gate();
        let t0 = Instant::now();
        assert!(g.permit_signal("SOLUSDT", SignalAction::Buy, t0));
        assert!(g.permit_signal("ETHUSDT", SignalAction::Buy, t0));
        assert!(g.permit_threshold("SOLUSDT", ThresholdState::Tp1));
        assert!(g.permit_threshold("ETHUSDT", ThresholdState::Tp1));
    }
}
