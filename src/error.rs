// src/error.rs
use thiserror::Error;

/// Failure taxonomy for the monitoring core.
///
/// Per-symbol data failures (`DataUnavailable`, `InsufficientHistory`) are
/// caught and logged at the scan-cycle boundary; ledger and order failures
/// propagate to the command layer and become user-facing messages.
#[derive(Debug, Error)]
pub enum SentryError {
    /// Transient fetch failure: timeout, non-2xx, malformed payload.
    /// The symbol is skipped for this cycle, nothing is alerted.
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// The exchange does not know this symbol. Distinguished from the
    /// transient case so callers can stop retrying.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// Fewer bars than an indicator window needs. Suppresses classification,
    /// not reported as an error to the user during scans.
    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// `hold rm` on a symbol with no open position.
    #[error("no open position for {0}")]
    PositionNotFound(String),

    /// Notional over the configured cap, or the exchange refused the order.
    /// Surfaced to the user, never retried.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Entry filled but a protective leg (TP or SL) could not be placed.
    /// The entry is not unwound; the caller must show the note.
    #[error("entry placed but protective order failed: {0}")]
    PartialExecution(String),

    /// Command text that does not parse into a known intent.
    #[error("{0}")]
    InvalidCommand(String),
}

impl SentryError {
    pub fn data_unavailable(symbol: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }
}
