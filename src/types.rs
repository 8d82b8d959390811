// src/types.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// One OHLC bar, most-recent last in any sequence. Closes feed the indicator
/// math as plain floats; nothing is persisted across scan cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Outcome of the signal classifier for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalAction {
    Buy,
    Exit,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalAction::Buy => "BUY",
            SignalAction::Exit => "EXIT",
            SignalAction::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// An approved trade request, already validated at the command boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub side: Side,
    pub symbol: String,
    pub notional_usdt: f64,
    pub kind: OrderKind,
    pub limit_price: Option<Decimal>,
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    pub reason: Option<String>,
}

/// What actually goes to the order gateway. `stop_price` is set only for
/// stop-limit legs.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<String>,
}

/// Confirmation shape shared by live and paper submissions, so formatting
/// code downstream is agnostic to the mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub symbol: String,
    pub status: String,
    pub simulated: bool,
}

#[derive(Debug, Clone)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
}
