// src/connectors/messages.rs
use crate::types::Kline;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// `/api/v3/ticker/price` answer, reduced to the field we read.
#[derive(Debug, Deserialize)]
pub struct WireTicker {
    pub price: String,
}

/// Order ids come back numeric on some endpoints and as strings on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Num(u64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Num(n) => write!(f, "{n}"),
            WireId::Text(s) => f.write_str(s),
        }
    }
}

/// `/api/v3/order` answer. `status` is absent on some gateway versions.
#[derive(Debug, Deserialize)]
pub struct WireOrder {
    #[serde(rename = "orderId")]
    pub order_id: WireId,
    pub symbol: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireBalance {
    pub asset: String,
    pub free: String,
}

/// `/api/v3/account` answer, reduced to what the balance report needs.
#[derive(Debug, Deserialize)]
pub struct WireAccount {
    pub balances: Vec<WireBalance>,
}

/// One `/api/v3/klines` row:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume]`
/// with the numeric fields serialized as strings. Returns `None` on any
/// shape mismatch so the caller can flag the whole payload as malformed.
pub fn parse_kline_row(row: &Value) -> Option<Kline> {
    let columns = row.as_array()?;
    if columns.len() < 6 {
        return None;
    }
    Some(Kline {
        open_time: columns[0].as_i64()?,
        open: loose_f64(&columns[1])?,
        high: loose_f64(&columns[2])?,
        low: loose_f64(&columns[3])?,
        close: loose_f64(&columns[4])?,
        volume: loose_f64(&columns[5])?,
    })
}

fn loose_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
