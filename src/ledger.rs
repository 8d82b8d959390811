// src/ledger.rs
//! Manually maintained position ledger: symbol -> (quantity, weighted
//! average cost). The engine is the single writer; every mutation rewrites
//! the backing document wholesale.

use crate::error::SentryError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "qty")]
    pub quantity: Decimal,
    #[serde(rename = "avg")]
    pub average_cost: Decimal,
}

impl Position {
    /// Unrealized P/L percent against a live price, 0 when the average cost
    /// is not meaningful.
    pub fn pnl_pct(&self, price: Decimal) -> f64 {
        if self.average_cost <= Decimal::ZERO {
            return 0.0;
        }
        ((price / self.average_cost).to_f64().unwrap_or(1.0) - 1.0) * 100.0
    }
}

/// What a `reduce` actually did. `remaining` is `None` when the position was
/// closed out entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceOutcome {
    pub removed: Decimal,
    pub remaining: Option<Position>,
}

pub struct Ledger {
    positions: BTreeMap<String, Position>,
    path: PathBuf,
}

impl Ledger {
    /// Loads the persisted document, starting empty when it is missing or
    /// unreadable. A corrupt file is logged and reset, never fatal.
    pub async fn load(path: PathBuf) -> Self {
        let positions = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<BTreeMap<String, Position>>(&data) {
                Ok(map) => {
                    info!("Restored {} position(s) from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("Ledger file {} is corrupt ({e}), starting empty", path.display());
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { positions, path }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            positions: BTreeMap::new(),
            path: std::env::temp_dir().join("sentry-ledger-scratch.json"),
        }
    }

    /// Opens or increases a position, folding `qty @ price` into the
    /// weighted average cost. Returns the resulting snapshot.
    pub fn add(&mut self, symbol: &str, qty: Decimal, price: Decimal) -> Position {
        let entry = self
            .positions
            .entry(symbol.to_string())
            .or_insert(Position {
                quantity: Decimal::ZERO,
                average_cost: Decimal::ZERO,
            });
        let total = entry.quantity + qty;
        entry.average_cost = (entry.quantity * entry.average_cost + qty * price) / total;
        entry.quantity = total;
        entry.clone()
    }

    /// Decreases a position by up to `qty`, deleting it once flat. Reducing
    /// more than held removes the position instead of going negative.
    pub fn reduce(&mut self, symbol: &str, qty: Decimal) -> Result<ReduceOutcome, SentryError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| SentryError::PositionNotFound(symbol.to_string()))?;

        let removed = qty.min(position.quantity);
        position.quantity -= removed;

        if position.quantity <= Decimal::ZERO {
            self.positions.remove(symbol);
            return Ok(ReduceOutcome {
                removed,
                remaining: None,
            });
        }
        Ok(ReduceOutcome {
            removed,
            remaining: Some(position.clone()),
        })
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Position)> {
        self.positions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Rewrites the whole document. The caller surfaces a failed write to
    /// the user; it must not disappear into a log nobody reads.
    pub async fn persist(&self) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(&self.positions)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}
