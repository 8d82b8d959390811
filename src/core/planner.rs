// src/core/planner.rs
use crate::connectors::traits::{MarketData, OrderGateway};
use crate::error::SentryError;
use crate::types::{OrderAck, OrderKind, OrderRequest, Side, TradeIntent};
use crate::utils::precision::quantity_for_notional;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one protective leg of a bracket.
#[derive(Debug, Clone, PartialEq)]
pub enum LegOutcome {
    Placed(OrderAck),
    Failed(String),
}

/// What the planner did with an approved intent. Legs are `None` when the
/// entry was not a BUY (nothing to protect).
#[derive(Debug, Clone)]
pub struct BracketReport {
    pub entry: OrderAck,
    pub quantity: Decimal,
    pub reference_price: Decimal,
    pub take_profit: Option<LegOutcome>,
    pub stop_loss: Option<LegOutcome>,
}

impl BracketReport {
    /// A surfaced note when the entry stands but a protective leg failed.
    pub fn partial_failure(&self) -> Option<SentryError> {
        let mut notes = Vec::new();
        if let Some(LegOutcome::Failed(e)) = &self.take_profit {
            notes.push(format!("TP: {e}"));
        }
        if let Some(LegOutcome::Failed(e)) = &self.stop_loss {
            notes.push(format!("SL: {e}"));
        }
        if notes.is_empty() {
            None
        } else {
            Some(SentryError::PartialExecution(notes.join("; ")))
        }
    }
}

/// Turns an approved trade intent into an entry order plus, for a BUY, a
/// take-profit limit and a stop-loss stop-limit on the filled quantity.
pub struct OrderPlanner {
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    max_order_usdt: f64,
    lot_step: Decimal,
}

impl OrderPlanner {
    pub fn new(
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        max_order_usdt: f64,
        lot_step: Decimal,
    ) -> Self {
        Self {
            market,
            gateway,
            max_order_usdt,
            lot_step,
        }
    }

    pub async fn execute(&self, intent: &TradeIntent) -> Result<BracketReport, SentryError> {
        if intent.notional_usdt > self.max_order_usdt {
            return Err(SentryError::OrderRejected(format!(
                "{} USDT exceeds the {} USDT cap",
                intent.notional_usdt, self.max_order_usdt
            )));
        }

        let reference_price = match intent.kind {
            OrderKind::Limit => intent.limit_price.ok_or_else(|| {
                SentryError::OrderRejected("limit order without a limit price".to_string())
            })?,
            OrderKind::Market => self.market.price(&intent.symbol).await?,
        };

        let notional = Decimal::from_f64(intent.notional_usdt).ok_or_else(|| {
            SentryError::OrderRejected(format!("bad notional {}", intent.notional_usdt))
        })?;
        let quantity = quantity_for_notional(notional, reference_price, self.lot_step);
        if quantity <= Decimal::ZERO {
            return Err(SentryError::OrderRejected(format!(
                "{} USDT buys less than one lot at {}",
                intent.notional_usdt, reference_price
            )));
        }

        let entry = self
            .gateway
            .submit(&OrderRequest {
                symbol: intent.symbol.clone(),
                side: intent.side,
                kind: match intent.kind {
                    OrderKind::Market => "MARKET".to_string(),
                    OrderKind::Limit => "LIMIT".to_string(),
                },
                quantity,
                price: intent.limit_price,
                stop_price: None,
                time_in_force: matches!(intent.kind, OrderKind::Limit)
                    .then(|| "GTC".to_string()),
            })
            .await?;

        info!(
            "Entry placed: {} {} {} @ ref {}",
            intent.side.as_str(),
            quantity,
            intent.symbol,
            reference_price
        );

        let mut report = BracketReport {
            entry,
            quantity,
            reference_price,
            take_profit: None,
            stop_loss: None,
        };

        // Protective legs only make sense on top of a long entry.
        if intent.side == Side::Buy {
            report.take_profit = Some(
                self.place_leg(OrderRequest {
                    symbol: intent.symbol.clone(),
                    side: Side::Sell,
                    kind: "LIMIT".to_string(),
                    quantity,
                    price: Some(intent.take_profit),
                    stop_price: None,
                    time_in_force: Some("GTC".to_string()),
                })
                .await,
            );
            report.stop_loss = Some(
                self.place_leg(OrderRequest {
                    symbol: intent.symbol.clone(),
                    side: Side::Sell,
                    kind: "STOP_LOSS_LIMIT".to_string(),
                    quantity,
                    // Limit sits slightly under the stop so the order still
                    // fills during a fast drop.
                    price: Some(stop_limit_price(intent.stop_loss)),
                    stop_price: Some(intent.stop_loss),
                    time_in_force: Some("GTC".to_string()),
                })
                .await,
            );
        }

        Ok(report)
    }

    async fn place_leg(&self, request: OrderRequest) -> LegOutcome {
        match self.gateway.submit(&request).await {
            Ok(ack) => LegOutcome::Placed(ack),
            Err(e) => {
                warn!("Protective {} leg failed: {e}", request.kind);
                LegOutcome::Failed(e.to_string())
            }
        }
    }
}

fn stop_limit_price(stop: Decimal) -> Decimal {
    (stop * Decimal::new(997, 3)).round_dp(8)
}
