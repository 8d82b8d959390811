// src/connectors/traits.rs
use crate::error::SentryError;
use crate::types::{AssetBalance, Kline, OrderAck, OrderRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Price/candle source. Implementations must distinguish a transient
/// failure (`DataUnavailable`) from an unknown symbol (`UnknownSymbol`).
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most-recent-last OHLC window for `symbol`.
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, SentryError>;

    async fn price(&self, symbol: &str) -> Result<Decimal, SentryError>;
}

/// Order placement and account queries. A paper implementation answers with
/// synthetic acknowledgments of the same shape.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck, SentryError>;

    async fn balances(&self) -> Result<Vec<AssetBalance>, SentryError>;
}

/// Outbound user notifications. The chat transport behind this is not part
/// of the core.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> anyhow::Result<()>;
}
