// src/connectors/mexc.rs
use crate::connectors::messages::{parse_kline_row, WireAccount, WireOrder, WireTicker};
use crate::connectors::traits::{MarketData, OrderGateway};
use crate::error::SentryError;
use crate::types::{AssetBalance, Kline, OrderAck, OrderRequest};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const RECV_WINDOW: &str = "50000";

/// MEXC spot REST client. In paper mode every order submission is answered
/// locally with a synthetic acknowledgment; market-data and account calls
/// still hit the exchange.
pub struct MexcClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: String,
    paper: bool,
}

impl MexcClient {
    pub fn new(api_key: String, secret_key: String, paper: bool) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            api_key,
            secret_key,
            http_client,
            base_rest_url: "https://api.mexc.com".to_string(),
            paper,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base: String) -> Self {
        self.base_rest_url = base;
        self
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> anyhow::Result<String> {
        let mut params = params;
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("recvWindow", RECV_WINDOW.to_string()));
        params.push(("timestamp", timestamp));

        let query_string = serde_urlencoded::to_string(&params)?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .context("Invalid secret key length")?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, SentryError> {
        let full_query = self
            .sign_and_build_query(params)
            .map_err(|e| SentryError::OrderRejected(e.to_string()))?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        let response = self
            .http_client
            .request(method, &url)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| SentryError::OrderRejected(format!("transport: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SentryError::OrderRejected(format!("{status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SentryError::OrderRejected(format!("malformed answer: {e}")))
    }

    /// Public (unsigned) GET with the transient/unknown-symbol split.
    async fn public_get(&self, symbol: &str, path_and_query: &str) -> Result<String, SentryError> {
        let url = format!("{}{}", self.base_rest_url, path_and_query);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| SentryError::data_unavailable(symbol, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SentryError::data_unavailable(symbol, e))?;

        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::BAD_REQUEST && is_unknown_symbol(&body) {
            return Err(SentryError::UnknownSymbol(symbol.to_string()));
        }
        Err(SentryError::data_unavailable(
            symbol,
            format!("{status}: {body}"),
        ))
    }

    fn paper_ack(&self, order: &OrderRequest) -> OrderAck {
        let payload = serde_json::to_string(order).unwrap_or_default();
        info!("📝 Paper order: {payload}");
        OrderAck {
            id: format!("paper-{}", Uuid::new_v4()),
            symbol: order.symbol.clone(),
            status: "PAPER".to_string(),
            simulated: true,
        }
    }
}

fn is_unknown_symbol(body: &str) -> bool {
    body.contains("-1121") || body.to_lowercase().contains("invalid symbol")
}

#[async_trait]
impl MarketData for MexcClient {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, SentryError> {
        let body = self
            .public_get(
                symbol,
                &format!("/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}"),
            )
            .await?;

        let rows: Vec<serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| SentryError::data_unavailable(symbol, format!("malformed klines: {e}")))?;

        rows.iter()
            .map(|row| {
                parse_kline_row(row).ok_or_else(|| {
                    SentryError::data_unavailable(symbol, "malformed kline row")
                })
            })
            .collect()
    }

    async fn price(&self, symbol: &str) -> Result<Decimal, SentryError> {
        let body = self
            .public_get(symbol, &format!("/api/v3/ticker/price?symbol={symbol}"))
            .await?;

        let ticker: WireTicker = serde_json::from_str(&body)
            .map_err(|e| SentryError::data_unavailable(symbol, format!("malformed ticker: {e}")))?;

        Decimal::from_str(&ticker.price)
            .map_err(|e| SentryError::data_unavailable(symbol, format!("bad price: {e}")))
    }
}

#[async_trait]
impl OrderGateway for MexcClient {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck, SentryError> {
        if self.paper {
            return Ok(self.paper_ack(order));
        }

        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.kind.clone()),
            ("quantity", order.quantity.to_string()),
        ];
        if let Some(price) = order.price {
            params.push(("price", price.to_string()));
        }
        if let Some(stop) = order.stop_price {
            params.push(("stopPrice", stop.to_string()));
        }
        if let Some(tif) = &order.time_in_force {
            params.push(("timeInForce", tif.clone()));
        }

        info!(
            "🚀 Sending order: {} {} {} @ {:?}",
            order.side.as_str(),
            order.quantity,
            order.symbol,
            order.price
        );

        let resp: WireOrder = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;

        Ok(OrderAck {
            id: resp.order_id.to_string(),
            symbol: resp.symbol,
            status: resp.status.unwrap_or_else(|| "NEW".to_string()),
            simulated: false,
        })
    }

    async fn balances(&self) -> Result<Vec<AssetBalance>, SentryError> {
        let account: WireAccount = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await
            .map_err(|e| SentryError::data_unavailable("account", e))?;

        let mut balances: Vec<AssetBalance> = account
            .balances
            .iter()
            .filter_map(|b| {
                let free = Decimal::from_str(&b.free).ok()?;
                (free > Decimal::ZERO).then(|| AssetBalance {
                    asset: b.asset.clone(),
                    free,
                })
            })
            .collect();
        balances.sort_by(|a, b| b.free.cmp(&a.free));
        Ok(balances)
    }
}
