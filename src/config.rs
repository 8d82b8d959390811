// src/config.rs

use crate::commands::normalize_symbol;
use crate::strategies::momentum::SignalTuning;
use crate::thresholds::ThresholdPolicy;
use config::{Config, ConfigError, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    pub interval_secs: u64,
    pub kline_interval: String,
    pub kline_limit: usize,
    pub signal_cooldown_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub secret_key: String,
    pub paper_mode: bool,
    pub watchlist: Vec<String>,
    pub max_order_usdt: f64,
    pub lot_step: Decimal,
    pub ledger_file: String,
    pub scan: ScanConfig,
    pub thresholds: ThresholdPolicy,
    pub signal: SignalTuning,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings"))
            .add_source(config::Environment::with_prefix("SENTRY"));

        let config = builder.build()?;
        let mut app: AppConfig = config.try_deserialize()?;
        app.watchlist = normalize_watchlist(&app.watchlist);
        Ok(app)
    }
}

/// Uppercase, `USDT`-suffix, and de-duplicate while keeping first-seen order.
fn normalize_watchlist(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .map(|s| normalize_symbol(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
