// src/main.rs
use crate::config::AppConfig;
use crate::connectors::mexc::MexcClient;
use crate::connectors::notify::ConsoleNotifier;
use crate::core::engine::Engine;
use crate::ledger::Ledger;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod alerts;
mod commands;
mod config;
mod connectors;
mod core;
mod error;
mod indicators;
mod ledger;
mod strategies;
mod thresholds;
mod types;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    std::fs::create_dir_all("logs").ok();
    let file_appender = tracing_appender::rolling::daily("logs", "sentry.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    let config = AppConfig::new()?;

    println!("========================================");
    println!("        MARKET SENTRY - v0.1.0");
    println!("========================================");
    println!("Watchlist: {}", config.watchlist.join(", "));
    println!(
        "Mode:      {}",
        if config.paper_mode {
            "📝 PAPER TRADING"
        } else {
            "🚨 LIVE TRADING"
        }
    );
    println!("========================================");

    let client = Arc::new(MexcClient::new(
        config.api_key.clone(),
        config.secret_key.clone(),
        config.paper_mode,
    )?);
    let notifier = Arc::new(ConsoleNotifier);
    let ledger = Ledger::load(config.ledger_file.clone().into()).await;

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    tokio::spawn(read_commands(cmd_tx));

    let mut engine = Engine::new(config, client.clone(), client, notifier, ledger, cmd_rx);
    engine.run().await
}

/// Feeds stdin lines into the engine as parsed commands. A chat transport
/// would hand the same channel its own parsed intents.
async fn read_commands(tx: mpsc::Sender<commands::Command>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(command) => {
                if tx.send(command).await.is_err() {
                    break;
                }
            }
            Err(e) => println!("⚠️ {e}"),
        }
    }
}
