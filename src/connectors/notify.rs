// src/connectors/notify.rs
use crate::connectors::traits::Notifier;
use async_trait::async_trait;
use tracing::info;

/// Prints alerts to stdout and mirrors them into the log. Stands in for a
/// chat transport, which lives outside this crate.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, text: &str) -> anyhow::Result<()> {
        println!("{text}");
        info!(target: "alerts", "{}", text.replace('\n', " | "));
        Ok(())
    }
}
