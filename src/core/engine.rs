// src/core/engine.rs
use crate::alerts::AlertGate;
use crate::commands::Command;
use crate::config::AppConfig;
use crate::connectors::traits::{MarketData, Notifier, OrderGateway};
use crate::core::planner::{BracketReport, LegOutcome, OrderPlanner};
use crate::error::SentryError;
use crate::ledger::Ledger;
use crate::strategies::momentum::{Assessment, MomentumClassifier};
use crate::thresholds::{ThresholdPolicy, ThresholdState};
use crate::types::{Kline, Side, SignalAction};
use futures::future::join_all;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Owns every piece of mutable state (ledger, alert memory) and serializes
/// scan ticks with user commands in one `select!` loop, so mutation is
/// single-writer by construction. Ticks never overlap; one due while the
/// previous still runs is skipped.
pub struct Engine {
    config: AppConfig,
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    notifier: Arc<dyn Notifier>,
    planner: OrderPlanner,
    classifier: MomentumClassifier,
    alerts: AlertGate,
    ledger: Ledger,
    cmd_rx: mpsc::Receiver<Command>,
}

impl Engine {
    pub fn new(
        config: AppConfig,
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        notifier: Arc<dyn Notifier>,
        ledger: Ledger,
        cmd_rx: mpsc::Receiver<Command>,
    ) -> Self {
        let planner = OrderPlanner::new(
            Arc::clone(&market),
            Arc::clone(&gateway),
            config.max_order_usdt,
            config.lot_step,
        );
        let classifier = MomentumClassifier::new(config.signal.clone());
        let alerts = AlertGate::new(Duration::from_secs(config.scan.signal_cooldown_secs));
        Self {
            config,
            market,
            gateway,
            notifier,
            planner,
            classifier,
            alerts,
            ledger,
            cmd_rx,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut ticker = interval(Duration::from_secs(self.config.scan.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Engine loop running. Watchlist: {:?}, scan every {}s",
            self.config.watchlist, self.config.scan.interval_secs
        );

        loop {
            tokio::select! {
                // Shutdown first: a tick due while stopping must not fire.
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested, stopping engine");
                    break;
                }
                _ = ticker.tick() => self.scan_cycle().await,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        info!("Command channel closed, stopping engine");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// One pass over the watchlist. Fetches are read-only and run
    /// concurrently; results are then folded into alert state sequentially.
    /// A failed symbol is logged and skipped, never aborts the cycle.
    async fn scan_cycle(&mut self) {
        debug!("Scan cycle: {} symbol(s)", self.config.watchlist.len());

        let kline_interval = self.config.scan.kline_interval.clone();
        let kline_limit = self.config.scan.kline_limit;
        let fetches = join_all(self.config.watchlist.iter().cloned().map(|symbol| {
            let market = Arc::clone(&self.market);
            let kline_interval = kline_interval.clone();
            async move {
                let result = market.klines(&symbol, &kline_interval, kline_limit).await;
                (symbol, result)
            }
        }))
        .await;

        for (symbol, result) in fetches {
            match result {
                Ok(klines) => {
                    if let Err(e) = self.process_symbol(&symbol, &klines).await {
                        warn!("{symbol}: {e}");
                    }
                }
                Err(e) => warn!("{symbol}: no data this cycle: {e}"),
            }
        }
    }

    async fn process_symbol(
        &mut self,
        symbol: &str,
        klines: &[Kline],
    ) -> Result<(), SentryError> {
        let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
        let last_close = closes
            .last()
            .copied()
            .ok_or_else(|| SentryError::data_unavailable(symbol, "empty kline window"))?;

        match self.classifier.assess(&closes) {
            Ok(assessment) if assessment.action != SignalAction::Hold => {
                if self
                    .alerts
                    .permit_signal(symbol, assessment.action, Instant::now())
                {
                    let text = format_signal_alert(
                        symbol,
                        last_close,
                        &assessment,
                        &self.config.thresholds,
                    );
                    self.send(text).await;
                }
            }
            Ok(_) => {}
            Err(e) => debug!("{symbol}: classification suppressed: {e}"),
        }

        // Threshold watch over an open position, valued at the last close.
        if let Some(position) = self.ledger.get(symbol).cloned() {
            if position.quantity > Decimal::ZERO && position.average_cost > Decimal::ZERO {
                let price = Decimal::from_f64(last_close)
                    .ok_or_else(|| SentryError::data_unavailable(symbol, "bad close price"))?;
                let pnl = position.pnl_pct(price);
                let state = self.config.thresholds.classify(pnl);
                if self.alerts.permit_threshold(symbol, state) {
                    let text = format_threshold_alert(
                        symbol,
                        price,
                        pnl,
                        state,
                        position.quantity,
                        &self.config.thresholds,
                    );
                    self.send(text).await;
                }
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        if let Err(e) = self.dispatch(command).await {
            self.send(format!("⚠️ {e}")).await;
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), SentryError> {
        match command {
            Command::HoldAdd { symbol, qty, price } => {
                let price = match price {
                    Some(p) => p,
                    None => self.market.price(&symbol).await?,
                };
                let snapshot = self.ledger.add(&symbol, qty, price);
                self.persist_ledger().await;
                self.send(format!(
                    "📒 {symbol}: qty {}, avg {}",
                    snapshot.quantity,
                    snapshot.average_cost.round_dp(6)
                ))
                .await;
            }
            Command::HoldRemove { symbol, qty } => {
                let outcome = self.ledger.reduce(&symbol, qty)?;
                self.persist_ledger().await;
                let text = match outcome.remaining {
                    Some(position) => format!(
                        "📒 {symbol}: removed {}, qty {} left at avg {}",
                        outcome.removed,
                        position.quantity,
                        position.average_cost.round_dp(6)
                    ),
                    None => format!("📒 {symbol}: removed {}, position closed", outcome.removed),
                };
                self.send(text).await;
            }
            Command::HoldReport => {
                let text = self.build_hold_report().await;
                self.send(text).await;
            }
            Command::Advice { symbol } => {
                let klines = self
                    .market
                    .klines(
                        &symbol,
                        &self.config.scan.kline_interval,
                        self.config.scan.kline_limit,
                    )
                    .await?;
                let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
                let assessment = self.classifier.assess(&closes)?;
                self.send(format!(
                    "🔍 {symbol}: {} — {} (SMA{} {:.4} / SMA{} {:.4}, RSI {:.1})",
                    assessment.action,
                    assessment.rationale,
                    self.config.signal.fast_sma_period,
                    assessment.sma_fast,
                    self.config.signal.slow_sma_period,
                    assessment.sma_slow,
                    assessment.rsi
                ))
                .await;
            }
            Command::Signal(intent) => {
                let report = self.planner.execute(&intent).await?;
                let text = format_bracket_report(&intent.symbol, intent.side, &intent.reason, &report);
                self.send(text).await;
            }
            Command::Balance => {
                let balances = self.gateway.balances().await?;
                let text = if balances.is_empty() {
                    "💼 No balances".to_string()
                } else {
                    let lines: Vec<String> = balances
                        .iter()
                        .take(12)
                        .map(|b| format!("{}: {}", b.asset, b.free.round_dp(4)))
                        .collect();
                    format!("💼 Balance:\n{}", lines.join("\n"))
                };
                self.send(text).await;
            }
            Command::Market => {
                let mut lines = Vec::new();
                for symbol in &self.config.watchlist {
                    match self.market.price(symbol).await {
                        Ok(price) => lines.push(format!("{symbol}: {price}")),
                        Err(_) => lines.push(format!("{symbol}: unavailable")),
                    }
                }
                self.send(format!("📊 Market:\n{}", lines.join("\n"))).await;
            }
        }
        Ok(())
    }

    /// Every held symbol is listed even when its price lookup fails.
    async fn build_hold_report(&self) -> String {
        if self.ledger.is_empty() {
            return "📒 Ledger is empty".to_string();
        }
        let mut lines = Vec::new();
        for (symbol, position) in self.ledger.iter() {
            match self.market.price(symbol).await {
                Ok(price) => lines.push(format!(
                    "{symbol}: qty {} avg {} now {} ({:+.2}%)",
                    position.quantity,
                    position.average_cost.round_dp(6),
                    price,
                    position.pnl_pct(price)
                )),
                Err(_) => lines.push(format!(
                    "{symbol}: qty {} avg {} price unavailable",
                    position.quantity,
                    position.average_cost.round_dp(6)
                )),
            }
        }
        format!("📒 Holdings:\n{}", lines.join("\n"))
    }

    async fn persist_ledger(&self) {
        if let Err(e) = self.ledger.persist().await {
            error!("Failed to persist ledger: {e}");
            self.send(format!("⚠️ Ledger not saved: {e}")).await;
        }
    }

    async fn send(&self, text: String) {
        if let Err(e) = self.notifier.notify(&text).await {
            error!("Notification failed: {e}");
        }
    }
}

fn format_signal_alert(
    symbol: &str,
    price: f64,
    assessment: &Assessment,
    thresholds: &ThresholdPolicy,
) -> String {
    match assessment.action {
        SignalAction::Buy => format!(
            "📣 BUY {symbol} @ {price:.4}\nTargets: TP1 {:.4}, TP2 {:.4}, SL {:.4}\n💬 {}",
            price * (1.0 + thresholds.tp1_pct / 100.0),
            price * (1.0 + thresholds.tp2_pct / 100.0),
            price * (1.0 - thresholds.sl_pct / 100.0),
            assessment.rationale
        ),
        _ => format!(
            "📣 EXIT {symbol} @ {price:.4}\n💬 {}",
            assessment.rationale
        ),
    }
}

fn format_threshold_alert(
    symbol: &str,
    price: Decimal,
    pnl_pct: f64,
    state: ThresholdState,
    quantity: Decimal,
    thresholds: &ThresholdPolicy,
) -> String {
    let fraction = thresholds.suggested_reduction(state).unwrap_or(0.0);
    let sell_qty = (quantity * Decimal::from_f64(fraction).unwrap_or_default()).round_dp(6);
    format!(
        "🎯 {state} {symbol} @ {price} ({pnl_pct:+.2}% vs avg)\nSuggested: sell {:.0}% ({sell_qty})",
        fraction * 100.0
    )
}

fn format_bracket_report(
    symbol: &str,
    side: Side,
    reason: &Option<String>,
    report: &BracketReport,
) -> String {
    let mode = if report.entry.simulated { " (PAPER)" } else { "" };
    let mut text = format!(
        "✅ {} {symbol}{mode}: {} @ ref {} — order {} [{}]",
        side.as_str(),
        report.quantity,
        report.reference_price,
        report.entry.id,
        report.entry.status
    );
    if let Some(leg) = &report.take_profit {
        text.push_str(&match leg {
            LegOutcome::Placed(ack) => format!("\n🎯 TP order {} [{}]", ack.id, ack.status),
            LegOutcome::Failed(e) => format!("\n🎯 TP failed: {e}"),
        });
    }
    if let Some(leg) = &report.stop_loss {
        text.push_str(&match leg {
            LegOutcome::Placed(ack) => format!("\n🛡️ SL order {} [{}]", ack.id, ack.status),
            LegOutcome::Failed(e) => format!("\n🛡️ SL failed: {e}"),
        });
    }
    if let Some(partial) = report.partial_failure() {
        text.push_str(&format!("\n⚠️ {partial}"));
    }
    let rationale = reason.clone().unwrap_or_else(|| default_reason(side));
    text.push_str(&format!("\n💬 {rationale}"));
    text
}

fn default_reason(side: Side) -> String {
    match side {
        Side::Buy => "trend and momentum aligned".to_string(),
        Side::Sell => "taking profit, momentum fading".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::strategies::momentum::SignalTuning;
    use crate::types::{AssetBalance, OrderAck, OrderRequest};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    struct ScriptedMarket {
        klines: HashMap<String, Vec<Kline>>,
        prices: HashMap<String, Decimal>,
    }

    impl ScriptedMarket {
        fn new() -> Self {
            Self {
                klines: HashMap::new(),
                prices: HashMap::new(),
            }
        }

        fn with_closes(mut self, symbol: &str, closes: &[f64]) -> Self {
            let klines = closes
                .iter()
                .enumerate()
                .map(|(i, &close)| Kline {
                    open_time: i as i64 * 3_600_000,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                })
                .collect();
            self.klines.insert(symbol.to_string(), klines);
            self
        }

        fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
            self.prices.insert(symbol.to_string(), price);
            self
        }
    }

    #[async_trait]
    impl MarketData for ScriptedMarket {
        async fn klines(
            &self,
            symbol: &str,
            _interval: &str,
            _limit: usize,
        ) -> Result<Vec<Kline>, SentryError> {
            self.klines
                .get(symbol)
                .cloned()
                .ok_or_else(|| SentryError::data_unavailable(symbol, "scripted outage"))
        }

        async fn price(&self, symbol: &str) -> Result<Decimal, SentryError> {
            self.prices
                .get(symbol)
                .copied()
                .ok_or_else(|| SentryError::data_unavailable(symbol, "scripted outage"))
        }
    }

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> anyhow::Result<()> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct AckGateway;

    #[async_trait]
    impl OrderGateway for AckGateway {
        async fn submit(&self, order: &OrderRequest) -> Result<OrderAck, SentryError> {
            Ok(OrderAck {
                id: "ack-1".to_string(),
                symbol: order.symbol.clone(),
                status: "PAPER".to_string(),
                simulated: true,
            })
        }

        async fn balances(&self) -> Result<Vec<AssetBalance>, SentryError> {
            Ok(vec![AssetBalance {
                asset: "USDT".to_string(),
                free: dec("120.5"),
            }])
        }
    }

    fn test_config(watchlist: Vec<&str>) -> AppConfig {
        AppConfig {
            api_key: String::new(),
            secret_key: String::new(),
            paper_mode: true,
            watchlist: watchlist.into_iter().map(String::from).collect(),
            max_order_usdt: 300.0,
            lot_step: dec("0.000001"),
            ledger_file: "unused.json".to_string(),
            scan: ScanConfig {
                interval_secs: 300,
                kline_interval: "60m".to_string(),
                kline_limit: 96,
                signal_cooldown_secs: 7200,
            },
            thresholds: ThresholdPolicy {
                tp1_pct: 3.0,
                tp2_pct: 6.0,
                sl_pct: 2.0,
            },
            signal: SignalTuning::default(),
        }
    }

    fn engine(
        config: AppConfig,
        market: ScriptedMarket,
        notifier: Arc<RecordingNotifier>,
    ) -> Engine {
        let (_tx, rx) = mpsc::channel(8);
        Engine::new(
            config,
            Arc::new(market),
            Arc::new(AckGateway),
            notifier,
            Ledger::in_memory(),
            rx,
        )
    }

    fn rising_closes(n: usize) -> Vec<f64> {
        // Upward drift with enough pullback to keep RSI in the buy band.
        let mut closes = Vec::new();
        let mut price = 50.0;
        for i in 0..n {
            price += if i % 2 == 1 { 0.5 } else { -0.27 };
            closes.push(price);
        }
        closes
    }

    fn recorder() -> Arc<RecordingNotifier> {
        Arc::new(RecordingNotifier {
            messages: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn scan_emits_buy_once_per_state() {
        let notifier = recorder();
        let market = ScriptedMarket::new().with_closes("SOLUSDT", &rising_closes(60));
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());

        engine.scan_cycle().await;
        engine.scan_cycle().await;

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1, "dedup failed: {messages:?}");
        assert!(messages[0].contains("BUY SOLUSDT"), "{}", messages[0]);
        assert!(messages[0].contains("Targets"), "{}", messages[0]);
    }

    #[tokio::test]
    async fn held_position_triggers_tp2_over_tp1() {
        let notifier = recorder();
        // Flat tape: classifier holds, only the threshold watch can fire.
        let market = ScriptedMarket::new().with_closes("SOLUSDT", &vec![58.3; 60]);
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());
        engine.ledger.add("SOLUSDT", dec("2"), dec("55"));

        engine.scan_cycle().await;

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].contains("TP2"), "{}", messages[0]);
        assert!(messages[0].contains("80%"), "{}", messages[0]);
    }

    #[tokio::test]
    async fn one_symbol_outage_does_not_block_the_rest() {
        let notifier = recorder();
        // DOGE has no scripted data and fails; SOL must still alert.
        let market = ScriptedMarket::new().with_closes("SOLUSDT", &rising_closes(60));
        let mut engine = engine(
            test_config(vec!["DOGEUSDT", "SOLUSDT"]),
            market,
            notifier.clone(),
        );

        engine.scan_cycle().await;

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].contains("SOLUSDT"));
    }

    #[tokio::test]
    async fn buy_then_take_profit_sequence() {
        let notifier = recorder();
        let closes = rising_closes(60);
        let last = *closes.last().unwrap();
        let market = ScriptedMarket::new().with_closes("SOLUSDT", &closes);
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());

        engine.scan_cycle().await;
        // Enter at ~7% under the current price, then rescan.
        let avg = Decimal::from_f64(last / 1.07).unwrap();
        engine.ledger.add("SOLUSDT", dec("2"), avg);
        engine.scan_cycle().await;

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 2, "{messages:?}");
        assert!(messages[0].contains("BUY"));
        assert!(messages[1].contains("TP2"));
    }

    #[tokio::test]
    async fn short_history_stays_silent() {
        let notifier = recorder();
        let market = ScriptedMarket::new().with_closes("SOLUSDT", &rising_closes(30));
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());

        engine.scan_cycle().await;

        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hold_commands_mutate_and_report() {
        let notifier = recorder();
        let market = ScriptedMarket::new().with_price("SOLUSDT", dec("60"));
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());

        engine
            .handle_command(Command::HoldAdd {
                symbol: "SOLUSDT".to_string(),
                qty: dec("10"),
                price: Some(dec("100")),
            })
            .await;
        engine
            .handle_command(Command::HoldAdd {
                symbol: "SOLUSDT".to_string(),
                qty: dec("10"),
                price: Some(dec("200")),
            })
            .await;
        engine.handle_command(Command::HoldReport).await;

        let messages = notifier.messages.lock().unwrap().clone();
        assert!(messages[1].contains("qty 20"), "{}", messages[1]);
        assert!(messages[1].contains("avg 150"), "{}", messages[1]);
        assert!(messages[2].contains("now 60"), "{}", messages[2]);
    }

    #[tokio::test]
    async fn hold_report_lists_symbols_with_failed_lookups() {
        let notifier = recorder();
        // No scripted price at all: the lookup fails, the line stays.
        let market = ScriptedMarket::new();
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());
        engine.ledger.add("SOLUSDT", dec("2"), dec("55"));

        engine.handle_command(Command::HoldReport).await;

        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains("SOLUSDT"), "{}", messages[0]);
        assert!(messages[0].contains("unavailable"), "{}", messages[0]);
    }

    #[tokio::test]
    async fn reduce_without_position_is_a_user_message() {
        let notifier = recorder();
        let market = ScriptedMarket::new();
        let mut engine = engine(test_config(vec![]), market, notifier.clone());

        engine
            .handle_command(Command::HoldRemove {
                symbol: "ETHUSDT".to_string(),
                qty: dec("1"),
            })
            .await;

        let messages = notifier.messages.lock().unwrap();
        assert!(
            messages[0].contains("no open position"),
            "{}",
            messages[0]
        );
    }

    #[tokio::test]
    async fn over_cap_signal_is_rejected_with_a_message() {
        let notifier = recorder();
        let market = ScriptedMarket::new().with_price("SOLUSDT", dec("200"));
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());

        engine
            .handle_command(Command::Signal(crate::types::TradeIntent {
                side: Side::Buy,
                symbol: "SOLUSDT".to_string(),
                notional_usdt: 50_000.0,
                kind: crate::types::OrderKind::Market,
                limit_price: None,
                take_profit: dec("212"),
                stop_loss: dec("188"),
                reason: None,
            }))
            .await;

        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains("order rejected"), "{}", messages[0]);
    }

    #[tokio::test]
    async fn approved_signal_reports_the_bracket() {
        let notifier = recorder();
        let market = ScriptedMarket::new().with_price("SOLUSDT", dec("200"));
        let mut engine = engine(test_config(vec!["SOLUSDT"]), market, notifier.clone());

        engine
            .handle_command(Command::Signal(crate::types::TradeIntent {
                side: Side::Buy,
                symbol: "SOLUSDT".to_string(),
                notional_usdt: 25.0,
                kind: crate::types::OrderKind::Market,
                limit_price: None,
                take_profit: dec("212"),
                stop_loss: dec("188"),
                reason: Some("Breakout on 4h".to_string()),
            }))
            .await;

        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains("BUY SOLUSDT (PAPER)"), "{}", messages[0]);
        assert!(messages[0].contains("TP order"), "{}", messages[0]);
        assert!(messages[0].contains("SL order"), "{}", messages[0]);
        assert!(messages[0].contains("Breakout on 4h"), "{}", messages[0]);
    }

    #[tokio::test]
    async fn balance_command_formats_assets() {
        let notifier = recorder();
        let market = ScriptedMarket::new();
        let mut engine = engine(test_config(vec![]), market, notifier.clone());

        engine.handle_command(Command::Balance).await;

        let messages = notifier.messages.lock().unwrap();
        assert!(messages[0].contains("USDT: 120.5"), "{}", messages[0]);
    }
}
