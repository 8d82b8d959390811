// src/commands.rs
//! Parses user command lines into typed intents once, at the boundary.
//! Everything downstream works on the `Command` variants, never on text.

use crate::error::SentryError;
use crate::types::{OrderKind, Side, TradeIntent};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    HoldAdd {
        symbol: String,
        qty: Decimal,
        price: Option<Decimal>,
    },
    HoldRemove {
        symbol: String,
        qty: Decimal,
    },
    HoldReport,
    Advice {
        symbol: String,
    },
    Signal(TradeIntent),
    Balance,
    Market,
}

/// `sol` -> `SOLUSDT`. Applied exactly once, here.
pub fn normalize_symbol(raw: &str) -> String {
    let mut symbol = raw.to_uppercase();
    if !symbol.ends_with("USDT") {
        symbol.push_str("USDT");
    }
    symbol
}

pub fn parse(input: &str) -> Result<Command, SentryError> {
    let mut tokens = input.split_whitespace();
    let head = tokens
        .next()
        .ok_or_else(|| invalid("empty command"))?
        .trim_start_matches('/')
        .to_lowercase();

    match head.as_str() {
        "hold" => parse_hold(&tokens.collect::<Vec<_>>()),
        "advice" => {
            let symbol = tokens
                .next()
                .ok_or_else(|| invalid("usage: advice <symbol>"))?;
            Ok(Command::Advice {
                symbol: normalize_symbol(symbol),
            })
        }
        "signal" => parse_signal(&tokens.collect::<Vec<_>>()),
        "balance" => Ok(Command::Balance),
        "market" => Ok(Command::Market),
        other => Err(invalid(format!("unknown command '{other}'"))),
    }
}

fn parse_hold(args: &[&str]) -> Result<Command, SentryError> {
    const USAGE: &str = "usage: hold add <symbol> <qty> [@ <price>] | hold rm <symbol> <qty> | hold report";
    match args {
        ["report"] => Ok(Command::HoldReport),
        ["add", symbol, rest @ ..] => {
            let (qty, price) = parse_qty_at_price(rest)?;
            Ok(Command::HoldAdd {
                symbol: normalize_symbol(symbol),
                qty,
                price,
            })
        }
        ["rm", symbol, qty] => Ok(Command::HoldRemove {
            symbol: normalize_symbol(symbol),
            qty: positive_decimal(qty, "quantity")?,
        }),
        _ => Err(invalid(USAGE)),
    }
}

/// `<qty>`, `<qty> @ <price>` or `<qty> @<price>`.
fn parse_qty_at_price(args: &[&str]) -> Result<(Decimal, Option<Decimal>), SentryError> {
    match args {
        [qty] => Ok((positive_decimal(qty, "quantity")?, None)),
        [qty, "@", price] => Ok((
            positive_decimal(qty, "quantity")?,
            Some(non_negative_decimal(price, "price")?),
        )),
        [qty, at_price] if at_price.starts_with('@') => Ok((
            positive_decimal(qty, "quantity")?,
            Some(non_negative_decimal(&at_price[1..], "price")?),
        )),
        _ => Err(invalid("usage: hold add <symbol> <qty> [@ <price>]")),
    }
}

fn parse_signal(args: &[&str]) -> Result<Command, SentryError> {
    const USAGE: &str =
        "usage: signal <BUY|SELL> <symbol> <usdt> @{MKT|LIM=<price>} TP=<price> SL=<price> [reason]";

    let [side, symbol, usdt, entry, tp, sl, reason @ ..] = args else {
        return Err(invalid(USAGE));
    };

    let side = match side.to_uppercase().as_str() {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        _ => return Err(invalid(USAGE)),
    };

    let notional_usdt: f64 = usdt
        .parse()
        .ok()
        .filter(|v: &f64| *v > 0.0)
        .ok_or_else(|| invalid("notional must be a positive number of USDT"))?;

    let (kind, limit_price) = match entry.to_uppercase().as_str() {
        "@MKT" => (OrderKind::Market, None),
        e if e.starts_with("@LIM=") => (
            OrderKind::Limit,
            Some(positive_decimal(&entry["@LIM=".len()..], "limit price")?),
        ),
        _ => return Err(invalid(USAGE)),
    };

    let take_profit = tagged_price(tp, "TP=")?;
    let stop_loss = tagged_price(sl, "SL=")?;

    let reason = if reason.is_empty() {
        None
    } else {
        Some(reason.join(" "))
    };

    Ok(Command::Signal(TradeIntent {
        side,
        symbol: normalize_symbol(symbol),
        notional_usdt,
        kind,
        limit_price,
        take_profit,
        stop_loss,
        reason,
    }))
}

fn tagged_price(token: &str, tag: &str) -> Result<Decimal, SentryError> {
    let upper = token.to_uppercase();
    let value = upper
        .strip_prefix(tag)
        .ok_or_else(|| invalid(format!("expected {tag}<price>, got '{token}'")))?;
    positive_decimal(value, tag.trim_end_matches('='))
}

fn positive_decimal(token: &str, what: &str) -> Result<Decimal, SentryError> {
    token
        .parse::<Decimal>()
        .ok()
        .filter(|v| *v > Decimal::ZERO)
        .ok_or_else(|| invalid(format!("{what} must be a positive number")))
}

fn non_negative_decimal(token: &str, what: &str) -> Result<Decimal, SentryError> {
    token
        .parse::<Decimal>()
        .ok()
        .filter(|v| *v >= Decimal::ZERO)
        .ok_or_else(|| invalid(format!("{what} must be a non-negative number")))
}

fn invalid(msg: impl Into<String>) -> SentryError {
    SentryError::InvalidCommand(msg.into())
}
