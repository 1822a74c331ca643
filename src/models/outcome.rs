use serde::Serialize;
use thiserror::Error;

use crate::models::{Direction, ExitKind};

/// Every way the core can turn a signal down. Rejections are returned values
/// with diagnostic context, never raised; store failures travel separately as
/// `anyhow::Error` and map to a server-error outcome.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("invalid trade id format: {trade_id}")]
    InvalidTradeId { trade_id: String },

    #[error("invalid position values")]
    InvalidPrices {
        entry: String,
        sl: String,
        tp1: String,
        tp2: String,
    },

    #[error("invalid exit price: {price}")]
    InvalidExitPrice { price: String },

    #[error("outside trading hours ({window})")]
    OutsideTradingHours { window: String },

    #[error("active trade already exists: {existing_id}")]
    ActiveTradeExists {
        existing_id: String,
        direction: Direction,
        symbol: String,
        tf: String,
    },

    #[error("duplicate signal detected within {window_ms}ms")]
    DuplicateSignal { fingerprint: String, window_ms: i64 },

    #[error("exit direction {signal} does not match open {trade} trade")]
    DirectionMismatch { signal: Direction, trade: Direction },

    #[error("no active trade found with id {trade_id}")]
    NoActiveTrade { trade_id: String },

    #[error("opening bias already sent for {date}")]
    BiasAlreadySent { date: String },
}

impl Rejection {
    /// Malformed-input rejections, as opposed to state conflicts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Rejection::InvalidTradeId { .. }
                | Rejection::InvalidPrices { .. }
                | Rejection::InvalidExitPrice { .. }
                | Rejection::OutsideTradingHours { .. }
        )
    }
}

/// A state decision that either went through or was turned down. The engine
/// and schedulers return this; only infrastructure failures escape as errors.
#[derive(Debug, Clone)]
pub enum Verdict<T> {
    Accepted(T),
    Rejected(Rejection),
}

impl<T> Verdict<T> {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Accepted(_) => None,
            Verdict::Rejected(r) => Some(r),
        }
    }
}

/// What an accepted signal did to the system, for the intake response.
#[derive(Debug, Clone)]
pub enum Action {
    TradeOpened,
    TradePartial { exit: ExitKind },
    TradeClosed { exit: ExitKind, points: f64, win: bool },
    BiasQueued { date: String },
    BiasSent,
    SummarySent,
    UnknownRelayed { raw_type: String },
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::TradeOpened => "trade_opened",
            Action::TradePartial { .. } => "trade_partial",
            Action::TradeClosed { .. } => "trade_closed",
            Action::BiasQueued { .. } => "bias_queued",
            Action::BiasSent => "bias_sent",
            Action::SummarySent => "summary_sent",
            Action::UnknownRelayed { .. } => "unknown_relayed",
        }
    }
}
