use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::bias::{BiasDecision, BiasScheduler};
use crate::core::dedup::DuplicateSuppressor;
use crate::core::hours;
use crate::models::{
    Action, BiasKind, LiveTrade, Rejection, Signal, SignalKind, SummaryKind, Verdict,
};
use crate::notify::{DispatchResult, Dispatcher, Formatter};
use crate::trading::{ExitEffect, TradeEngine};

/// Outcome of one inbound signal: what the core decided, and how delivery
/// went when a notification was due. State mutation and delivery are
/// decoupled: a failed delivery never rolls the decision back.
#[derive(Debug)]
pub struct SignalReply {
    pub outcome: Verdict<Action>,
    pub delivery: Option<DispatchResult>,
}

impl SignalReply {
    fn rejected(rejection: Rejection) -> Self {
        Self {
            outcome: Verdict::Rejected(rejection),
            delivery: None,
        }
    }

    fn accepted(action: Action, delivery: Option<DispatchResult>) -> Self {
        Self {
            outcome: Verdict::Accepted(action),
            delivery,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub active_trades_count: usize,
    pub active_trades: Vec<LiveTrade>,
    pub timestamp: String,
}

/// Ties the pipeline together: duplicate suppression, then the state
/// decision, then formatting and fan-out.
pub struct Relay {
    engine: Arc<TradeEngine>,
    bias: Arc<BiasScheduler>,
    dedup: Arc<DuplicateSuppressor>,
    dispatcher: Arc<Dispatcher>,
    formatter: Arc<Formatter>,
}

impl Relay {
    pub fn new(
        engine: Arc<TradeEngine>,
        bias: Arc<BiasScheduler>,
        dedup: Arc<DuplicateSuppressor>,
        dispatcher: Arc<Dispatcher>,
        formatter: Arc<Formatter>,
    ) -> Self {
        Self {
            engine,
            bias,
            dedup,
            dispatcher,
            formatter,
        }
    }

    pub async fn handle_signal(&self, signal: &Signal, now: DateTime<Utc>) -> Result<SignalReply> {
        let fingerprint = signal.fingerprint();
        if self
            .dedup
            .check_and_mark(&fingerprint, now.timestamp_millis())
            .await?
        {
            info!("duplicate signal suppressed: {}", fingerprint);
            return Ok(SignalReply::rejected(Rejection::DuplicateSignal {
                fingerprint,
                window_ms: self.dedup.window_ms(),
            }));
        }

        if !signal.trade_id_valid() {
            return Ok(SignalReply::rejected(Rejection::InvalidTradeId {
                trade_id: signal.trade_id.clone(),
            }));
        }

        match &signal.kind {
            SignalKind::Entry(direction) => {
                match self.engine.open_trade(signal, *direction, now).await? {
                    Verdict::Rejected(r) => {
                        info!("entry {} rejected: {}", signal.trade_id, r);
                        Ok(SignalReply::rejected(r))
                    }
                    Verdict::Accepted(_) => {
                        info!("trade {} opened {}", signal.trade_id, direction);
                        let delivery = self
                            .dispatcher
                            .dispatch(&self.formatter.entry(signal, *direction))
                            .await;
                        Ok(SignalReply::accepted(Action::TradeOpened, Some(delivery)))
                    }
                }
            }
            SignalKind::Exit(direction, exit) => {
                match self.engine.apply_exit(signal, *direction, *exit, now).await? {
                    Verdict::Rejected(r) => {
                        info!("exit {} rejected: {}", signal.trade_id, r);
                        Ok(SignalReply::rejected(r))
                    }
                    Verdict::Accepted(ExitEffect::Partial { .. }) => {
                        info!("trade {} partial close ({})", signal.trade_id, exit);
                        let delivery = self
                            .dispatcher
                            .dispatch(&self.formatter.partial(signal, *exit))
                            .await;
                        Ok(SignalReply::accepted(
                            Action::TradePartial { exit: *exit },
                            Some(delivery),
                        ))
                    }
                    Verdict::Accepted(ExitEffect::Closed { archive }) => {
                        info!(
                            "trade {} closed ({}): {:+.2} pts, {}",
                            signal.trade_id,
                            exit,
                            archive.points,
                            if archive.win { "win" } else { "loss" }
                        );
                        let delivery = self
                            .dispatcher
                            .dispatch(&self.formatter.closed(signal, &archive))
                            .await;
                        Ok(SignalReply::accepted(
                            Action::TradeClosed {
                                exit: *exit,
                                points: archive.points,
                                win: archive.win,
                            },
                            Some(delivery),
                        ))
                    }
                }
            }
            SignalKind::Bias(BiasKind::Flip) => {
                let delivery = self
                    .dispatcher
                    .dispatch(&self.formatter.bias(
                        BiasKind::Flip,
                        &signal.profile,
                        &signal.display_time,
                    ))
                    .await;
                Ok(SignalReply::accepted(Action::BiasSent, Some(delivery)))
            }
            SignalKind::Bias(BiasKind::Opening) => {
                match self.bias.handle_opening(signal, now).await? {
                    Verdict::Rejected(r) => {
                        info!("opening bias rejected: {}", r);
                        Ok(SignalReply::rejected(r))
                    }
                    Verdict::Accepted(BiasDecision::Queued { date }) => {
                        info!("opening bias queued for {}", date);
                        Ok(SignalReply::accepted(Action::BiasQueued { date }, None))
                    }
                    Verdict::Accepted(BiasDecision::Notify) => {
                        let delivery = self
                            .dispatcher
                            .dispatch(&self.formatter.bias(
                                BiasKind::Opening,
                                &signal.profile,
                                &signal.display_time,
                            ))
                            .await;
                        Ok(SignalReply::accepted(Action::BiasSent, Some(delivery)))
                    }
                }
            }
            SignalKind::Summary(kind) => {
                let (dates, label) = match kind {
                    SummaryKind::Daily => (vec![hours::date_key(now)], "daily"),
                    SummaryKind::Weekly => (hours::week_date_keys(now), "weekly"),
                };
                let summary = self.engine.summarize(&dates, label).await?;
                let delivery = self
                    .dispatcher
                    .dispatch(&self.formatter.summary(&summary, *kind))
                    .await;
                Ok(SignalReply::accepted(Action::SummarySent, Some(delivery)))
            }
            SignalKind::Unknown(raw_type) => {
                warn!("unknown alert type received: {}", raw_type);
                let delivery = self
                    .dispatcher
                    .dispatch(&self.formatter.unknown(signal))
                    .await;
                Ok(SignalReply::accepted(
                    Action::UnknownRelayed {
                        raw_type: raw_type.clone(),
                    },
                    Some(delivery),
                ))
            }
        }
    }

    /// Read-only view over the live-trade scan, for the health endpoint.
    pub async fn health(&self, now: DateTime<Utc>) -> Result<HealthStatus> {
        let active_trades = self.engine.live_trades().await?;
        Ok(HealthStatus {
            active_trades_count: active_trades.len(),
            active_trades,
            timestamp: now.to_rfc3339(),
        })
    }
}
