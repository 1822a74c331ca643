use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::config::TradingWindow;
use crate::core::hours;
use crate::models::signal::parse_price;
use crate::models::{
    ArchiveRecord, Direction, ExitKind, LiveTrade, PerformanceSummary, Rejection, Signal, Trade,
    Verdict,
};
use crate::store::{keys, CreateOutcome, KvStore};

/// What an accepted exit did to the live trade.
#[derive(Debug, Clone)]
pub enum ExitEffect {
    Partial { trade: Trade },
    Closed { archive: ArchiveRecord },
}

/// Owns the trade lifecycle: NONE -> OPEN -> PARTIAL -> CLOSED(archived),
/// with OPEN -> CLOSED for a straight stop-out. At most one trade is live at
/// a time; that invariant is enforced by the store's atomic create, never by
/// a separate read-then-write.
pub struct TradeEngine {
    store: Arc<dyn KvStore>,
    window: TradingWindow,
}

fn is_live(value: &Value) -> bool {
    value.get("closed").and_then(Value::as_bool) != Some(true)
}

impl TradeEngine {
    pub fn new(store: Arc<dyn KvStore>, window: TradingWindow) -> Self {
        Self { store, window }
    }

    pub async fn open_trade(
        &self,
        signal: &Signal,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<Verdict<Trade>> {
        let prices = (
            parse_price(&signal.entry),
            parse_price(&signal.sl),
            parse_price(&signal.tp1),
            parse_price(&signal.tp2),
        );
        let (Some(entry), Some(sl), Some(tp1), Some(tp2)) = prices else {
            return Ok(Verdict::Rejected(Rejection::InvalidPrices {
                entry: signal.entry.clone(),
                sl: signal.sl.clone(),
                tp1: signal.tp1.clone(),
                tp2: signal.tp2.clone(),
            }));
        };

        // Entries are validated against the signal's own timestamp, not the
        // arrival time; a missing or malformed timestamp never qualifies.
        let in_window = DateTime::parse_from_rfc3339(&signal.time)
            .map(|t| hours::within_window(t.with_timezone(&Utc), &self.window))
            .unwrap_or(false);
        if !in_window {
            return Ok(Verdict::Rejected(Rejection::OutsideTradingHours {
                window: self.window.describe(),
            }));
        }

        let trade = Trade {
            direction,
            symbol: signal.symbol.clone(),
            tf: signal.tf.clone(),
            entry,
            sl,
            tp1,
            tp2,
            start_time: signal.time.clone(),
            last_update: now.timestamp_millis(),
            partial_closed: false,
            partial_close_type: None,
            partial_close_time: None,
        };
        let value = serde_json::to_value(&trade).context("serialize trade")?;

        let outcome = self
            .store
            .create_if_absent_matching(
                keys::TRADE_PREFIX,
                &keys::trade(&signal.trade_id),
                value,
                &is_live,
            )
            .await?;
        match outcome {
            CreateOutcome::Created => Ok(Verdict::Accepted(trade)),
            CreateOutcome::Conflict { key, value } => {
                let existing: Trade =
                    serde_json::from_value(value).context("deserialize conflicting trade")?;
                Ok(Verdict::Rejected(Rejection::ActiveTradeExists {
                    existing_id: keys::trade_id(&key).to_string(),
                    direction: existing.direction,
                    symbol: existing.symbol,
                    tf: existing.tf,
                }))
            }
        }
    }

    pub async fn apply_exit(
        &self,
        signal: &Signal,
        direction: Direction,
        exit: ExitKind,
        now: DateTime<Utc>,
    ) -> Result<Verdict<ExitEffect>> {
        let key = keys::trade(&signal.trade_id);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(Verdict::Rejected(Rejection::NoActiveTrade {
                trade_id: signal.trade_id.clone(),
            }));
        };
        let mut trade: Trade = serde_json::from_value(value).context("deserialize trade")?;

        if trade.direction != direction {
            return Ok(Verdict::Rejected(Rejection::DirectionMismatch {
                signal: direction,
                trade: trade.direction,
            }));
        }

        let now_ms = now.timestamp_millis();
        if exit.is_full_close() {
            let Some(exit_price) = parse_price(&signal.price) else {
                return Ok(Verdict::Rejected(Rejection::InvalidExitPrice {
                    price: signal.price.clone(),
                }));
            };
            let archive = ArchiveRecord {
                trade_id: signal.trade_id.clone(),
                direction: trade.direction,
                symbol: trade.symbol.clone(),
                tf: trade.tf.clone(),
                entry: trade.entry,
                exit_price,
                exit_kind: exit,
                points: trade.points(exit_price),
                win: exit == ExitKind::Tp2 || trade.partial_closed,
                archived_at: now_ms,
            };
            // Archive before deleting the live record: a crash between the
            // two leaves a stale live trade for retention to clear, never a
            // closed trade without its archive.
            let date = hours::date_key(now);
            self.store
                .set(
                    &keys::archive(&date, &signal.trade_id),
                    serde_json::to_value(&archive).context("serialize archive record")?,
                )
                .await?;
            self.store.delete(&key).await?;
            Ok(Verdict::Accepted(ExitEffect::Closed { archive }))
        } else {
            trade.partial_closed = true;
            trade.partial_close_type = Some(exit);
            trade.partial_close_time = Some(now_ms);
            trade.last_update = now_ms;
            self.store
                .set(&key, serde_json::to_value(&trade).context("serialize trade")?)
                .await?;
            Ok(Verdict::Accepted(ExitEffect::Partial { trade }))
        }
    }

    pub async fn live_trades(&self) -> Result<Vec<LiveTrade>> {
        let records = self.store.scan(keys::TRADE_PREFIX).await?;
        let mut trades = Vec::with_capacity(records.len());
        for (key, value) in records {
            let trade: Trade = serde_json::from_value(value).context("deserialize trade")?;
            trades.push(LiveTrade {
                id: keys::trade_id(&key).to_string(),
                direction: trade.direction,
                symbol: trade.symbol,
                tf: trade.tf,
                entry: trade.entry,
                start_time: trade.start_time,
                partial_closed: trade.partial_closed,
            });
        }
        Ok(trades)
    }

    /// Settlement removal: the trade was never resolved by an exit signal,
    /// so it leaves no archive record.
    pub async fn discard(&self, trade_id: &str) -> Result<()> {
        self.store.delete(&keys::trade(trade_id)).await
    }

    pub async fn summarize(&self, dates: &[String], label: &str) -> Result<PerformanceSummary> {
        let mut summary = PerformanceSummary {
            label: label.to_string(),
            dates: dates.to_vec(),
            total: 0,
            wins: 0,
            losses: 0,
            points: 0.0,
        };
        for date in dates {
            for (_, value) in self.store.scan(&keys::archive_date(date)).await? {
                let record: ArchiveRecord =
                    serde_json::from_value(value).context("deserialize archive record")?;
                summary.total += 1;
                if record.win {
                    summary.wins += 1;
                } else {
                    summary.losses += 1;
                }
                summary.points += record.points;
            }
        }
        Ok(summary)
    }
}
