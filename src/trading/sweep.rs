use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::bias::BiasScheduler;
use crate::core::hours;
use crate::models::{ArchiveRecord, PendingBias, SummaryKind, Trade};
use crate::notify::{Dispatcher, Formatter};
use crate::store::{keys, KvStore};
use crate::trading::engine::TradeEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    Retention,
    Settlement,
    BiasRelease,
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepKind::Retention => write!(f, "retention"),
            SweepKind::Settlement => write!(f, "settlement"),
            SweepKind::BiasRelease => write!(f, "bias_release"),
        }
    }
}

/// Age limits for the retention sweep, all in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RetentionAges {
    pub trade_ms: i64,
    pub archive_ms: i64,
    pub marker_ms: i64,
    pub pending_bias_ms: i64,
}

#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub trades_removed: usize,
    pub archives_removed: usize,
    pub markers_removed: usize,
    pub pending_bias_removed: usize,
    pub force_closed: usize,
    pub summaries_sent: usize,
    pub bias_released: bool,
}

/// Time-triggered jobs. Each run is handed its instant by the host and
/// re-evaluates state from scratch, so an interrupted run needs no recovery
/// beyond letting the next one happen.
pub struct Sweeps {
    store: Arc<dyn KvStore>,
    engine: Arc<TradeEngine>,
    bias: Arc<BiasScheduler>,
    dispatcher: Arc<Dispatcher>,
    formatter: Arc<Formatter>,
    ages: RetentionAges,
}

impl Sweeps {
    pub fn new(
        store: Arc<dyn KvStore>,
        engine: Arc<TradeEngine>,
        bias: Arc<BiasScheduler>,
        dispatcher: Arc<Dispatcher>,
        formatter: Arc<Formatter>,
        ages: RetentionAges,
    ) -> Self {
        Self {
            store,
            engine,
            bias,
            dispatcher,
            formatter,
            ages,
        }
    }

    pub async fn run(&self, kind: SweepKind, now: DateTime<Utc>) -> Result<SweepReport> {
        info!("running {} sweep", kind);
        match kind {
            SweepKind::Retention => self.retention(now).await,
            SweepKind::Settlement => self.settlement(now).await,
            SweepKind::BiasRelease => self.bias_release(now).await,
        }
    }

    /// Pure age-based deletion. Records inside their retention period are
    /// never touched, no matter how often the sweep runs.
    async fn retention(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let now_ms = now.timestamp_millis();
        let mut report = SweepReport::default();

        for (key, value) in self.store.scan(keys::TRADE_PREFIX).await? {
            let Ok(trade) = serde_json::from_value::<Trade>(value) else {
                debug!("skipping unreadable record at {}", key);
                continue;
            };
            if now_ms - trade.last_update > self.ages.trade_ms {
                self.store.delete(&key).await?;
                report.trades_removed += 1;
            }
        }

        for (key, value) in self.store.scan(keys::ARCHIVE_PREFIX).await? {
            let Ok(record) = serde_json::from_value::<ArchiveRecord>(value) else {
                debug!("skipping unreadable record at {}", key);
                continue;
            };
            if now_ms - record.archived_at > self.ages.archive_ms {
                self.store.delete(&key).await?;
                report.archives_removed += 1;
            }
        }

        for (key, value) in self.store.scan(keys::SIGNAL_PREFIX).await? {
            let Some(seen) = value.as_i64() else {
                debug!("skipping unreadable record at {}", key);
                continue;
            };
            if now_ms - seen > self.ages.marker_ms {
                self.store.delete(&key).await?;
                report.markers_removed += 1;
            }
        }

        for (key, value) in self.store.scan(keys::PENDING_BIAS_PREFIX).await? {
            let Ok(pending) = serde_json::from_value::<PendingBias>(value) else {
                debug!("skipping unreadable record at {}", key);
                continue;
            };
            if now_ms - pending.received_at > self.ages.pending_bias_ms {
                self.store.delete(&key).await?;
                report.pending_bias_removed += 1;
            }
        }

        info!(
            "retention sweep removed {} trades, {} archives, {} markers, {} pending biases",
            report.trades_removed,
            report.archives_removed,
            report.markers_removed,
            report.pending_bias_removed
        );
        Ok(report)
    }

    /// Session close: force out whatever is still live (unresolved trades
    /// leave no archive record), then publish the day's summary, plus the
    /// Monday-Friday rollup on the week-ending day.
    async fn settlement(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let live = self.engine.live_trades().await?;
        if !live.is_empty() {
            let lines: Vec<String> = live
                .iter()
                .map(|t| self.formatter.force_close_line(t))
                .collect();
            let delivery = self.dispatcher.dispatch_batched(&lines).await;
            if !delivery.success {
                warn!("force-close notification incomplete; trades close regardless");
            }
            for trade in &live {
                self.engine.discard(&trade.id).await?;
                report.force_closed += 1;
            }
        }

        let today = hours::date_key(now);
        let daily = self.engine.summarize(&[today], "daily").await?;
        self.dispatcher
            .dispatch(&self.formatter.summary(&daily, SummaryKind::Daily))
            .await;
        report.summaries_sent += 1;

        if hours::is_week_end_day(now) {
            let weekly = self
                .engine
                .summarize(&hours::week_date_keys(now), "weekly")
                .await?;
            self.dispatcher
                .dispatch(&self.formatter.summary(&weekly, SummaryKind::Weekly))
                .await;
            report.summaries_sent += 1;
        }

        info!(
            "settlement sweep force-closed {} trades, sent {} summaries",
            report.force_closed, report.summaries_sent
        );
        Ok(report)
    }

    async fn bias_release(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if let Some(pending) = self.bias.release_due(now).await? {
            self.dispatcher
                .dispatch(&self.formatter.bias_release(&pending))
                .await;
            report.bias_released = true;
            info!("released queued opening bias");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingWindow;
    use crate::models::{Direction, ExitKind, Signal};
    use crate::notify::{BatchPolicy, RetryPolicy};
    use crate::store::MemoryStore;
    use crate::test_helpers::{
        entry_raw, exit_raw, in_window_time, now_at_eastern, RecordingChannel,
    };
    use chrono::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: Arc<TradeEngine>,
        sweeps: Sweeps,
        channel: Arc<RecordingChannel>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(TradeEngine::new(
            store.clone(),
            TradingWindow {
                start: (9, 34),
                end: (11, 0),
            },
        ));
        let bias = Arc::new(BiasScheduler::new(store.clone(), (8, 30)));
        let channel = RecordingChannel::new("primary");
        let dispatcher = Arc::new(Dispatcher::new(
            vec![channel.clone()],
            RetryPolicy::new(3, 1),
            BatchPolicy::new(10, 1),
        ));
        let formatter = Arc::new(Formatter::new("NQ|NAS100", "", ""));
        let sweeps = Sweeps::new(
            store.clone(),
            engine.clone(),
            bias,
            dispatcher,
            formatter,
            RetentionAges {
                trade_ms: 24 * 60 * 60 * 1000,
                archive_ms: 30 * 24 * 60 * 60 * 1000,
                marker_ms: 5_000,
                pending_bias_ms: 24 * 60 * 60 * 1000,
            },
        );
        Fixture {
            store,
            engine,
            sweeps,
            channel,
        }
    }

    async fn open_trade(f: &Fixture, id: &str, entry: &str) {
        let raw = entry_raw("LONG_ENTRY", id, entry, &in_window_time());
        let verdict = f
            .engine
            .open_trade(&Signal::from_raw(&raw, 0), Direction::Long, now_at_eastern(10, 0))
            .await
            .unwrap();
        assert!(matches!(verdict, crate::models::Verdict::Accepted(_)));
    }

    async fn close_trade(f: &Fixture, id: &str, price: &str, exit_type: &str, exit: ExitKind) {
        let raw = exit_raw(exit_type, id, price);
        f.engine
            .apply_exit(&Signal::from_raw(&raw, 0), Direction::Long, exit, now_at_eastern(10, 30))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retention_spares_young_records() {
        let f = fixture();
        let now = now_at_eastern(10, 0);

        open_trade(&f, "7", "18000").await;
        f.store
            .set("signal:fp", serde_json::json!(now.timestamp_millis() - 1_000))
            .await
            .unwrap();

        // Run twice; nothing is old enough either time.
        for _ in 0..2 {
            let report = f.sweeps.run(SweepKind::Retention, now + Duration::hours(1)).await.unwrap();
            assert_eq!(report.trades_removed, 0);
        }
        assert!(f.store.get("trade:7").await.unwrap().is_some());
        // The marker is past its 5s window though.
        let report = f
            .sweeps
            .run(SweepKind::Retention, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.markers_removed, 0); // removed in the first run above
        assert!(f.store.get("signal:fp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retention_removes_expired_records() {
        let f = fixture();
        let now = now_at_eastern(10, 0);

        open_trade(&f, "7", "18000").await;
        close_trade(&f, "7", "18050", "LONG_TP2", ExitKind::Tp2).await;
        open_trade(&f, "8", "18000").await;

        // 31 days later everything is stale.
        let later = now + Duration::days(31);
        let report = f.sweeps.run(SweepKind::Retention, later).await.unwrap();
        assert_eq!(report.trades_removed, 1);
        assert_eq!(report.archives_removed, 1);
        assert!(f.store.scan("trade:").await.unwrap().is_empty());
        assert!(f.store.scan("archive:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settlement_force_closes_without_archiving() {
        let f = fixture();

        open_trade(&f, "7", "18000").await;
        let report = f
            .sweeps
            .run(SweepKind::Settlement, now_at_eastern(16, 0))
            .await
            .unwrap();

        assert_eq!(report.force_closed, 1);
        assert!(f.store.get("trade:7").await.unwrap().is_none());
        // No exit signal resolved it, so no archive record exists.
        assert!(f.store.scan("archive:").await.unwrap().is_empty());

        let sent = f.channel.contents();
        assert!(sent.iter().any(|m| m.contains("Hard Stop")));
        assert!(sent.iter().any(|m| m.contains("Daily Summary")));
    }

    #[tokio::test]
    async fn settlement_reports_daily_results() {
        let f = fixture();

        open_trade(&f, "7", "100").await;
        close_trade(&f, "7", "110", "LONG_TP2", ExitKind::Tp2).await;

        let report = f
            .sweeps
            .run(SweepKind::Settlement, now_at_eastern(16, 0))
            .await
            .unwrap();
        assert_eq!(report.force_closed, 0);
        assert_eq!(report.summaries_sent, 1);

        let sent = f.channel.contents();
        let daily = sent.iter().find(|m| m.contains("Daily Summary")).unwrap();
        assert!(daily.contains("Trades: 1 | Wins: 1 | Losses: 0"));
        assert!(daily.contains("+10.00"));
    }

    #[tokio::test]
    async fn settlement_adds_weekly_summary_on_friday() {
        let f = fixture();
        // 2024-01-19 is a Friday.
        let friday = now_at_eastern(16, 0) + Duration::days(4);
        let report = f.sweeps.run(SweepKind::Settlement, friday).await.unwrap();
        assert_eq!(report.summaries_sent, 2);

        let sent = f.channel.contents();
        let weekly = sent.iter().find(|m| m.contains("Weekly Summary")).unwrap();
        assert!(weekly.contains("2024-01-15 to 2024-01-19"));
    }

    #[tokio::test]
    async fn bias_release_sweep_notifies_queued_bias_once() {
        let f = fixture();
        let bias = BiasScheduler::new(f.store.clone(), (8, 30));
        let raw = crate::models::RawSignal {
            alert_type: Some(serde_json::json!("AM_BIAS")),
            profile: Some(serde_json::json!("bullish expansion")),
            time: Some(serde_json::json!("2024-01-15T12:00:00Z")),
            ..Default::default()
        };
        bias.handle_opening(&Signal::from_raw(&raw, 0), now_at_eastern(7, 0))
            .await
            .unwrap();

        let report = f
            .sweeps
            .run(SweepKind::BiasRelease, now_at_eastern(8, 30))
            .await
            .unwrap();
        assert!(report.bias_released);
        assert!(f
            .channel
            .contents()
            .iter()
            .any(|m| m.contains("bullish expansion")));

        // A second run finds nothing pending.
        let report = f
            .sweeps
            .run(SweepKind::BiasRelease, now_at_eastern(8, 35))
            .await
            .unwrap();
        assert!(!report.bias_released);
    }
}
