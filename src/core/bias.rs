use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::hours;
use crate::models::{PendingBias, Rejection, Signal, Verdict};
use crate::store::{keys, KvStore};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// What to do with an accepted opening-bias signal.
#[derive(Debug, Clone)]
pub enum BiasDecision {
    /// Held for the morning release; no notification yet.
    Queued { date: String },
    /// Past the cutoff and unsent today; notify now.
    Notify,
}

/// One opening-bias release per Eastern calendar day. Signals arriving before
/// the release time are parked as a Pending Bias; the release sweep (or a
/// post-cutoff signal) claims the day's single slot through the store's
/// atomic marker, so the queue and a live signal can never both go out.
pub struct BiasScheduler {
    store: Arc<dyn KvStore>,
    cutoff: (u32, u32),
}

impl BiasScheduler {
    pub fn new(store: Arc<dyn KvStore>, cutoff: (u32, u32)) -> Self {
        Self { store, cutoff }
    }

    pub async fn handle_opening(
        &self,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> Result<Verdict<BiasDecision>> {
        let date = hours::date_key(now);

        if hours::before_cutoff(now, self.cutoff) {
            let pending = PendingBias {
                profile: signal.profile.clone(),
                time: signal.time.clone(),
                received_at: now.timestamp_millis(),
            };
            self.store
                .set(
                    &keys::pending_bias(&date),
                    serde_json::to_value(&pending).context("serialize pending bias")?,
                )
                .await?;
            return Ok(Verdict::Accepted(BiasDecision::Queued { date }));
        }

        let already_sent = self
            .store
            .check_and_mark(&keys::bias_sent(&date), now.timestamp_millis(), DAY_MS)
            .await?;
        if already_sent {
            return Ok(Verdict::Rejected(Rejection::BiasAlreadySent { date }));
        }
        Ok(Verdict::Accepted(BiasDecision::Notify))
    }

    /// Release path, run by the sweep at the cutoff. Consumes today's pending
    /// bias and returns it if this call won the day's release slot. A second
    /// run finds nothing pending and is a no-op.
    pub async fn release_due(&self, now: DateTime<Utc>) -> Result<Option<PendingBias>> {
        let date = hours::date_key(now);
        let pending_key = keys::pending_bias(&date);

        let Some(value) = self.store.get(&pending_key).await? else {
            return Ok(None);
        };
        let pending: PendingBias =
            serde_json::from_value(value).context("deserialize pending bias")?;

        // Claim the day's slot first; the pending record goes away either way.
        let already_sent = self
            .store
            .check_and_mark(&keys::bias_sent(&date), now.timestamp_millis(), DAY_MS)
            .await?;
        self.store.delete(&pending_key).await?;

        if already_sent {
            return Ok(None);
        }
        Ok(Some(pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawSignal, Signal};
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    fn bias_signal(profile: &str) -> Signal {
        let raw = RawSignal {
            alert_type: Some(json!("AM_BIAS")),
            profile: Some(json!(profile)),
            time: Some(json!("2024-01-15T12:00:00Z")),
            ..Default::default()
        };
        Signal::from_raw(&raw, 0)
    }

    /// January: Eastern is UTC-5.
    fn utc_at_eastern(et_hour: u32, et_minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(et_hour + 5, et_minute, 0)
                .unwrap(),
        )
    }

    fn scheduler(store: Arc<MemoryStore>) -> BiasScheduler {
        BiasScheduler::new(store, (8, 30))
    }

    #[tokio::test]
    async fn pre_cutoff_bias_is_queued() {
        let store = Arc::new(MemoryStore::new());
        let sched = scheduler(store.clone());

        let verdict = sched
            .handle_opening(&bias_signal("bullish"), utc_at_eastern(7, 45))
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            Verdict::Accepted(BiasDecision::Queued { .. })
        ));
        assert!(store.get("bias:2024-01-15").await.unwrap().is_some());
        assert!(store.get("bias_sent:2024-01-15").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_cutoff_bias_notifies_and_marks() {
        let store = Arc::new(MemoryStore::new());
        let sched = scheduler(store.clone());

        let verdict = sched
            .handle_opening(&bias_signal("bearish"), utc_at_eastern(8, 30))
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Accepted(BiasDecision::Notify)));
        assert!(store.get("bias_sent:2024-01-15").await.unwrap().is_some());

        // The same day's second post-cutoff bias is turned down.
        let verdict = sched
            .handle_opening(&bias_signal("bearish"), utc_at_eastern(9, 0))
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            Verdict::Rejected(Rejection::BiasAlreadySent { .. })
        ));
    }

    #[tokio::test]
    async fn release_consumes_pending_once() {
        let store = Arc::new(MemoryStore::new());
        let sched = scheduler(store.clone());

        sched
            .handle_opening(&bias_signal("bullish"), utc_at_eastern(7, 0))
            .await
            .unwrap();

        let released = sched.release_due(utc_at_eastern(8, 30)).await.unwrap();
        assert_eq!(released.unwrap().profile, "bullish");
        assert!(store.get("bias:2024-01-15").await.unwrap().is_none());

        // Second run: nothing pending, nothing released.
        let released = sched.release_due(utc_at_eastern(8, 31)).await.unwrap();
        assert!(released.is_none());
    }

    #[tokio::test]
    async fn release_with_nothing_pending_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let sched = scheduler(store);
        assert!(sched
            .release_due(utc_at_eastern(8, 30))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn late_queue_entry_after_send_is_dropped_on_release() {
        let store = Arc::new(MemoryStore::new());
        let sched = scheduler(store.clone());

        // Immediate bias already went out today.
        sched
            .handle_opening(&bias_signal("bearish"), utc_at_eastern(8, 45))
            .await
            .unwrap();
        // A stale pending record somehow exists for the same day.
        store
            .set(
                "bias:2024-01-15",
                serde_json::to_value(PendingBias {
                    profile: "bullish".to_string(),
                    time: String::new(),
                    received_at: 0,
                })
                .unwrap(),
            )
            .await
            .unwrap();

        let released = sched.release_due(utc_at_eastern(9, 0)).await.unwrap();
        assert!(released.is_none());
        assert!(store.get("bias:2024-01-15").await.unwrap().is_none());
    }
}
