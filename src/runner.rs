use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use tv_signal_relay::config::Config;
use tv_signal_relay::core::hours;
use tv_signal_relay::trading::{SweepKind, Sweeps};

/// Host-side clock for the sweeps. The core never schedules itself; this
/// ticker fires each named sweep once per Eastern calendar day at (or after,
/// when the process started late) its configured time.
pub struct SweepTicker {
    sweeps: Arc<Sweeps>,
    schedule: Vec<(SweepKind, (u32, u32))>,
    fired: HashMap<SweepKind, String>,
}

impl SweepTicker {
    pub fn new(sweeps: Arc<Sweeps>, cfg: &Config) -> Self {
        Self {
            sweeps,
            schedule: vec![
                (SweepKind::Retention, cfg.retention_sweep),
                (SweepKind::BiasRelease, cfg.bias_release),
                (SweepKind::Settlement, cfg.settlement),
            ],
            fired: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    async fn tick(&mut self, now: DateTime<Utc>) {
        let minute = hours::minute_of_day_eastern(now);
        let today = hours::date_key(now);

        for (kind, at) in self.schedule.clone() {
            let due = minute >= at.0 * 60 + at.1;
            if due && self.fired.get(&kind) != Some(&today) {
                self.fired.insert(kind, today.clone());
                if let Err(e) = self.sweeps.run(kind, now).await {
                    error!("{} sweep failed: {:#}", kind, e);
                }
            }
        }
    }
}
