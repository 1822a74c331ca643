use serde::{Deserialize, Serialize};

use crate::models::{Direction, ExitKind};

/// The single live position being tracked. Stored under `trade:<id>` and
/// deleted on full close (after its archive record is written).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub direction: Direction,
    pub symbol: String,
    pub tf: String,
    pub entry: f64,
    pub sl: f64,
    pub tp1: f64,
    pub tp2: f64,
    /// Raw signal timestamp the trade was opened with.
    pub start_time: String,
    /// Millis of the last accepted mutation, drives retention.
    pub last_update: i64,
    #[serde(default)]
    pub partial_closed: bool,
    #[serde(default)]
    pub partial_close_type: Option<ExitKind>,
    #[serde(default)]
    pub partial_close_time: Option<i64>,
}

impl Trade {
    /// Directional points for an exit at `exit_price`.
    pub fn points(&self, exit_price: f64) -> f64 {
        match self.direction {
            Direction::Long => exit_price - self.entry,
            Direction::Short => self.entry - exit_price,
        }
    }
}

/// Immutable snapshot of a closed trade, keyed `archive:<date>:<id>`.
/// Written exactly once, before the live record is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub trade_id: String,
    pub direction: Direction,
    pub symbol: String,
    pub tf: String,
    pub entry: f64,
    pub exit_price: f64,
    pub exit_kind: ExitKind,
    pub points: f64,
    pub win: bool,
    pub archived_at: i64,
}

/// A deferred opening-bias alert, keyed `bias:<date>`. Consumed once by the
/// release sweep (or discarded when the day's bias already went out).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingBias {
    pub profile: String,
    pub time: String,
    pub received_at: i64,
}

/// Read-only view of one live trade, as exposed by the health query and the
/// settlement sweep.
#[derive(Debug, Clone, Serialize)]
pub struct LiveTrade {
    pub id: String,
    pub direction: Direction,
    pub symbol: String,
    pub tf: String,
    pub entry: f64,
    pub start_time: String,
    pub partial_closed: bool,
}

/// Win/loss/points rollup over a set of archive dates.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub label: String,
    pub dates: Vec<String>,
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub points: f64,
}

impl PerformanceSummary {
    pub fn win_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.wins as f64 / self.total as f64 * 100.0
        }
    }
}
