pub mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Result of the atomic create-if-absent primitive. On conflict the first
/// matching record rides along so the caller can report what blocked it.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created,
    Conflict { key: String, value: Value },
}

/// Durable, linearizable key-value storage. Records are JSON values;
/// typed records serialize through serde on the way in and out.
///
/// The two compound operations are the load-bearing part of the contract:
/// they must be atomic with respect to every other operation, because the
/// single-active-trade invariant and duplicate suppression both hinge on a
/// check-then-act with no interleaving window.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// All records whose key starts with `prefix`, in key order.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>>;

    /// Write `key = value` only if no record under `prefix` satisfies
    /// `conflicts`. Scan and write happen under one logical transaction.
    async fn create_if_absent_matching(
        &self,
        prefix: &str,
        key: &str,
        value: Value,
        conflicts: &(dyn for<'a> Fn(&'a Value) -> bool + Send + Sync),
    ) -> Result<CreateOutcome>;

    /// Atomic duplicate check: if a marker at `key` is younger than
    /// `window_ms`, report true and leave it untouched; otherwise stamp
    /// `now_ms` and report false.
    async fn check_and_mark(&self, key: &str, now_ms: i64, window_ms: i64) -> Result<bool>;
}

/// Key layout. Prefixes partition ownership: the trade engine owns `trade:`
/// and `archive:`, the bias scheduler `bias:` and `bias_sent:`, the
/// duplicate suppressor `signal:`.
pub mod keys {
    pub const TRADE_PREFIX: &str = "trade:";
    pub const ARCHIVE_PREFIX: &str = "archive:";
    pub const SIGNAL_PREFIX: &str = "signal:";
    pub const PENDING_BIAS_PREFIX: &str = "bias:";
    pub const BIAS_SENT_PREFIX: &str = "bias_sent:";

    pub fn trade(id: &str) -> String {
        format!("{TRADE_PREFIX}{id}")
    }

    pub fn trade_id(key: &str) -> &str {
        key.strip_prefix(TRADE_PREFIX).unwrap_or(key)
    }

    pub fn archive(date: &str, id: &str) -> String {
        format!("{ARCHIVE_PREFIX}{date}:{id}")
    }

    /// Prefix selecting every archive record for one Eastern date.
    pub fn archive_date(date: &str) -> String {
        format!("{ARCHIVE_PREFIX}{date}:")
    }

    pub fn signal(fingerprint: &str) -> String {
        format!("{SIGNAL_PREFIX}{fingerprint}")
    }

    pub fn pending_bias(date: &str) -> String {
        format!("{PENDING_BIAS_PREFIX}{date}")
    }

    pub fn bias_sent(date: &str) -> String {
        format!("{BIAS_SENT_PREFIX}{date}")
    }
}
