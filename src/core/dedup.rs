use anyhow::Result;
use std::sync::Arc;

use crate::store::{keys, KvStore};

/// Suppresses rapid-fire duplicates of one logical signal. The check and the
/// marker write ride on the store's atomic primitive, so two concurrent
/// carriers of the same fingerprint cannot both pass.
pub struct DuplicateSuppressor {
    store: Arc<dyn KvStore>,
    window_ms: i64,
}

impl DuplicateSuppressor {
    pub fn new(store: Arc<dyn KvStore>, window_ms: i64) -> Self {
        Self { store, window_ms }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// True when `fingerprint` was seen inside the suppression window.
    /// A stale marker is overwritten with `now_ms` and reported clean.
    pub async fn check_and_mark(&self, fingerprint: &str, now_ms: i64) -> Result<bool> {
        self.store
            .check_and_mark(&keys::signal(fingerprint), now_ms, self.window_ms)
            .await
    }
}
