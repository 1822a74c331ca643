use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::notify::{Channel, Message};

/// Exponential backoff between attempts: base, 2x, 4x, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(failed_attempt.saturating_sub(1))
    }
}

/// Per-message record cap and the pause between consecutive batches.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub capacity: usize,
    pub delay: Duration,
}

impl BatchPolicy {
    pub fn new(capacity: usize, delay_ms: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub channel: String,
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Fan-out result. `success` reflects the primary channel only; secondaries
/// are best-effort and their failures live in `reports`.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub success: bool,
    pub reports: Vec<DeliveryReport>,
}

#[derive(Debug, Clone)]
pub struct BatchDelivery {
    pub channel: String,
    pub success: bool,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub success: bool,
    pub reports: Vec<BatchDelivery>,
}

/// Fans one logical alert out to every configured channel. The first channel
/// is primary. Channels run as independent tasks so one channel's backoff
/// never delays another's delivery.
pub struct Dispatcher {
    channels: Vec<Arc<dyn Channel>>,
    retry: RetryPolicy,
    batch: BatchPolicy,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Channel>>, retry: RetryPolicy, batch: BatchPolicy) -> Self {
        Self {
            channels,
            retry,
            batch,
        }
    }

    pub async fn dispatch(&self, message: &Message) -> DispatchResult {
        let mut handles = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let name = channel.name().to_string();
            let ch = channel.clone();
            let msg = message.clone();
            let retry = self.retry;
            let handle = tokio::spawn(async move { send_with_retry(ch, &msg, retry).await });
            handles.push((name, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => reports.push(DeliveryReport {
                    channel: name,
                    success: false,
                    attempts: 0,
                    error: Some(format!("delivery task failed: {e}")),
                }),
            }
        }

        let success = reports.first().map(|r| r.success).unwrap_or(false);
        DispatchResult { success, reports }
    }

    /// Send an ordered set of record lines, split into capacity-sized
    /// batches. Batches go out sequentially per channel with a fixed pause
    /// in between; each batch retries on its own, and a batch that was
    /// already acknowledged is never resent even when a later one fails.
    pub async fn dispatch_batched(&self, lines: &[String]) -> BatchResult {
        if lines.is_empty() {
            return BatchResult {
                success: true,
                reports: Vec::new(),
            };
        }

        let batches: Vec<Message> = lines
            .chunks(self.batch.capacity)
            .map(|chunk| Message::text(chunk.join("\n")))
            .collect();

        let mut handles = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let name = channel.name().to_string();
            let ch = channel.clone();
            let retry = self.retry;
            let pause = self.batch.delay;
            let batches = batches.clone();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let mut delivered = 0;
                let mut failed = 0;
                for (i, msg) in batches.iter().enumerate() {
                    if i > 0 {
                        sleep(pause).await;
                    }
                    let report = send_with_retry(ch.clone(), msg, retry).await;
                    if report.success {
                        delivered += 1;
                    } else {
                        failed += 1;
                        warn!(
                            "batch {}/{} to {} undelivered: {:?}",
                            i + 1,
                            batches.len(),
                            task_name,
                            report.error
                        );
                    }
                }
                BatchDelivery {
                    channel: task_name,
                    success: failed == 0,
                    delivered,
                    failed,
                }
            });
            handles.push((name, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("batch task for {} failed: {}", name, e);
                    reports.push(BatchDelivery {
                        channel: name,
                        success: false,
                        delivered: 0,
                        failed: batches.len(),
                    });
                }
            }
        }

        let success = reports.first().map(|r| r.success).unwrap_or(false);
        BatchResult { success, reports }
    }
}

async fn send_with_retry(
    channel: Arc<dyn Channel>,
    message: &Message,
    retry: RetryPolicy,
) -> DeliveryReport {
    let name = channel.name().to_string();
    let mut last_error = None;

    for attempt in 1..=retry.max_attempts {
        match channel.deliver(message).await {
            Ok(()) => {
                if attempt > 1 {
                    debug!("delivery to {} succeeded on attempt {}", name, attempt);
                }
                return DeliveryReport {
                    channel: name,
                    success: true,
                    attempts: attempt,
                    error: None,
                };
            }
            Err(e) if !e.is_retryable() => {
                warn!("delivery to {} failed terminally: {}", name, e);
                return DeliveryReport {
                    channel: name,
                    success: false,
                    attempts: attempt,
                    error: Some(e.to_string()),
                };
            }
            Err(e) => {
                warn!(
                    "delivery attempt {}/{} to {} failed: {}",
                    attempt, retry.max_attempts, name, e
                );
                last_error = Some(e.to_string());
                if attempt < retry.max_attempts {
                    sleep(retry.delay_after(attempt)).await;
                }
            }
        }
    }

    DeliveryReport {
        channel: name,
        success: false,
        attempts: retry.max_attempts,
        error: last_error,
    }
}
