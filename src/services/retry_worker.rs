//! Retry scheduler for failed and stuck pending dispatches
//!
//! Each pass lists eligible records, applies per-record exponential backoff
//! and re-sends the due ones through the normal dispatch path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DeliveryTracker, PostbackService};
use crate::config::RetryConfig;
use crate::errors::Result;
use crate::storage::models::{DispatchRecord, DispatchStatus};

/// `min(base * 2^(attempts-1), max)`; zero attempts means due immediately
pub fn backoff_delay(attempts: u32, base: Duration, max: Duration) -> Duration {
    if attempts == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(attempts - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub scanned: usize,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub errors: usize,
    /// Conversions dispatched for the first time because they had no record
    pub unrecorded: usize,
}

impl RetryReport {
    fn count(&mut self, outcome: Result<DispatchRecord>, target: impl FnOnce() -> String) {
        match outcome {
            Ok(record) if record.status == DispatchStatus::Sent => self.sent += 1,
            Ok(_) => self.failed += 1,
            Err(e) => {
                self.errors += 1;
                warn!("Retry of {} failed: {}", target(), e);
            }
        }
    }
}

pub struct RetryWorker {
    postback: Arc<PostbackService>,
    tracker: Arc<DeliveryTracker>,
    config: RetryConfig,
}

impl RetryWorker {
    pub fn new(
        postback: Arc<PostbackService>,
        tracker: Arc<DeliveryTracker>,
        config: RetryConfig,
    ) -> Self {
        Self {
            postback,
            tracker,
            config,
        }
    }

    fn base_delay(&self) -> Duration {
        Duration::from_secs(self.config.base_delay_secs)
    }

    /// Conversions created before this and still without a record are swept
    fn unrecorded_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.config.unrecorded_grace_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|grace| now.checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn max_delay(&self) -> Duration {
        Duration::from_secs(self.config.max_delay_secs)
    }

    /// Whether the record's backoff window has passed
    pub fn is_due(&self, record: &DispatchRecord, now: DateTime<Utc>) -> bool {
        let Some(last) = record.last_attempt_at else {
            return true;
        };
        let delay = backoff_delay(record.attempt_count, self.base_delay(), self.max_delay());
        match chrono::Duration::from_std(delay) {
            Ok(delay) => last + delay <= now,
            Err(_) => false,
        }
    }

    /// One scheduling pass
    pub async fn run_once(&self) -> Result<RetryReport> {
        let now = Utc::now();
        let older_than =
            now - chrono::Duration::from_std(self.base_delay()).unwrap_or(chrono::Duration::zero());
        let limit = usize::try_from(self.config.batch_size.max(1)).unwrap_or(usize::MAX);

        let mut report = RetryReport::default();
        let mut due = Vec::new();
        {
            let stream = self
                .tracker
                .list_for_retry(older_than, self.config.max_attempts);
            futures_util::pin_mut!(stream);
            while let Some(record) = stream.next().await {
                let record = record?;
                report.scanned += 1;
                if self.is_due(&record, now) {
                    due.push(record);
                    if due.len() >= limit {
                        break;
                    }
                }
            }
        }

        for record in due {
            let id = record.id;
            report.attempted += 1;
            let outcome = self.postback.redeliver_record(record).await;
            report.count(outcome, || format!("dispatch record {}", id));
        }

        // 记录写入前中断的转化（进程退出、存储故障）从这里补发
        let orphans = self
            .tracker
            .conversions_without_record(self.unrecorded_cutoff(now), self.config.batch_size.max(1))
            .await?;
        for conversion in orphans {
            report.unrecorded += 1;
            report.attempted += 1;
            let outcome = self.postback.redispatch_conversion(&conversion).await;
            report.count(outcome, || format!("conversion {}", conversion.id));
        }

        if report.attempted > 0 {
            info!(
                "Retry pass: {} scanned, {} unrecorded, {} attempted, {} sent, {} failed, {} errors",
                report.scanned,
                report.unrecorded,
                report.attempted,
                report.sent,
                report.failed,
                report.errors
            );
        } else {
            debug!("Retry pass: {} scanned, nothing due", report.scanned);
        }
        Ok(report)
    }

    /// 启动后台重试任务，收到 shutdown 信号后退出
    pub fn spawn_background_task(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        info!(
            "Dispatch retry task started (interval: {}s, max attempts: {})",
            interval.as_secs(),
            self.config.max_attempts
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }

                if let Err(e) = self.run_once().await {
                    error!("Dispatch retry pass failed: {}", e);
                }
            }
            info!("Dispatch retry task stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_curve() {
        let base = Duration::from_secs(60);
        let max = Duration::from_secs(3600);

        assert_eq!(backoff_delay(0, base, max), Duration::ZERO);
        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(60));
        assert_eq!(backoff_delay(2, base, max), Duration::from_secs(120));
        assert_eq!(backoff_delay(4, base, max), Duration::from_secs(480));
        assert_eq!(backoff_delay(7, base, max), max);
        assert_eq!(backoff_delay(40, base, max), max);
    }
}
