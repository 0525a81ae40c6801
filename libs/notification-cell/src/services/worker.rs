use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::services::{queue::NotificationQueue, sender::NotificationSender};
use crate::{NotificationError, NotificationJob, NotificationStatus, WorkerConfig};

/// Delay before a job whose `attempt`-th delivery failed may be claimed again:
/// `base * 2^(attempt - 1)`, capped at `max`, plus up to `base / 2` of jitter.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(2u32.saturating_pow(exponent)).min(max);

    let jitter_ms = (base.as_millis() / 2) as u64;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };

    delay + Duration::from_millis(jitter)
}

pub struct NotificationWorker {
    config: WorkerConfig,
    queue: Arc<dyn NotificationQueue>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationWorker {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn NotificationQueue>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self { config, queue, sender }
    }

    /// Starts `concurrency` delivery loops plus one housekeeping loop, all
    /// running until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting notification worker {} with {} loops",
            self.config.worker_id, self.config.concurrency
        );

        let mut handles: Vec<JoinHandle<()>> = (0..self.config.concurrency.max(1))
            .map(|i| {
                let worker = Arc::clone(&self);
                let loop_name = format!("{}-{}", self.config.worker_id, i);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.worker_loop(loop_name, shutdown).await })
            })
            .collect();

        let worker = Arc::clone(&self);
        handles.push(tokio::spawn(async move { worker.housekeeping_loop(shutdown).await }));
        handles
    }

    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let worker_id = self.config.worker_id.clone();
        let handles = self.spawn(shutdown);

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Notification worker loop panicked: {}", e);
            }
        }

        info!("Notification worker {} stopped", worker_id);
    }

    async fn worker_loop(&self, loop_name: String, mut shutdown: watch::Receiver<bool>) {
        debug!("Worker loop started: {}", loop_name);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next(&loop_name).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Worker {} failed to process notification: {}", loop_name, e);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        debug!("Worker loop ended: {}", loop_name);
    }

    /// Re-queues jobs left in Processing by a worker that died, on every
    /// `housekeeping_interval` tick.
    async fn housekeeping_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.housekeeping_interval.max(Duration::from_millis(1)));

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.queue.reclaim_stale(self.config.stale_after).await {
                Ok(0) => {}
                Ok(reclaimed) => info!("Reclaimed {} abandoned notification jobs", reclaimed),
                Err(e) => warn!("Failed to reclaim abandoned notification jobs: {}", e),
            }

            if let Ok(stats) = self.queue.stats().await {
                debug!(
                    "Notification queue: pending={}, processing={}, failed={}, sent={}",
                    stats.pending_jobs, stats.processing_jobs, stats.failed_jobs, stats.sent_total
                );
            }
        }
    }

    /// Claims and processes one job. Returns false when no job was ready.
    pub async fn process_next(&self, loop_name: &str) -> Result<bool, NotificationError> {
        match self.queue.dequeue(loop_name).await? {
            Some(job) => {
                self.process_job(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, attempt = job.attempts))]
    async fn process_job(&self, job: NotificationJob) -> Result<NotificationStatus, NotificationError> {
        let delivery = match timeout(self.config.job_timeout, self.sender.send(&job)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout {
                timeout_ms: self.config.job_timeout.as_millis() as u64,
            }),
        };

        let err = match delivery {
            Ok(()) => {
                self.queue.mark_sent(job.id).await?;
                info!("Notification {} sent", job.id);
                return Ok(NotificationStatus::Sent);
            }
            Err(e) => e,
        };

        let delay = if job.can_retry() {
            backoff_delay(self.config.base_backoff, self.config.max_backoff, job.attempts)
        } else {
            Duration::ZERO
        };

        let updated = self.queue.mark_failed(job.id, &err.to_string(), delay).await?;
        if updated.status == NotificationStatus::Retrying {
            warn!(
                "Notification {} failed (attempt {}/{}), retrying in {:?}: {}",
                job.id, job.attempts, job.max_attempts, delay, err
            );
        } else {
            error!(
                "Notification {} failed after {} attempts: {}",
                job.id, updated.attempts, err
            );
        }

        Ok(updated.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(60);

        let first = backoff_delay(base, max, 1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));

        let third = backoff_delay(base, max, 3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(450));
    }

    #[test]
    fn test_backoff_is_capped() {
        let delay = backoff_delay(Duration::from_secs(2), Duration::from_secs(10), 30);
        assert!(delay >= Duration::from_secs(10) && delay <= Duration::from_secs(11));
    }
}
