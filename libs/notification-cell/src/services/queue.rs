use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::{NotificationError, NotificationJob, NotificationStatus, QueueStats};

const PENDING_QUEUE: &str = "notification_queue:pending";
const PROCESSING_QUEUE: &str = "notification_queue:processing";
const FAILED_QUEUE: &str = "notification_queue:failed";
const SENT_COUNTER: &str = "notification_stats:sent";
const RETRIED_COUNTER: &str = "notification_stats:retried";
const JOB_TTL_SECONDS: u64 = 604_800;
const FINISHED_RETENTION: usize = 1_000;
const ABANDONED_ERROR: &str = "Worker stopped before finishing the job";

fn job_key(id: Uuid) -> String {
    format!("notification_job:{}", id)
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationError>;

    /// Claims the oldest pending job for `worker_id`, moving it to Processing
    /// and counting the attempt.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError>;

    async fn mark_sent(&self, job_id: Uuid) -> Result<NotificationJob, NotificationError>;

    /// Re-queues the job as Retrying, claimable again after `retry_in`, while
    /// it has attempts left. Otherwise moves it to the failed list.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        retry_in: Duration,
    ) -> Result<NotificationJob, NotificationError>;

    /// Fails every Processing job not updated within `older_than`, so jobs
    /// held by a worker that died are retried or dead-lettered. Returns how
    /// many were reclaimed.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, NotificationError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError>;

    async fn stats(&self) -> Result<QueueStats, NotificationError>;
}

fn invalid_transition(job: &NotificationJob, to: NotificationStatus) -> NotificationError {
    NotificationError::InvalidStatusTransition {
        from: job.status.to_string(),
        to: to.to_string(),
    }
}

fn claim(job: &mut NotificationJob, worker_id: &str) -> Result<(), NotificationError> {
    if !job.transition(NotificationStatus::Processing) {
        return Err(invalid_transition(job, NotificationStatus::Processing));
    }
    job.attempts += 1;
    job.worker_id = Some(worker_id.to_string());
    Ok(())
}

fn complete(job: &mut NotificationJob) -> Result<(), NotificationError> {
    if !job.transition(NotificationStatus::Sent) {
        return Err(invalid_transition(job, NotificationStatus::Sent));
    }
    job.sent_at = Some(Utc::now());
    job.last_error = None;
    Ok(())
}

fn fail(job: &mut NotificationJob, error: &str, retry_in: Duration) -> Result<(), NotificationError> {
    let target = if job.can_retry() {
        NotificationStatus::Retrying
    } else {
        NotificationStatus::Failed
    };
    if !job.transition(target) {
        return Err(invalid_transition(job, target));
    }
    job.last_error = Some(error.to_string());
    job.worker_id = None;
    job.retry_at = match target {
        NotificationStatus::Retrying => Some(after(job.updated_at, retry_in)),
        _ => None,
    };
    Ok(())
}

fn after(from: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| from.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn stale_cutoff(older_than: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Default)]
struct InMemoryState {
    jobs: HashMap<Uuid, NotificationJob>,
    pending: VecDeque<Uuid>,
    processing: Vec<Uuid>,
    failed: VecDeque<Uuid>,
    finished: VecDeque<Uuid>,
    sent_total: u64,
    retried_total: u64,
}

impl InMemoryState {
    /// Keeps the most recent `retention` Sent or Failed jobs readable and
    /// forgets older ones. Counters are unaffected.
    fn retire(&mut self, job_id: Uuid, retention: usize) {
        self.finished.push_back(job_id);
        while self.finished.len() > retention {
            if let Some(oldest) = self.finished.pop_front() {
                self.jobs.remove(&oldest);
                self.failed.retain(|id| *id != oldest);
            }
        }
    }

    fn requeue_or_fail(&mut self, job_id: Uuid, status: NotificationStatus, retention: usize) {
        self.processing.retain(|id| *id != job_id);
        if status == NotificationStatus::Retrying {
            self.pending.push_back(job_id);
            self.retried_total += 1;
        } else {
            self.failed.push_back(job_id);
            self.retire(job_id, retention);
        }
    }
}

/// Process-local queue. Jobs are lost on restart.
pub struct InMemoryNotificationQueue {
    state: Mutex<InMemoryState>,
    retention: usize,
}

impl Default for InMemoryNotificationQueue {
    fn default() -> Self {
        Self::with_retention(FINISHED_RETENTION)
    }
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            retention: retention.max(1),
        }
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationError> {
        let mut state = self.state.lock().await;
        state.pending.push_back(job.id);
        debug!("Notification job {} enqueued in memory", job.id);
        state.jobs.insert(job.id, job);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let Some(position) = state
            .pending
            .iter()
            .position(|id| state.jobs.get(id).is_some_and(|job| job.is_due(now)))
        else {
            return Ok(None);
        };

        let Some(job_id) = state.pending.remove(position) else {
            return Ok(None);
        };
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        claim(job, worker_id)?;
        let claimed = job.clone();
        state.processing.push(job_id);
        Ok(Some(claimed))
    }

    async fn mark_sent(&self, job_id: Uuid) -> Result<NotificationJob, NotificationError> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(NotificationError::JobNotFound(job_id))?;
        complete(job)?;
        let updated = job.clone();

        state.processing.retain(|id| *id != job_id);
        state.sent_total += 1;
        state.retire(job_id, self.retention);
        Ok(updated)
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        retry_in: Duration,
    ) -> Result<NotificationJob, NotificationError> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(NotificationError::JobNotFound(job_id))?;
        fail(job, error, retry_in)?;
        let updated = job.clone();

        state.requeue_or_fail(job_id, updated.status, self.retention);
        Ok(updated)
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, NotificationError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let cutoff = stale_cutoff(older_than);

        let stale: Vec<Uuid> = state
            .processing
            .iter()
            .copied()
            .filter(|id| {
                state
                    .jobs
                    .get(id)
                    .map_or(true, |job| job.status == NotificationStatus::Processing && job.updated_at < cutoff)
            })
            .collect();

        let mut reclaimed = 0;
        for job_id in stale {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                state.processing.retain(|id| *id != job_id);
                continue;
            };
            fail(job, ABANDONED_ERROR, Duration::ZERO)?;
            let status = job.status;
            warn!("Reclaimed abandoned notification job {} as {}", job_id, status);
            state.requeue_or_fail(job_id, status, self.retention);
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn stats(&self) -> Result<QueueStats, NotificationError> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            pending_jobs: state.pending.len() as u64,
            processing_jobs: state.processing.len() as u64,
            failed_jobs: state.failed.len() as u64,
            sent_total: state.sent_total,
            retried_total: state.retried_total,
        })
    }
}

/// Durable queue shared between the API and the worker binary.
pub struct RedisNotificationQueue {
    pool: Pool,
}

impl RedisNotificationQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, NotificationError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| NotificationError::QueueError(format!("Failed to create Redis pool: {}", e)))?;

        let queue = Self { pool };
        let mut conn = queue.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis notification queue initialized");

        Ok(queue)
    }

    async fn get_connection(&self) -> Result<Connection, NotificationError> {
        self.pool
            .get()
            .await
            .map_err(|e| NotificationError::QueueError(format!("Failed to get Redis connection: {}", e)))
    }

    async fn load_job(
        &self,
        conn: &mut Connection,
        job_id: Uuid,
    ) -> Result<Option<NotificationJob>, NotificationError> {
        let data: Option<String> = conn.hget(job_key(job_id), "data").await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn route_failed(&self, conn: &mut Connection, job: &NotificationJob) -> Result<(), NotificationError> {
        if job.status == NotificationStatus::Retrying {
            let _: i64 = conn.lpush(PENDING_QUEUE, job.id.to_string()).await?;
            let _: i64 = conn.incr(RETRIED_COUNTER, 1).await?;
        } else {
            let _: i64 = conn.lpush(FAILED_QUEUE, job.id.to_string()).await?;
        }
        Ok(())
    }

    async fn store_job(&self, conn: &mut Connection, job: &NotificationJob) -> Result<(), NotificationError> {
        let data = serde_json::to_string(job)?;
        let status = job.status.to_string();
        let updated_at = job.updated_at.to_rfc3339();

        let _: () = conn
            .hset_multiple(
                job_key(job.id),
                &[
                    ("data", data.as_str()),
                    ("status", status.as_str()),
                    ("updated_at", updated_at.as_str()),
                ],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;
        let key = job_key(job.id);

        self.store_job(&mut conn, &job).await?;
        let _: i64 = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(JOB_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;
        let _: i64 = conn.lpush(PENDING_QUEUE, job.id.to_string()).await?;

        debug!("Notification job {} enqueued", job.id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let mut conn = self.get_connection().await?;

        let claimed: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(PENDING_QUEUE)
            .arg(PROCESSING_QUEUE)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some(raw_id) = claimed else {
            return Ok(None);
        };

        let job_id = match Uuid::parse_str(&raw_id) {
            Ok(id) => id,
            Err(_) => {
                warn!("Discarding malformed job id {} from queue", raw_id);
                let _: i64 = conn.lrem(PROCESSING_QUEUE, 1, &raw_id).await?;
                return Ok(None);
            }
        };

        let Some(mut job) = self.load_job(&mut conn, job_id).await? else {
            warn!("Notification job {} expired before it was processed", job_id);
            let _: i64 = conn.lrem(PROCESSING_QUEUE, 1, &raw_id).await?;
            return Ok(None);
        };

        if !job.is_due(Utc::now()) {
            // Back of the line until its retry time.
            let _: () = redis::pipe()
                .atomic()
                .lrem(PROCESSING_QUEUE, 1, &raw_id)
                .ignore()
                .lpush(PENDING_QUEUE, &raw_id)
                .ignore()
                .query_async(&mut conn)
                .await?;
            return Ok(None);
        }

        if let Err(e) = claim(&mut job, worker_id) {
            warn!("Dropping notification job {} from the queue: {}", job_id, e);
            let _: i64 = conn.lrem(PROCESSING_QUEUE, 1, &raw_id).await?;
            return Err(e);
        }
        self.store_job(&mut conn, &job).await?;

        debug!("Notification job {} claimed by {}", job.id, worker_id);
        Ok(Some(job))
    }

    async fn mark_sent(&self, job_id: Uuid) -> Result<NotificationJob, NotificationError> {
        let mut conn = self.get_connection().await?;
        let mut job = self
            .load_job(&mut conn, job_id)
            .await?
            .ok_or(NotificationError::JobNotFound(job_id))?;

        complete(&mut job)?;
        self.store_job(&mut conn, &job).await?;
        let _: i64 = conn.lrem(PROCESSING_QUEUE, 1, job_id.to_string()).await?;
        let _: i64 = conn.incr(SENT_COUNTER, 1).await?;

        Ok(job)
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        retry_in: Duration,
    ) -> Result<NotificationJob, NotificationError> {
        let mut conn = self.get_connection().await?;
        let mut job = self
            .load_job(&mut conn, job_id)
            .await?
            .ok_or(NotificationError::JobNotFound(job_id))?;

        fail(&mut job, error, retry_in)?;
        self.store_job(&mut conn, &job).await?;
        let _: i64 = conn.lrem(PROCESSING_QUEUE, 1, job_id.to_string()).await?;
        self.route_failed(&mut conn, &job).await?;

        Ok(job)
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, NotificationError> {
        let mut conn = self.get_connection().await?;
        let cutoff = stale_cutoff(older_than);
        let ids: Vec<String> = conn.lrange(PROCESSING_QUEUE, 0, -1).await?;

        let mut reclaimed = 0;
        for raw_id in ids {
            let job = match Uuid::parse_str(&raw_id) {
                Ok(job_id) => self.load_job(&mut conn, job_id).await?,
                Err(_) => None,
            };

            let Some(mut job) = job else {
                let _: i64 = conn.lrem(PROCESSING_QUEUE, 1, &raw_id).await?;
                continue;
            };
            if job.updated_at >= cutoff {
                continue;
            }

            // Whoever removes the id owns the job; a worker finishing it
            // concurrently leaves nothing to remove.
            let removed: i64 = conn.lrem(PROCESSING_QUEUE, 1, &raw_id).await?;
            if removed == 0 {
                continue;
            }

            match job.status {
                NotificationStatus::Processing => {}
                NotificationStatus::Queued | NotificationStatus::Retrying => {
                    // Popped but never claimed.
                    let _: i64 = conn.lpush(PENDING_QUEUE, &raw_id).await?;
                    reclaimed += 1;
                    continue;
                }
                NotificationStatus::Sent | NotificationStatus::Failed => continue,
            }

            fail(&mut job, ABANDONED_ERROR, Duration::ZERO)?;
            self.store_job(&mut conn, &job).await?;
            self.route_failed(&mut conn, &job).await?;
            warn!("Reclaimed abandoned notification job {} as {}", job.id, job.status);
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        let mut conn = self.get_connection().await?;
        self.load_job(&mut conn, job_id).await
    }

    async fn stats(&self) -> Result<QueueStats, NotificationError> {
        let mut conn = self.get_connection().await?;

        let pending_jobs: u64 = conn.llen(PENDING_QUEUE).await?;
        let processing_jobs: u64 = conn.llen(PROCESSING_QUEUE).await?;
        let failed_jobs: u64 = conn.llen(FAILED_QUEUE).await?;
        let sent_total: Option<u64> = conn.get(SENT_COUNTER).await?;
        let retried_total: Option<u64> = conn.get(RETRIED_COUNTER).await?;

        Ok(QueueStats {
            pending_jobs,
            processing_jobs,
            failed_jobs,
            sent_total: sent_total.unwrap_or_default(),
            retried_total: retried_total.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Redis,
    InMemory,
}

/// Connects to Redis when it is configured and reachable, otherwise falls
/// back to an in-memory queue.
pub async fn queue_from_config(config: &AppConfig) -> (Arc<dyn NotificationQueue>, QueueBackend) {
    if let Some(url) = config.redis_url.as_deref().filter(|url| !url.is_empty()) {
        match RedisNotificationQueue::connect(url).await {
            Ok(queue) => return (Arc::new(queue), QueueBackend::Redis),
            Err(e) => warn!("Redis notification queue unavailable, using in-memory queue: {}", e),
        }
    }

    (Arc::new(InMemoryNotificationQueue::new()), QueueBackend::InMemory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::{NotificationKind, Recipient, RecipientKind};

    fn job(max_attempts: u32) -> NotificationJob {
        NotificationJob::new(
            NotificationKind::AppointmentCreated,
            1,
            Recipient {
                kind: RecipientKind::Doctor,
                id: 2,
                email: None,
            },
            "New appointment".to_string(),
            "body".to_string(),
            max_attempts,
        )
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let queue = InMemoryNotificationQueue::new();
        let first = job(3);
        let second = job(3);
        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();

        let claimed = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, NotificationStatus::Processing);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.worker_id.as_deref(), Some("w1"));

        assert_eq!(queue.dequeue("w1").await.unwrap().unwrap().id, second.id);
        assert!(queue.dequeue("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_until_max_attempts_then_failed() {
        let queue = InMemoryNotificationQueue::new();
        let original = job(2);
        queue.enqueue(original.clone()).await.unwrap();

        queue.dequeue("w").await.unwrap().unwrap();
        let retried = queue.mark_failed(original.id, "smtp down", Duration::ZERO).await.unwrap();
        assert_eq!(retried.status, NotificationStatus::Retrying);
        assert_eq!(retried.last_error.as_deref(), Some("smtp down"));

        let second_attempt = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(second_attempt.attempts, 2);
        let failed = queue
            .mark_failed(original.id, "smtp still down", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(failed.status, NotificationStatus::Failed);

        let stats = queue.stats().await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                pending_jobs: 0,
                processing_jobs: 0,
                failed_jobs: 1,
                sent_total: 0,
                retried_total: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_mark_sent_updates_stats() {
        let queue = InMemoryNotificationQueue::new();
        let original = job(3);
        queue.enqueue(original.clone()).await.unwrap();
        queue.dequeue("w").await.unwrap();

        let sent = queue.mark_sent(original.id).await.unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert!(sent.sent_at.is_some());

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.sent_total, 1);
        assert_eq!(stats.processing_jobs, 0);
    }

    #[tokio::test]
    async fn test_mark_sent_requires_processing() {
        let queue = InMemoryNotificationQueue::new();
        let original = job(3);
        queue.enqueue(original.clone()).await.unwrap();

        assert_matches!(
            queue.mark_sent(original.id).await,
            Err(NotificationError::InvalidStatusTransition { .. })
        );
        assert_matches!(
            queue.mark_sent(Uuid::new_v4()).await,
            Err(NotificationError::JobNotFound(_))
        );
    }

    #[tokio::test]
    async fn test_retry_waits_for_its_delay() {
        let queue = InMemoryNotificationQueue::new();
        let delayed = job(3);
        let ready = job(3);
        queue.enqueue(delayed.clone()).await.unwrap();
        queue.dequeue("w").await.unwrap();
        let retried = queue
            .mark_failed(delayed.id, "smtp down", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(retried.retry_at.is_some());

        assert!(queue.dequeue("w").await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().pending_jobs, 1);

        queue.enqueue(ready.clone()).await.unwrap();
        assert_eq!(queue.dequeue("w").await.unwrap().unwrap().id, ready.id);
    }

    #[tokio::test]
    async fn test_reclaim_requeues_abandoned_jobs() {
        let queue = InMemoryNotificationQueue::new();
        let abandoned = job(2);
        queue.enqueue(abandoned.clone()).await.unwrap();
        queue.dequeue("crashed").await.unwrap();

        assert_eq!(queue.reclaim_stale(Duration::from_secs(60)).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.reclaim_stale(Duration::ZERO).await.unwrap(), 1);

        let stored = queue.get_job(abandoned.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Retrying);
        assert_eq!(stored.last_error.as_deref(), Some(ABANDONED_ERROR));

        let second = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(second.id, abandoned.id);
        assert_eq!(second.attempts, 2);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.reclaim_stale(Duration::ZERO).await.unwrap(), 1);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.processing_jobs, 0);
        assert_eq!(stats.failed_jobs, 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_not_retained_forever() {
        let queue = InMemoryNotificationQueue::with_retention(10);

        for _ in 0..1000 {
            let sent = job(3);
            queue.enqueue(sent.clone()).await.unwrap();
            queue.dequeue("w").await.unwrap();
            queue.mark_sent(sent.id).await.unwrap();
        }
        let dead = job(1);
        queue.enqueue(dead.clone()).await.unwrap();
        queue.dequeue("w").await.unwrap();
        queue.mark_failed(dead.id, "bounced", Duration::ZERO).await.unwrap();

        let state = queue.state.lock().await;
        assert_eq!(state.jobs.len(), 10);
        assert!(state.jobs.contains_key(&dead.id));
        drop(state);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.sent_total, 1000);
        assert_eq!(stats.failed_jobs, 1);
        assert_eq!(stats.pending_jobs, 0);
    }
}
