use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use notification_cell::*;

struct CountingSender {
    calls: AtomicU32,
    fail: bool,
    delay: Duration,
}

impl CountingSender {
    fn succeeding() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: false,
            delay: Duration::ZERO,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::succeeding()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for CountingSender {
    async fn send(&self, _job: &NotificationJob) -> Result<(), NotificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(NotificationError::DeliveryError("mailbox unavailable".to_string()));
        }
        Ok(())
    }
}

fn test_config() -> WorkerConfig {
    WorkerConfig {
        worker_id: "test-worker".to_string(),
        concurrency: 2,
        job_timeout: Duration::from_millis(100),
        base_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
        stale_after: Duration::from_secs(60),
        housekeeping_interval: Duration::from_millis(10),
    }
}

fn test_job(max_attempts: u32) -> NotificationJob {
    NotificationJob::new(
        NotificationKind::AppointmentCreated,
        11,
        Recipient {
            kind: RecipientKind::Patient,
            id: 5,
            email: Some("patient@example.com".to_string()),
        },
        "Appointment booked".to_string(),
        "Appointment #11".to_string(),
        max_attempts,
    )
}

#[tokio::test]
async fn successful_delivery_marks_job_sent() {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let sender = Arc::new(CountingSender::succeeding());
    let worker = NotificationWorker::new(test_config(), queue.clone(), sender.clone());

    let job = test_job(3);
    queue.enqueue(job.clone()).await.unwrap();

    assert!(worker.process_next("loop-0").await.unwrap());
    assert!(!worker.process_next("loop-0").await.unwrap());

    let stored = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.attempts, 1);
    assert_eq!(sender.calls(), 1);
    assert_eq!(queue.stats().await.unwrap().sent_total, 1);
}

#[tokio::test]
async fn failing_delivery_retries_then_dead_letters() {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let sender = Arc::new(CountingSender::failing());
    let worker = NotificationWorker::new(test_config(), queue.clone(), sender.clone());

    let job = test_job(3);
    queue.enqueue(job.clone()).await.unwrap();

    for _ in 0..3 {
        assert!(worker.process_next("loop-0").await.unwrap());
    }
    assert!(!worker.process_next("loop-0").await.unwrap());

    let stored = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Failed);
    assert_eq!(stored.attempts, 3);
    assert!(stored.last_error.unwrap().contains("mailbox unavailable"));
    assert_eq!(sender.calls(), 3);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.failed_jobs, 1);
    assert_eq!(stats.retried_total, 2);
    assert_eq!(stats.pending_jobs, 0);
}

#[tokio::test]
async fn slow_delivery_times_out_and_is_retried() {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let sender = Arc::new(CountingSender::slow(Duration::from_millis(500)));
    let worker = NotificationWorker::new(test_config(), queue.clone(), sender);

    let job = test_job(2);
    queue.enqueue(job.clone()).await.unwrap();
    worker.process_next("loop-0").await.unwrap();

    let stored = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Retrying);
    assert!(stored.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn spawned_loops_drain_queue_and_stop_on_shutdown() {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let sender = Arc::new(CountingSender::succeeding());
    let worker = Arc::new(NotificationWorker::new(test_config(), queue.clone(), sender.clone()));
    let (tx, shutdown) = watch::channel(false);

    for _ in 0..5 {
        queue.enqueue(test_job(3)).await.unwrap();
    }

    let handles = worker.spawn(shutdown);

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if queue.stats().await.unwrap().sent_total == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "queue was not drained in time");

    tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker loop did not stop")
            .unwrap();
    }

    assert_eq!(sender.calls(), 5);
}

#[tokio::test]
async fn failed_delivery_is_delayed_by_backoff() {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let sender = Arc::new(CountingSender::failing());
    let config = WorkerConfig {
        base_backoff: Duration::from_secs(30),
        max_backoff: Duration::from_secs(60),
        ..test_config()
    };
    let worker = NotificationWorker::new(config, queue.clone(), sender.clone());

    let job = test_job(3);
    queue.enqueue(job.clone()).await.unwrap();

    assert!(worker.process_next("loop-0").await.unwrap());
    assert!(!worker.process_next("loop-0").await.unwrap());

    let stored = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Retrying);
    assert!(stored.retry_at.unwrap() > stored.updated_at);
    assert_eq!(sender.calls(), 1);
}

#[tokio::test]
async fn abandoned_job_is_reclaimed_and_delivered() {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let sender = Arc::new(CountingSender::succeeding());
    let config = WorkerConfig {
        stale_after: Duration::from_millis(20),
        ..test_config()
    };
    let worker = Arc::new(NotificationWorker::new(config, queue.clone(), sender.clone()));
    let (tx, shutdown) = watch::channel(false);

    let job = test_job(3);
    queue.enqueue(job.clone()).await.unwrap();
    // Claimed by a worker that never reports back.
    queue.dequeue("crashed-worker").await.unwrap().unwrap();

    let handles = worker.spawn(shutdown);

    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if queue.stats().await.unwrap().sent_total == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "abandoned job was not reclaimed in time");

    tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker loop did not stop")
            .unwrap();
    }

    let stored = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.attempts, 2);
    assert_eq!(sender.calls(), 1);
}
