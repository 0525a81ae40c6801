use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentCreated,
    AppointmentRescheduled,
    AppointmentCancelled,
    AppointmentStatusChanged,
    AppointmentReminder,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    Patient,
    Doctor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub kind: RecipientKind,
    pub id: i64,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Queued,
    Processing,
    Sent,
    Retrying,
    Failed,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Failed)
    }

    pub fn can_transition_to(&self, target: &NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, target),
            (Queued, Processing)
                | (Processing, Sent)
                | (Processing, Retrying)
                | (Processing, Failed)
                | (Retrying, Processing)
        )
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationStatus::Queued => "queued",
            NotificationStatus::Processing => "processing",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Retrying => "retrying",
            NotificationStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub appointment_id: i64,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
    /// Earliest time a Retrying job may be claimed again.
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,
}

impl NotificationJob {
    pub fn new(
        kind: NotificationKind,
        appointment_id: i64,
        recipient: Recipient,
        subject: String,
        body: String,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            appointment_id,
            recipient,
            subject,
            body,
            status: NotificationStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            updated_at: now,
            sent_at: None,
            last_error: None,
            worker_id: None,
            retry_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_at.map_or(true, |at| at <= now)
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Moves the job to `target`, stamping `updated_at`. Returns false and
    /// leaves the job untouched when the transition is not allowed.
    pub fn transition(&mut self, target: NotificationStatus) -> bool {
        if !self.status.can_transition_to(&target) {
            return false;
        }
        self.status = target;
        self.updated_at = Utc::now();
        true
    }
}

/// The appointment fields notifications are rendered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub patient_email: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    pub doctor_id: i64,
    pub doctor_email: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    pub date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub pending_jobs: u64,
    pub processing_jobs: u64,
    pub failed_jobs: u64,
    pub sent_total: u64,
    pub retried_total: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: u32,
    pub job_timeout: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub poll_interval: Duration,
    /// A Processing job untouched for this long is treated as abandoned.
    pub stale_after: Duration,
    pub housekeeping_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("notifier-{}", Uuid::new_v4()),
            concurrency: 2,
            job_timeout: Duration::from_secs(30),
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
            stale_after: Duration::from_secs(120),
            housekeeping_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.notification_workers.max(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> Recipient {
        Recipient {
            kind: RecipientKind::Patient,
            id: 1,
            email: Some("p@example.com".to_string()),
        }
    }

    #[test]
    fn test_status_transitions() {
        use NotificationStatus::*;

        assert!(Queued.can_transition_to(&Processing));
        assert!(Processing.can_transition_to(&Sent));
        assert!(Processing.can_transition_to(&Retrying));
        assert!(Processing.can_transition_to(&Failed));
        assert!(Retrying.can_transition_to(&Processing));

        assert!(!Queued.can_transition_to(&Sent));
        assert!(!Sent.can_transition_to(&Processing));
        assert!(!Failed.can_transition_to(&Retrying));
        assert!(Sent.is_terminal() && Failed.is_terminal());
        assert!(!Retrying.is_terminal());
    }

    #[test]
    fn test_new_job_defaults() {
        let job = NotificationJob::new(
            NotificationKind::AppointmentCreated,
            7,
            recipient(),
            "subject".to_string(),
            "body".to_string(),
            0,
        );

        assert_eq!(job.status, NotificationStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 1);
        assert!(job.can_retry());
    }

    #[test]
    fn test_transition_rejects_invalid_target() {
        let mut job = NotificationJob::new(
            NotificationKind::AppointmentReminder,
            7,
            recipient(),
            "s".to_string(),
            "b".to_string(),
            3,
        );

        assert!(!job.transition(NotificationStatus::Sent));
        assert_eq!(job.status, NotificationStatus::Queued);
        assert!(job.transition(NotificationStatus::Processing));
        assert!(job.transition(NotificationStatus::Sent));
    }

    #[test]
    fn test_retry_at_gates_readiness() {
        let mut job = NotificationJob::new(
            NotificationKind::AppointmentCreated,
            7,
            recipient(),
            "s".to_string(),
            "b".to_string(),
            3,
        );
        let now = Utc::now();
        assert!(job.is_due(now));

        job.retry_at = Some(now + chrono::Duration::seconds(30));
        assert!(!job.is_due(now));
        assert!(job.is_due(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(NotificationKind::AppointmentStatusChanged).unwrap();
        assert_eq!(value, "appointment_status_changed");
    }
}
