use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::{NotificationError, NotificationJob};

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError>;
}

/// Writes notifications to the log. Used when no delivery endpoint is set.
#[derive(Debug, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        info!(
            job_id = %job.id,
            recipient_id = job.recipient.id,
            recipient_kind = ?job.recipient.kind,
            "Notification: {}",
            job.subject
        );
        Ok(())
    }
}

pub struct WebhookNotificationSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSender {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::DeliveryError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let payload = json!({
            "id": job.id,
            "kind": job.kind,
            "appointment_id": job.appointment_id,
            "recipient": job.recipient,
            "subject": job.subject,
            "body": job.body,
            "attempt": job.attempts,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::DeliveryError(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        debug!("Notification {} delivered to webhook", job.id);
        Ok(())
    }
}

/// Delivers through the configured webhook, or to the log when none is set.
pub fn sender_from_config(config: &AppConfig) -> Arc<dyn NotificationSender> {
    if let Some(url) = config.notification_webhook_url.as_deref().filter(|url| !url.is_empty()) {
        match WebhookNotificationSender::new(url, Duration::from_secs(10)) {
            Ok(sender) => {
                info!("Delivering notifications to webhook {}", url);
                return Arc::new(sender);
            }
            Err(e) => warn!("Webhook sender unavailable, logging notifications instead: {}", e),
        }
    }

    Arc::new(LogNotificationSender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::{NotificationKind, Recipient, RecipientKind};

    fn job() -> NotificationJob {
        NotificationJob::new(
            NotificationKind::AppointmentReminder,
            9,
            Recipient {
                kind: RecipientKind::Patient,
                id: 3,
                email: Some("p@example.com".to_string()),
            },
            "Reminder".to_string(),
            "See you tomorrow".to_string(),
            3,
        )
    }

    #[tokio::test]
    async fn test_webhook_posts_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/notify"))
            .and(body_partial_json(json!({
                "kind": "appointment_reminder",
                "appointment_id": 9,
                "subject": "Reminder"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let sender = WebhookNotificationSender::new(
            &format!("{}/hooks/notify", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        sender.send(&job()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let sender = WebhookNotificationSender::new(&server.uri(), Duration::from_secs(5)).unwrap();

        assert_matches!(
            sender.send(&job()).await,
            Err(NotificationError::DeliveryError(msg)) if msg.contains("503")
        );
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        assert!(LogNotificationSender.send(&job()).await.is_ok());
    }
}
