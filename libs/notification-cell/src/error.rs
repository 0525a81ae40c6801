use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Notification job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid job status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    DeliveryError(String),

    #[error("Delivery timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::JobNotFound(id) => {
                AppError::NotFound(format!("Notification job {} not found", id))
            }
            NotificationError::InvalidStatusTransition { .. } => AppError::Conflict(err.to_string()),
            NotificationError::DeliveryError(_) | NotificationError::Timeout { .. } => {
                AppError::ExternalService(err.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
