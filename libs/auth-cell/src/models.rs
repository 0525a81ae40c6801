use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shared_database::{DbError, Entity};
use shared_models::auth::Role;
use shared_models::error::AppError;

/// A stored login account. The password hash is never serialized out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Entity for UserAccount {
    const TABLE: &'static str = "users";

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NewUserAccount<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserAccount,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Password does not meet requirements: {}", .0.join("; "))]
    WeakPassword(Vec<String>),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Only administrators may create {0} accounts")]
    RoleNotPermitted(Role),

    #[error("User not found")]
    UserNotFound,

    #[error("Failed to issue token: {0}")]
    TokenIssue(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(_) | AuthError::WeakPassword(_) => {
                AppError::ValidationError(err.to_string())
            }
            AuthError::EmailTaken => AppError::Conflict(err.to_string()),
            AuthError::InvalidCredentials => AppError::Auth(err.to_string()),
            AuthError::AccountDisabled | AuthError::RoleNotPermitted(_) => {
                AppError::Forbidden(err.to_string())
            }
            AuthError::UserNotFound => AppError::NotFound(err.to_string()),
            AuthError::TokenIssue(_) | AuthError::Hashing(_) => AppError::Internal(err.to_string()),
            AuthError::Database(db) => db.into(),
        }
    }
}
