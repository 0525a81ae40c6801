use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::{CrudRepository, DbError, Filters, SupabaseClient};
use shared_models::auth::{Role, User};
use shared_utils::jwt::issue_token;
use shared_utils::validation::normalize_email;

use crate::models::{AuthError, LoginRequest, LoginResponse, NewUserAccount, RegisterRequest, UserAccount};
use crate::services::password::{hash_password, password_issues, verify_against_dummy, verify_password};

pub struct AuthService {
    users: CrudRepository<UserAccount>,
    config: Arc<AppConfig>,
}

impl AuthService {
    pub fn new(config: Arc<AppConfig>, db: Arc<SupabaseClient>) -> Self {
        Self {
            users: CrudRepository::new(db),
            config,
        }
    }

    /// Creates an account. Anyone may register a patient; other roles need an
    /// admin caller.
    pub async fn register(
        &self,
        request: RegisterRequest,
        caller: Option<&User>,
    ) -> Result<UserAccount, AuthError> {
        let role = request.role.unwrap_or(Role::Patient);
        if role != Role::Patient && !caller.is_some_and(User::is_admin) {
            return Err(AuthError::RoleNotPermitted(role));
        }

        let email = normalize_email(&request.email).map_err(|e| AuthError::InvalidInput(e.to_string()))?;
        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(AuthError::InvalidInput("full_name must not be empty".to_string()));
        }

        let issues = password_issues(&request.password);
        if !issues.is_empty() {
            return Err(AuthError::WeakPassword(issues));
        }

        if self.users.exists(&Filters::new().eq("email", &email)).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash =
            hash_password(&request.password).map_err(|e| AuthError::Hashing(e.to_string()))?;

        let account = self
            .users
            .create(&NewUserAccount {
                email: &email,
                password_hash: &password_hash,
                full_name,
                role,
                is_active: true,
            })
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => AuthError::EmailTaken,
                other => AuthError::Database(other),
            })?;

        info!("Registered {} account {}", account.role, account.id);
        Ok(account)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        debug!("Login attempt for {}", email);

        let Some(account) = self.users.find_one(&Filters::new().eq("email", &email)).await? else {
            verify_against_dummy(&request.password);
            return Err(AuthError::InvalidCredentials);
        };

        let password_ok = verify_password(&request.password, &account.password_hash).unwrap_or_else(|e| {
            warn!("Stored password hash for user {} is unreadable: {}", account.id, e);
            false
        });
        if !password_ok {
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let expires_in = Duration::minutes(self.config.jwt_expiry_minutes);
        let access_token = issue_token(
            account.id,
            Some(&account.email),
            account.role,
            &self.config.jwt_secret,
            expires_in,
        )
        .map_err(AuthError::TokenIssue)?;

        info!("User {} logged in", account.id);
        Ok(LoginResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: expires_in.num_seconds(),
            user: account,
        })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<UserAccount, AuthError> {
        self.users.get(user_id).await?.ok_or(AuthError::UserNotFound)
    }
}
