use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    Extension,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::bearer_token;
use shared_utils::jwt::validate_token as decode_token;

use crate::models::{LoginRequest, LoginResponse, RegisterRequest, UserAccount};
use crate::services::AuthService;

pub struct AuthState {
    pub config: Arc<AppConfig>,
    pub service: AuthService,
}

pub async fn register(
    State(state): State<Arc<AuthState>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserAccount>), AppError> {
    // A bearer token is optional here, but when present it has to be valid.
    let caller = match auth {
        Some(TypedHeader(Authorization(bearer))) => {
            Some(decode_token(bearer.token(), &state.config.jwt_secret).map_err(AppError::Auth)?)
        }
        None => None,
    };

    let account = state.service.register(request, caller.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn login(
    State(state): State<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = state.service.login(request).await?;
    Ok(Json(response))
}

pub async fn validate_token(
    State(state): State<Arc<AuthState>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let TypedHeader(Authorization(bearer)) =
        auth.ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;
    let user = decode_token(bearer.token(), &state.config.jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id,
        email: user.email,
        role: user.role,
    }))
}

pub async fn verify_token(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
) -> Json<Value> {
    debug!("Verifying token");

    let valid = bearer_token(&headers)
        .ok()
        .is_some_and(|token| decode_token(token, &state.config.jwt_secret).is_ok());

    Json(json!({ "valid": valid }))
}

pub async fn get_me(
    State(state): State<Arc<AuthState>>,
    Extension(user): Extension<User>,
) -> Result<Json<UserAccount>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let account = state.service.get_user(user.id).await?;
    Ok(Json(account))
}
