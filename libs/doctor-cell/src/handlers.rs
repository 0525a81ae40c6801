use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{CreateDoctorRequest, Doctor, DoctorSearchQuery, UpdateDoctorRequest};
use crate::services::DoctorService;

pub struct DoctorState {
    pub service: DoctorService,
}

/// Admins manage every doctor; a doctor may manage only their own profile.
pub fn ensure_doctor_owner(user: &User, doctor: &Doctor) -> Result<(), AppError> {
    if user.is_admin() || (user.is_doctor() && doctor.is_owned_by(user.id)) {
        Ok(())
    } else {
        Err(AppError::Forbidden("You may only manage your own doctor profile".to_string()))
    }
}

pub async fn create_doctor(
    State(state): State<Arc<DoctorState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Doctor>), AppError> {
    require_role(&user, &[Role::Admin])?;

    let doctor = state.service.create_doctor(request).await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

pub async fn list_doctors(
    State(state): State<Arc<DoctorState>>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = state.service.list_doctors(query).await?;

    Ok(Json(json!({
        "total": doctors.len(),
        "doctors": doctors,
    })))
}

pub async fn get_doctor(
    State(state): State<Arc<DoctorState>>,
    Path(doctor_id): Path<i64>,
) -> Result<Json<Doctor>, AppError> {
    let doctor = state.service.get_doctor(doctor_id).await?;
    Ok(Json(doctor))
}

pub async fn update_doctor(
    State(state): State<Arc<DoctorState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<i64>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Doctor>, AppError> {
    let existing = state.service.get_doctor(doctor_id).await?;
    ensure_doctor_owner(&user, &existing)?;

    let doctor = state.service.update_doctor(doctor_id, request).await?;
    Ok(Json(doctor))
}

pub async fn delete_doctor(
    State(state): State<Arc<DoctorState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_role(&user, &[Role::Admin])?;

    state.service.delete_doctor(doctor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
