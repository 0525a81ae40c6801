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

use crate::models::{CreatePatientRequest, Patient, PatientSearchQuery, UpdatePatientRequest};
use crate::services::PatientService;

pub struct PatientState {
    pub service: PatientService,
}

/// Staff see every patient; a patient only sees the record linked to them.
pub fn ensure_patient_access(user: &User, patient: &Patient) -> Result<(), AppError> {
    if user.has_any_role(&[Role::Admin, Role::Doctor]) || patient.is_owned_by(user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("You may only access your own patient record".to_string()))
    }
}

pub async fn create_patient(
    State(state): State<Arc<PatientState>>,
    Extension(user): Extension<User>,
    Json(mut request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    if user.is_patient() {
        request.user_id = Some(user.id);
    }

    let patient = state.service.create_patient(request).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn list_patients(
    State(state): State<Arc<PatientState>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[Role::Admin, Role::Doctor])?;

    let patients = state.service.list_patients(query).await?;

    Ok(Json(json!({
        "total": patients.len(),
        "patients": patients,
    })))
}

pub async fn get_patient(
    State(state): State<Arc<PatientState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Patient>, AppError> {
    let patient = state.service.get_patient(patient_id).await?;
    ensure_patient_access(&user, &patient)?;
    Ok(Json(patient))
}

pub async fn update_patient(
    State(state): State<Arc<PatientState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Patient>, AppError> {
    let existing = state.service.get_patient(patient_id).await?;
    ensure_patient_access(&user, &existing)?;

    let patient = state.service.update_patient(patient_id, request).await?;
    Ok(Json(patient))
}

pub async fn delete_patient(
    State(state): State<Arc<PatientState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_role(&user, &[Role::Admin])?;

    state.service.delete_patient(patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
