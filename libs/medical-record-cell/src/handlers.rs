use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use patient_cell::handlers::ensure_patient_access;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    CreateMedicalRecordRequest, MedicalRecord, MedicalRecordError, MedicalRecordQuery, UpdateMedicalRecordRequest,
};
use crate::services::MedicalRecordService;

pub struct MedicalRecordState {
    pub service: MedicalRecordService,
}

const STAFF: &[Role] = &[Role::Admin, Role::Doctor];

pub async fn create_record(
    State(state): State<Arc<MedicalRecordState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateMedicalRecordRequest>,
) -> Result<(StatusCode, Json<MedicalRecord>), AppError> {
    require_role(&user, STAFF)?;

    let record = state.service.create_record(request, &user).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_records(
    State(state): State<Arc<MedicalRecordState>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<MedicalRecordQuery>,
) -> Result<Json<Value>, AppError> {
    if user.is_patient() {
        let own = state
            .service
            .patients()
            .find_by_user_id(user.id)
            .await
            .map_err(MedicalRecordError::from)?;
        match own {
            Some(patient) => query.patient_id = Some(patient.id),
            None => return Ok(Json(json!({"total": 0, "records": []}))),
        }
    }

    let records = state.service.list_records(query).await?;

    Ok(Json(json!({
        "total": records.len(),
        "records": records,
    })))
}

pub async fn get_record(
    State(state): State<Arc<MedicalRecordState>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<i64>,
) -> Result<Json<MedicalRecord>, AppError> {
    let record = state.service.get_record(record_id).await?;

    if user.is_patient() {
        let patient = state
            .service
            .patients()
            .get_patient(record.patient_id)
            .await
            .map_err(MedicalRecordError::from)?;
        ensure_patient_access(&user, &patient)?;
    }

    Ok(Json(record))
}

pub async fn update_record(
    State(state): State<Arc<MedicalRecordState>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<i64>,
    Json(request): Json<UpdateMedicalRecordRequest>,
) -> Result<Json<MedicalRecord>, AppError> {
    require_role(&user, STAFF)?;

    let record = state.service.update_record(record_id, request).await?;
    Ok(Json(record))
}

pub async fn delete_record(
    State(state): State<Arc<MedicalRecordState>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_role(&user, &[Role::Admin])?;

    state.service.delete_record(record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
