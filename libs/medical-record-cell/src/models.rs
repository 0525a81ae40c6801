use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use doctor_cell::DoctorError;
use patient_cell::PatientError;
use shared_database::{DbError, Entity};
use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicalRecord {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub appointment_id: Option<i64>,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub record_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for MedicalRecord {
    const TABLE: &'static str = "medical_records";

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMedicalRecordRequest {
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub appointment_id: Option<i64>,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub record_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMedicalRecordRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicalRecordQuery {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum MedicalRecordError {
    #[error("Medical record not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<PatientError> for MedicalRecordError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => MedicalRecordError::PatientNotFound,
            PatientError::Database(db) => MedicalRecordError::Database(db),
            other => MedicalRecordError::ValidationError(other.to_string()),
        }
    }
}

impl From<DoctorError> for MedicalRecordError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => MedicalRecordError::DoctorNotFound,
            DoctorError::Database(db) => MedicalRecordError::Database(db),
            other => MedicalRecordError::ValidationError(other.to_string()),
        }
    }
}

impl From<MedicalRecordError> for AppError {
    fn from(err: MedicalRecordError) -> Self {
        match err {
            MedicalRecordError::NotFound
            | MedicalRecordError::PatientNotFound
            | MedicalRecordError::DoctorNotFound => AppError::NotFound(err.to_string()),
            MedicalRecordError::ValidationError(msg) => AppError::ValidationError(msg),
            MedicalRecordError::Database(db) => db.into(),
        }
    }
}
