use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use doctor_cell::handlers::ensure_doctor_owner;
use notification_cell::NotificationProducer;
use patient_cell::handlers::ensure_patient_access;
use performance_cell::CacheService;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, CancelRequest, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::BookingService;

pub struct AppointmentState {
    pub service: BookingService,
}

impl AppointmentState {
    pub fn new(db: Arc<SupabaseClient>, cache: Arc<CacheService>, notifications: NotificationProducer) -> Arc<Self> {
        Arc::new(Self {
            service: BookingService::new(db, cache, notifications),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// An admin or the appointment's doctor.
    Staff,
    /// The appointment's patient.
    Patient,
}

async fn appointment_access(
    service: &BookingService,
    user: &User,
    appointment: &Appointment,
) -> Result<Access, AppError> {
    match user.role {
        Role::Admin => return Ok(Access::Staff),
        Role::Doctor => {
            let doctor = service
                .doctors()
                .get_doctor(appointment.doctor_id)
                .await
                .map_err(AppointmentError::from)?;
            if doctor.is_owned_by(user.id) {
                return Ok(Access::Staff);
            }
        }
        Role::Patient => {
            let patient = service
                .patients()
                .get_patient(appointment.patient_id)
                .await
                .map_err(AppointmentError::from)?;
            if patient.is_owned_by(user.id) {
                return Ok(Access::Patient);
            }
        }
    }

    Err(AppError::Forbidden("You do not have access to this appointment".to_string()))
}

fn list_response(appointments: Vec<Appointment>) -> Json<Value> {
    Json(json!({
        "total": appointments.len(),
        "appointments": appointments,
    }))
}

pub async fn create_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    if user.is_patient() {
        let patient = state
            .service
            .patients()
            .get_patient(request.patient_id)
            .await
            .map_err(AppointmentError::from)?;
        if !patient.is_owned_by(user.id) {
            return Err(AppError::Forbidden(
                "Patients may only book appointments for themselves".to_string(),
            ));
        }
    }

    let appointment = state.service.create_appointment(request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    if user.is_patient() {
        let own = state
            .service
            .patients()
            .find_by_user_id(user.id)
            .await
            .map_err(AppointmentError::from)?;
        match own {
            Some(patient) => query.patient_id = Some(patient.id),
            None => return Ok(list_response(Vec::new())),
        }
    }

    let appointments = state.service.list_appointments(query).await?;
    Ok(list_response(appointments))
}

pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = state.service.get_appointment(appointment_id).await?;
    appointment_access(&state.service, &user, &appointment).await?;
    Ok(Json(appointment))
}

pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let current = state.service.get_appointment(appointment_id).await?;

    let access = appointment_access(&state.service, &user, &current).await?;
    if access == Access::Patient && !request.is_patient_permitted() {
        return Err(AppError::Forbidden(
            "Patients may only reschedule, edit the reason or cancel".to_string(),
        ));
    }

    let appointment = state.service.update_appointment(&current, request).await?;
    Ok(Json(appointment))
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    request: Option<Json<CancelRequest>>,
) -> Result<Json<Appointment>, AppError> {
    let current = state.service.get_appointment(appointment_id).await?;
    appointment_access(&state.service, &user, &current).await?;

    let reason = request.and_then(|Json(body)| body.reason);
    let appointment = state.service.cancel_appointment(&current, reason).await?;
    Ok(Json(appointment))
}

pub async fn delete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_role(&user, &[Role::Admin])?;

    state.service.delete_appointment(appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_patient_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
    Query(mut query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    let patient = state
        .service
        .patients()
        .get_patient(patient_id)
        .await
        .map_err(AppointmentError::from)?;
    ensure_patient_access(&user, &patient)?;

    query.patient_id = Some(patient.id);
    let appointments = state.service.list_appointments(query).await?;
    Ok(list_response(appointments))
}

pub async fn list_doctor_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<i64>,
    Query(mut query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor = state
        .service
        .doctors()
        .get_doctor(doctor_id)
        .await
        .map_err(AppointmentError::from)?;
    ensure_doctor_owner(&user, &doctor)?;

    query.doctor_id = Some(doctor.id);
    let appointments = state.service.list_appointments(query).await?;
    Ok(list_response(appointments))
}
