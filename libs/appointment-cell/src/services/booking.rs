use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Map};
use tracing::{debug, info, instrument, warn};

use doctor_cell::{Doctor, DoctorService};
use notification_cell::{AppointmentEvent, NotificationKind, NotificationProducer};
use patient_cell::{Patient, PatientService};
use performance_cell::CacheService;
use shared_database::{CrudRepository, Filters, SupabaseClient};
use shared_models::pagination::Pagination;

use crate::models::{
    slot_end, Appointment, AppointmentError, AppointmentQuery, AppointmentStatus,
    CreateAppointmentRequest, NewAppointment, UpdateAppointmentRequest, DEFAULT_DURATION_MINUTES,
    MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn validate_duration(minutes: i32) -> Result<i32, AppointmentError> {
    if (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(AppointmentError::InvalidDuration)
    }
}

fn validate_end(start: DateTime<Utc>, duration: i32) -> Result<DateTime<Utc>, AppointmentError> {
    slot_end(start, duration)
        .ok_or_else(|| AppointmentError::ValidationError("Appointment date is out of range".to_string()))
}

fn validate_start(date: DateTime<Utc>) -> Result<(), AppointmentError> {
    if date <= Utc::now() {
        return Err(AppointmentError::DateInPast);
    }
    Ok(())
}

pub struct BookingService {
    appointments: CrudRepository<Appointment>,
    patients: PatientService,
    doctors: DoctorService,
    notifications: NotificationProducer,
}

impl BookingService {
    pub fn new(db: Arc<SupabaseClient>, cache: Arc<CacheService>, notifications: NotificationProducer) -> Self {
        Self {
            appointments: CrudRepository::new(Arc::clone(&db)),
            patients: PatientService::new(Arc::clone(&db), Arc::clone(&cache)),
            doctors: DoctorService::new(db, cache),
            notifications,
        }
    }

    pub fn patients(&self) -> &PatientService {
        &self.patients
    }

    pub fn doctors(&self) -> &DoctorService {
        &self.doctors
    }

    /// Books an appointment after checking, in order: the date, the
    /// duration, the patient, the doctor and the doctor's calendar.
    #[instrument(skip(self, request), fields(patient_id = request.patient_id, doctor_id = request.doctor_id))]
    pub async fn create_appointment(&self, request: CreateAppointmentRequest) -> Result<Appointment, AppointmentError> {
        validate_start(request.date)?;
        let duration = validate_duration(request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES))?;
        validate_end(request.date, duration)?;

        let patient = self.patients.get_patient(request.patient_id).await?;
        let doctor = self.doctors.get_doctor(request.doctor_id).await?;
        if !doctor.is_available {
            return Err(AppointmentError::DoctorUnavailable);
        }

        self.ensure_slot_free(doctor.id, request.date, duration, None).await?;

        let appointment = self
            .appointments
            .create(&NewAppointment {
                patient_id: patient.id,
                doctor_id: doctor.id,
                date: request.date,
                duration_minutes: duration,
                reason: request.reason.as_deref(),
                status: AppointmentStatus::Scheduled,
                notes: request.notes.as_deref(),
            })
            .await?;

        info!(
            "Appointment {} booked for patient {} with doctor {} at {}",
            appointment.id, patient.id, doctor.id, appointment.date
        );

        self.notify(NotificationKind::AppointmentCreated, &appointment, Some(&patient), Some(&doctor))
            .await;
        Ok(appointment)
    }

    pub async fn get_appointment(&self, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(&self, query: AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filters = Filters::new();

        if let Some(patient_id) = query.patient_id {
            filters = filters.eq("patient_id", patient_id);
        }
        if let Some(doctor_id) = query.doctor_id {
            filters = filters.eq("doctor_id", doctor_id);
        }
        if let Some(status) = query.status {
            filters = filters.eq("status", status);
        }
        if let Some(from) = query.from {
            filters = filters.gte("date", timestamp(from));
        }
        if let Some(to) = query.to {
            filters = filters.lte("date", timestamp(to));
        }

        let filters = filters.order_by("date", true);
        let pagination = Pagination::new(query.limit, query.offset);

        Ok(self.appointments.list(&filters, pagination).await?)
    }

    /// Applies a partial update to `current`. Schedule changes re-run the
    /// booking checks against every other active appointment of the doctor.
    #[instrument(skip(self, current, request), fields(appointment_id = current.id))]
    pub async fn update_appointment(
        &self,
        current: &Appointment,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut changes = Map::new();
        let mut rescheduled = false;

        if request.changes_schedule() {
            if !current.status.is_active() {
                return Err(AppointmentError::Closed(current.status));
            }

            let start = request.date.unwrap_or(current.date);
            if request.date.is_some() {
                validate_start(start)?;
            }
            let duration = validate_duration(request.duration_minutes.unwrap_or(current.duration_minutes))?;

            if start != current.date || duration != current.duration_minutes {
                self.ensure_slot_free(current.doctor_id, start, duration, Some(current.id))
                    .await?;
                changes.insert("date".to_string(), json!(timestamp(start)));
                changes.insert("duration_minutes".to_string(), json!(duration));
                rescheduled = true;
            }
        }

        let mut new_status = None;
        if let Some(status) = request.status.filter(|status| *status != current.status) {
            if !current.status.can_transition_to(status) {
                return Err(AppointmentError::InvalidStatusTransition {
                    from: current.status,
                    to: status,
                });
            }
            changes.insert("status".to_string(), json!(status));
            new_status = Some(status);
        }

        if let Some(reason) = request.reason {
            changes.insert("reason".to_string(), json!(reason));
        }
        if let Some(notes) = request.notes {
            changes.insert("notes".to_string(), json!(notes));
        }

        if changes.is_empty() {
            return Err(AppointmentError::ValidationError("No changes to apply".to_string()));
        }

        let updated = self
            .appointments
            .update(current.id, changes)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} updated", updated.id);

        let mut kinds = Vec::new();
        if rescheduled {
            kinds.push(NotificationKind::AppointmentRescheduled);
        }
        match new_status {
            Some(AppointmentStatus::Cancelled) => kinds.push(NotificationKind::AppointmentCancelled),
            Some(_) => kinds.push(NotificationKind::AppointmentStatusChanged),
            None => {}
        }

        if !kinds.is_empty() {
            let patient = self.patients.get_patient(updated.patient_id).await.ok();
            let doctor = self.doctors.get_doctor(updated.doctor_id).await.ok();
            for kind in kinds {
                self.notify(kind, &updated, patient.as_ref(), doctor.as_ref()).await;
            }
        }

        Ok(updated)
    }

    pub async fn cancel_appointment(
        &self,
        current: &Appointment,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let notes = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .map(|reason| match &current.notes {
                Some(existing) if !existing.is_empty() => {
                    format!("{}\nCancellation reason: {}", existing, reason)
                }
                _ => format!("Cancellation reason: {}", reason),
            });

        self.update_appointment(
            current,
            UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Cancelled),
                notes,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_appointment(&self, appointment_id: i64) -> Result<(), AppointmentError> {
        if !self.appointments.delete(appointment_id).await? {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Fails with `SlotTaken` when another active appointment of the doctor
    /// overlaps `[start, start + duration)`.
    async fn ensure_slot_free(
        &self,
        doctor_id: i64,
        start: DateTime<Utc>,
        duration: i32,
        exclude: Option<i64>,
    ) -> Result<(), AppointmentError> {
        let end = validate_end(start, duration)?;
        let earliest = start
            .checked_sub_signed(Duration::minutes(i64::from(MAX_DURATION_MINUTES)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let filters = Filters::new()
            .eq("doctor_id", doctor_id)
            .in_list("status", &AppointmentStatus::ACTIVE)
            .gt("date", timestamp(earliest))
            .lt("date", timestamp(end))
            .order_by("date", true);

        let candidates = self
            .appointments
            .list(&filters, Pagination::new(Some(shared_models::pagination::MAX_LIMIT), None))
            .await?;

        let clash = candidates
            .iter()
            .filter(|existing| Some(existing.id) != exclude)
            .find(|existing| existing.blocks(start, end));

        if let Some(existing) = clash {
            debug!(
                "Doctor {} is busy: appointment {} overlaps {} - {}",
                doctor_id, existing.id, start, end
            );
            return Err(AppointmentError::SlotTaken);
        }

        Ok(())
    }

    /// Enqueues notifications. A queue failure never fails the request.
    async fn notify(
        &self,
        kind: NotificationKind,
        appointment: &Appointment,
        patient: Option<&Patient>,
        doctor: Option<&Doctor>,
    ) {
        let event = AppointmentEvent {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            patient_email: patient.map(|p| p.email.clone()),
            patient_name: patient.map(Patient::full_name),
            doctor_id: appointment.doctor_id,
            doctor_email: doctor.map(|d| d.email.clone()),
            doctor_name: doctor.map(Doctor::full_name),
            date: appointment.date,
            duration_minutes: appointment.duration_minutes,
            reason: appointment.reason.clone(),
            status: appointment.status.to_string(),
        };

        if let Err(e) = self.notifications.notify_appointment(kind, &event).await {
            warn!(
                "Failed to enqueue {:?} notifications for appointment {}: {}",
                kind, appointment.id, e
            );
        }
    }
}
