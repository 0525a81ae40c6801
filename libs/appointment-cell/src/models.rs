use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use doctor_cell::DoctorError;
use patient_cell::PatientError;
use shared_database::{DbError, Entity};
use shared_models::error::AppError;

pub const MIN_DURATION_MINUTES: i32 = 5;
pub const MAX_DURATION_MINUTES: i32 = 240;
pub const DEFAULT_DURATION_MINUTES: i32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    #[serde(deserialize_with = "flexible_datetime")]
    pub date: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Appointment {
    const TABLE: &'static str = "appointments";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Appointment {
    /// None when the end falls outside the representable range.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        slot_end(self.date, self.duration_minutes)
    }

    /// True when this appointment blocks the doctor during `[start, end)`.
    pub fn blocks(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let own_end = self.end_time().unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.status.is_active() && intervals_overlap(self.date, own_end, start, end)
    }
}

pub fn slot_end(start: DateTime<Utc>, duration_minutes: i32) -> Option<DateTime<Utc>> {
    start.checked_add_signed(Duration::minutes(i64::from(duration_minutes)))
}

fn default_duration() -> i32 {
    DEFAULT_DURATION_MINUTES
}

/// Half-open interval overlap: touching endpoints do not collide.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 2] = [AppointmentStatus::Scheduled, AppointmentStatus::Confirmed];

    /// Scheduled and confirmed appointments hold the doctor's time.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    pub fn valid_transitions(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Accepts RFC 3339 or a naive ISO timestamp, reading the latter as UTC.
pub fn parse_flexible_datetime(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("Invalid date '{}': expected an ISO 8601 timestamp", input))
}

fn flexible_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flexible_datetime(&raw).map_err(serde::de::Error::custom)
}

fn optional_flexible_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => parse_flexible_datetime(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: i64,
    pub doctor_id: i64,
    #[serde(deserialize_with = "flexible_datetime")]
    pub date: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Row written on booking.
#[derive(Debug, Serialize)]
pub(crate) struct NewAppointment<'a> {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: Option<&'a str>,
    pub status: AppointmentStatus,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    #[serde(default, deserialize_with = "optional_flexible_datetime")]
    pub date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl UpdateAppointmentRequest {
    /// Patients may reschedule, edit the reason or cancel. Nothing else.
    pub fn is_patient_permitted(&self) -> bool {
        self.notes.is_none()
            && self
                .status
                .map_or(true, |status| status == AppointmentStatus::Cancelled)
    }

    pub fn changes_schedule(&self) -> bool {
        self.date.is_some() || self.duration_minutes.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQuery {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    #[serde(default, deserialize_with = "optional_flexible_datetime")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_flexible_datetime")]
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not accepting appointments")]
    DoctorUnavailable,

    #[error("Doctor already has an appointment at this time")]
    SlotTaken,

    #[error("Appointment date must be in the future")]
    DateInPast,

    #[error("Duration must be between 5 and 240 minutes")]
    InvalidDuration,

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment is {0} and can no longer be rescheduled")]
    Closed(AppointmentStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<PatientError> for AppointmentError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => AppointmentError::PatientNotFound,
            PatientError::Database(db) => AppointmentError::Database(db),
            other => AppointmentError::ValidationError(other.to_string()),
        }
    }
}

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppointmentError::DoctorNotFound,
            DoctorError::Database(db) => AppointmentError::Database(db),
            other => AppointmentError::ValidationError(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::DoctorUnavailable
            | AppointmentError::SlotTaken
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::Closed(_) => AppError::Conflict(err.to_string()),
            AppointmentError::DateInPast | AppointmentError::InvalidDuration => {
                AppError::ValidationError(err.to_string())
            }
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 12, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_status_transitions() {
        use AppointmentStatus::*;

        assert!(Scheduled.can_transition_to(Confirmed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(NoShow));
        assert!(!Confirmed.can_transition_to(Scheduled));
        assert!(!Scheduled.can_transition_to(Scheduled));

        for terminal in [Completed, Cancelled, NoShow] {
            assert!(terminal.is_terminal());
            assert!(!terminal.is_active());
            assert!(!terminal.can_transition_to(Scheduled));
        }
        assert!(Scheduled.is_active() && Confirmed.is_active());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&AppointmentStatus::NoShow).unwrap(), "\"no_show\"");
        assert_eq!(AppointmentStatus::NoShow.to_string(), "no_show");
        let parsed: AppointmentStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(parsed, AppointmentStatus::Confirmed);
    }

    #[test]
    fn test_intervals_overlap() {
        assert!(intervals_overlap(at(10, 0), at(10, 30), at(10, 15), at(10, 45)));
        assert!(intervals_overlap(at(10, 0), at(11, 0), at(10, 15), at(10, 30)));
        assert!(!intervals_overlap(at(10, 0), at(10, 30), at(10, 30), at(11, 0)));
        assert!(!intervals_overlap(at(9, 0), at(9, 30), at(10, 0), at(10, 30)));
    }

    #[test]
    fn test_slot_end_out_of_range() {
        assert_eq!(slot_end(at(10, 0), 30), Some(at(10, 30)));

        let far = parse_flexible_datetime("+262142-12-31T23:00:00").unwrap();
        assert_eq!(slot_end(far, 240), None);
    }

    #[test]
    fn test_flexible_dates() {
        let expected = at(10, 0);

        assert_eq!(parse_flexible_datetime("2030-12-01T10:00:00Z").unwrap(), expected);
        assert_eq!(parse_flexible_datetime("2030-12-01T10:00:00").unwrap(), expected);
        assert_eq!(parse_flexible_datetime("2030-12-01T10:00").unwrap(), expected);
        assert_eq!(parse_flexible_datetime("2030-12-01T12:00:00+02:00").unwrap(), expected);
        assert!(parse_flexible_datetime("next tuesday").is_err());
    }

    #[test]
    fn test_create_request_accepts_naive_date() {
        let request: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "patient_id": 1,
            "doctor_id": 2,
            "date": "2030-12-01T10:00:00",
            "reason": "Check-up"
        }))
        .unwrap();

        assert_eq!(request.date, at(10, 0));
        assert_eq!(request.duration_minutes, None);
    }

    #[test]
    fn test_blocks_ignores_inactive_appointments() {
        let mut appointment: Appointment = serde_json::from_value(serde_json::json!({
            "id": 1,
            "patient_id": 1,
            "doctor_id": 2,
            "date": "2030-12-01T10:00:00+00:00",
            "reason": null,
            "status": "scheduled",
            "notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(appointment.duration_minutes, DEFAULT_DURATION_MINUTES);
        assert!(appointment.blocks(at(10, 15), at(10, 45)));

        appointment.status = AppointmentStatus::Cancelled;
        assert!(!appointment.blocks(at(10, 15), at(10, 45)));
    }

    #[test]
    fn test_patient_permitted_changes() {
        let reschedule = UpdateAppointmentRequest {
            date: Some(at(11, 0)),
            ..Default::default()
        };
        assert!(reschedule.is_patient_permitted());

        let cancel = UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        };
        assert!(cancel.is_patient_permitted());

        let confirm = UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        };
        assert!(!confirm.is_patient_permitted());

        let notes = UpdateAppointmentRequest {
            notes: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!notes.is_patient_permitted());
    }
}
