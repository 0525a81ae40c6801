use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::services::queue::NotificationQueue;
use crate::{AppointmentEvent, NotificationError, NotificationJob, NotificationKind, Recipient, RecipientKind};

pub struct NotificationProducer {
    queue: Arc<dyn NotificationQueue>,
    max_attempts: u32,
}

impl NotificationProducer {
    pub fn new(queue: Arc<dyn NotificationQueue>, max_attempts: u32) -> Self {
        Self { queue, max_attempts }
    }

    /// Enqueues one job for the patient and one for the doctor.
    pub async fn notify_appointment(
        &self,
        kind: NotificationKind,
        event: &AppointmentEvent,
    ) -> Result<Vec<Uuid>, NotificationError> {
        let recipients = [
            Recipient {
                kind: RecipientKind::Patient,
                id: event.patient_id,
                email: event.patient_email.clone(),
            },
            Recipient {
                kind: RecipientKind::Doctor,
                id: event.doctor_id,
                email: event.doctor_email.clone(),
            },
        ];

        let mut job_ids = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let job = NotificationJob::new(
                kind,
                event.appointment_id,
                recipient,
                render_subject(kind, event),
                render_body(kind, event),
                self.max_attempts,
            );
            job_ids.push(job.id);
            self.queue.enqueue(job).await?;
        }

        info!(
            "Queued {} {:?} notifications for appointment {}",
            job_ids.len(),
            kind,
            event.appointment_id
        );
        Ok(job_ids)
    }
}

pub fn render_subject(kind: NotificationKind, event: &AppointmentEvent) -> String {
    let when = event.date.format("%Y-%m-%d %H:%M UTC");
    match kind {
        NotificationKind::AppointmentCreated => format!("Appointment booked for {}", when),
        NotificationKind::AppointmentRescheduled => format!("Appointment moved to {}", when),
        NotificationKind::AppointmentCancelled => format!("Appointment on {} cancelled", when),
        NotificationKind::AppointmentStatusChanged => {
            format!("Appointment on {} is now {}", when, event.status)
        }
        NotificationKind::AppointmentReminder => format!("Reminder: appointment on {}", when),
    }
}

pub fn render_body(kind: NotificationKind, event: &AppointmentEvent) -> String {
    let mut body = format!(
        "Appointment #{} on {} ({} minutes) with status {}.",
        event.appointment_id,
        event.date.to_rfc3339(),
        event.duration_minutes,
        event.status
    );

    match (event.patient_name.as_deref(), event.doctor_name.as_deref()) {
        (Some(patient), Some(doctor)) => body.push_str(&format!(" Patient: {}. Doctor: {}.", patient, doctor)),
        (Some(patient), None) => body.push_str(&format!(" Patient: {}.", patient)),
        (None, Some(doctor)) => body.push_str(&format!(" Doctor: {}.", doctor)),
        (None, None) => {}
    }

    if let Some(reason) = event.reason.as_deref().filter(|r| !r.is_empty()) {
        body.push_str(&format!(" Reason: {}.", reason));
    }

    if kind == NotificationKind::AppointmentCancelled {
        body.push_str(" Please book a new appointment if you still need to be seen.");
    }

    body
}
