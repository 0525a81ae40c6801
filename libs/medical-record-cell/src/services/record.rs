use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};

use doctor_cell::DoctorService;
use patient_cell::PatientService;
use performance_cell::CacheService;
use shared_database::{CrudRepository, Filters, SupabaseClient};
use shared_models::auth::User;
use shared_models::pagination::Pagination;
use shared_utils::validation::require_non_empty;

use crate::models::{
    CreateMedicalRecordRequest, MedicalRecord, MedicalRecordError, MedicalRecordQuery, UpdateMedicalRecordRequest,
};

fn validation(err: impl ToString) -> MedicalRecordError {
    MedicalRecordError::ValidationError(err.to_string())
}

pub struct MedicalRecordService {
    records: CrudRepository<MedicalRecord>,
    patients: PatientService,
    doctors: DoctorService,
}

impl MedicalRecordService {
    pub fn new(db: Arc<SupabaseClient>, cache: Arc<CacheService>) -> Self {
        Self {
            records: CrudRepository::new(Arc::clone(&db)),
            patients: PatientService::new(Arc::clone(&db), Arc::clone(&cache)),
            doctors: DoctorService::new(db, cache),
        }
    }

    pub fn patients(&self) -> &PatientService {
        &self.patients
    }

    /// Records written by a doctor are attributed to that doctor's profile
    /// unless the request names one.
    pub async fn create_record(
        &self,
        mut request: CreateMedicalRecordRequest,
        author: &User,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        require_non_empty("diagnosis", &request.diagnosis).map_err(validation)?;

        self.patients.get_patient(request.patient_id).await?;

        match request.doctor_id {
            Some(doctor_id) => {
                self.doctors.get_doctor(doctor_id).await?;
            }
            None if author.is_doctor() => {
                request.doctor_id = self.doctors.find_by_user_id(author.id).await?.map(|d| d.id);
                if request.doctor_id.is_none() {
                    debug!("User {} has no doctor profile; record left unattributed", author.id);
                }
            }
            None => {}
        }

        request.record_date.get_or_insert_with(Utc::now);

        let record = self.records.create(&request).await?;
        info!("Medical record {} created for patient {}", record.id, record.patient_id);
        Ok(record)
    }

    pub async fn get_record(&self, record_id: i64) -> Result<MedicalRecord, MedicalRecordError> {
        self.records
            .get(record_id)
            .await?
            .ok_or(MedicalRecordError::NotFound)
    }

    pub async fn list_records(&self, query: MedicalRecordQuery) -> Result<Vec<MedicalRecord>, MedicalRecordError> {
        let mut filters = Filters::new();

        if let Some(patient_id) = query.patient_id {
            filters = filters.eq("patient_id", patient_id);
        }
        if let Some(doctor_id) = query.doctor_id {
            filters = filters.eq("doctor_id", doctor_id);
        }

        let filters = filters.order_by("record_date", false);
        let pagination = Pagination::new(query.limit, query.offset);

        Ok(self.records.list(&filters, pagination).await?)
    }

    pub async fn update_record(
        &self,
        record_id: i64,
        request: UpdateMedicalRecordRequest,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        if let Some(diagnosis) = &request.diagnosis {
            require_non_empty("diagnosis", diagnosis).map_err(validation)?;
        }

        let changes = match serde_json::to_value(&request) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if changes.is_empty() {
            return Err(validation("No fields to update"));
        }

        let record = self
            .records
            .update(record_id, changes)
            .await?
            .ok_or(MedicalRecordError::NotFound)?;

        info!("Medical record {} updated", record_id);
        Ok(record)
    }

    pub async fn delete_record(&self, record_id: i64) -> Result<(), MedicalRecordError> {
        if !self.records.delete(record_id).await? {
            return Err(MedicalRecordError::NotFound);
        }

        info!("Medical record {} deleted", record_id);
        Ok(())
    }
}
