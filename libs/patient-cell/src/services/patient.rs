use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};

use performance_cell::CacheService;
use shared_database::{CrudRepository, DbError, Filters, SupabaseClient};
use shared_models::pagination::Pagination;
use shared_utils::validation::{normalize_email, require_non_empty};

use crate::models::{CreatePatientRequest, Patient, PatientError, PatientSearchQuery, UpdatePatientRequest};

fn cache_key(patient_id: i64) -> String {
    format!("patient:{}", patient_id)
}

fn validation(err: impl ToString) -> PatientError {
    PatientError::ValidationError(err.to_string())
}

pub struct PatientService {
    patients: CrudRepository<Patient>,
    cache: Arc<CacheService>,
}

impl PatientService {
    pub fn new(db: Arc<SupabaseClient>, cache: Arc<CacheService>) -> Self {
        Self {
            patients: CrudRepository::new(db),
            cache,
        }
    }

    pub async fn create_patient(&self, mut request: CreatePatientRequest) -> Result<Patient, PatientError> {
        require_non_empty("first_name", &request.first_name).map_err(validation)?;
        require_non_empty("last_name", &request.last_name).map_err(validation)?;
        request.email = normalize_email(&request.email).map_err(validation)?;

        if request.date_of_birth > Utc::now().date_naive() {
            return Err(PatientError::InvalidDateOfBirth);
        }

        debug!("Creating new patient profile for: {}", request.email);

        if self.patients.exists(&Filters::new().eq("email", &request.email)).await? {
            return Err(PatientError::EmailAlreadyExists { email: request.email });
        }

        let patient = self.patients.create(&request).await.map_err(|e| match e {
            DbError::Conflict(_) => PatientError::EmailAlreadyExists {
                email: request.email.clone(),
            },
            other => PatientError::Database(other),
        })?;

        info!("Patient {} created", patient.id);
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: i64) -> Result<Patient, PatientError> {
        let key = cache_key(patient_id);
        if let Some(patient) = self.cache.get_json::<Patient>(&key).await {
            return Ok(patient);
        }

        let patient = self
            .patients
            .get(patient_id)
            .await?
            .ok_or(PatientError::NotFound)?;

        self.cache.set_json(&key, &patient).await;
        Ok(patient)
    }

    /// The patient record linked to a login account, if any.
    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Option<Patient>, PatientError> {
        Ok(self
            .patients
            .find_one(&Filters::new().eq("user_id", user_id))
            .await?)
    }

    pub async fn list_patients(&self, query: PatientSearchQuery) -> Result<Vec<Patient>, PatientError> {
        let mut filters = Filters::new();

        if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            filters = filters.any_ilike(&["first_name", "last_name"], name);
        }
        if let Some(email) = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            filters = filters.ilike("email", email);
        }

        let filters = filters.order_by("last_name", true);
        let pagination = Pagination::new(query.limit, query.offset);

        Ok(self.patients.list(&filters, pagination).await?)
    }

    pub async fn update_patient(
        &self,
        patient_id: i64,
        mut request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        if let Some(first_name) = &request.first_name {
            require_non_empty("first_name", first_name).map_err(validation)?;
        }
        if let Some(last_name) = &request.last_name {
            require_non_empty("last_name", last_name).map_err(validation)?;
        }
        if let Some(email) = &request.email {
            request.email = Some(normalize_email(email).map_err(validation)?);
        }
        if request
            .date_of_birth
            .is_some_and(|dob| dob > Utc::now().date_naive())
        {
            return Err(PatientError::InvalidDateOfBirth);
        }

        let changes = match serde_json::to_value(&request) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if changes.is_empty() {
            return Err(PatientError::ValidationError("No fields to update".to_string()));
        }

        let email = request.email.clone();
        let patient = self
            .patients
            .update(patient_id, changes)
            .await
            .map_err(|e| match (e, email) {
                (DbError::Conflict(_), Some(email)) => PatientError::EmailAlreadyExists { email },
                (other, _) => PatientError::Database(other),
            })?
            .ok_or(PatientError::NotFound)?;

        self.cache.invalidate(&cache_key(patient_id)).await;
        info!("Patient {} updated", patient_id);
        Ok(patient)
    }

    pub async fn delete_patient(&self, patient_id: i64) -> Result<(), PatientError> {
        if !self.patients.delete(patient_id).await? {
            return Err(PatientError::NotFound);
        }

        self.cache.invalidate(&cache_key(patient_id)).await;
        info!("Patient {} deleted", patient_id);
        Ok(())
    }
}
