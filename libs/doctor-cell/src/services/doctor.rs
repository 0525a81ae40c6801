use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use performance_cell::{cache_key, CacheService};
use shared_database::{CrudRepository, DbError, Filters, SupabaseClient};
use shared_models::pagination::Pagination;
use shared_utils::validation::{normalize_email, require_non_empty};

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, DoctorSearchQuery, UpdateDoctorRequest};

const LIST_NAMESPACE: &str = "doctors:list";

fn doctor_key(doctor_id: i64) -> String {
    format!("doctor:{}", doctor_id)
}

fn validation(err: impl ToString) -> DoctorError {
    DoctorError::ValidationError(err.to_string())
}

fn conflict_or_db(err: DbError) -> DoctorError {
    match err {
        DbError::Conflict(_) => DoctorError::AlreadyExists,
        other => DoctorError::Database(other),
    }
}

pub struct DoctorService {
    doctors: CrudRepository<Doctor>,
    cache: Arc<CacheService>,
}

impl DoctorService {
    pub fn new(db: Arc<SupabaseClient>, cache: Arc<CacheService>) -> Self {
        Self {
            doctors: CrudRepository::new(db),
            cache,
        }
    }

    pub async fn create_doctor(&self, mut request: CreateDoctorRequest) -> Result<Doctor, DoctorError> {
        require_non_empty("first_name", &request.first_name).map_err(validation)?;
        require_non_empty("last_name", &request.last_name).map_err(validation)?;
        require_non_empty("specialty", &request.specialty).map_err(validation)?;
        require_non_empty("license_number", &request.license_number).map_err(validation)?;
        request.email = normalize_email(&request.email).map_err(validation)?;
        request.license_number = request.license_number.trim().to_string();

        if request.years_experience.is_some_and(|years| years < 0) {
            return Err(validation("years_experience must not be negative"));
        }

        debug!("Creating doctor profile for: {}", request.email);

        if self.doctors.exists(&Filters::new().eq("email", &request.email)).await?
            || self
                .doctors
                .exists(&Filters::new().eq("license_number", &request.license_number))
                .await?
        {
            return Err(DoctorError::AlreadyExists);
        }

        let doctor = self.doctors.create(&request).await.map_err(conflict_or_db)?;

        self.cache.invalidate_prefix(LIST_NAMESPACE).await;
        info!("Doctor {} created", doctor.id);
        Ok(doctor)
    }

    pub async fn get_doctor(&self, doctor_id: i64) -> Result<Doctor, DoctorError> {
        let key = doctor_key(doctor_id);
        if let Some(doctor) = self.cache.get_json::<Doctor>(&key).await {
            return Ok(doctor);
        }

        let doctor = self
            .doctors
            .get(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)?;

        self.cache.set_json(&key, &doctor).await;
        Ok(doctor)
    }

    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Option<Doctor>, DoctorError> {
        Ok(self
            .doctors
            .find_one(&Filters::new().eq("user_id", user_id))
            .await?)
    }

    pub async fn list_doctors(&self, query: DoctorSearchQuery) -> Result<Vec<Doctor>, DoctorError> {
        let pagination = Pagination::new(query.limit, query.offset);
        let specialty = query
            .specialty
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let key = cache_key(
            LIST_NAMESPACE,
            &[
                ("specialty", specialty.unwrap_or_default().to_lowercase()),
                ("available", query.available.map(|a| a.to_string()).unwrap_or_default()),
                ("limit", pagination.limit.to_string()),
                ("offset", pagination.offset.to_string()),
            ],
        );
        if let Some(doctors) = self.cache.get_json::<Vec<Doctor>>(&key).await {
            debug!("Doctor list served from cache");
            return Ok(doctors);
        }

        let mut filters = Filters::new();
        if let Some(specialty) = specialty {
            filters = filters.ilike("specialty", specialty);
        }
        if let Some(available) = query.available {
            filters = filters.eq("is_available", available);
        }
        let filters = filters.order_by("last_name", true);

        let doctors = self.doctors.list(&filters, pagination).await?;
        self.cache.set_json(&key, &doctors).await;
        Ok(doctors)
    }

    pub async fn update_doctor(&self, doctor_id: i64, request: UpdateDoctorRequest) -> Result<Doctor, DoctorError> {
        if let Some(first_name) = &request.first_name {
            require_non_empty("first_name", first_name).map_err(validation)?;
        }
        if let Some(last_name) = &request.last_name {
            require_non_empty("last_name", last_name).map_err(validation)?;
        }
        if let Some(specialty) = &request.specialty {
            require_non_empty("specialty", specialty).map_err(validation)?;
        }
        if request.years_experience.is_some_and(|years| years < 0) {
            return Err(validation("years_experience must not be negative"));
        }

        let changes = match serde_json::to_value(&request) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if changes.is_empty() {
            return Err(validation("No fields to update"));
        }

        let doctor = self
            .doctors
            .update(doctor_id, changes)
            .await
            .map_err(conflict_or_db)?
            .ok_or(DoctorError::NotFound)?;

        self.invalidate(doctor_id).await;
        info!("Doctor {} updated", doctor_id);
        Ok(doctor)
    }

    pub async fn delete_doctor(&self, doctor_id: i64) -> Result<(), DoctorError> {
        if !self.doctors.delete(doctor_id).await? {
            return Err(DoctorError::NotFound);
        }

        self.invalidate(doctor_id).await;
        info!("Doctor {} deleted", doctor_id);
        Ok(())
    }

    async fn invalidate(&self, doctor_id: i64) {
        self.cache.invalidate(&doctor_key(doctor_id)).await;
        self.cache.invalidate_prefix(LIST_NAMESPACE).await;
    }
}
