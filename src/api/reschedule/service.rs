use sqlx::{Pool, Postgres};
use tracing::info;

use super::dto::ReScheduleResponse;
use super::models::ReScheduleCreate;
use crate::api::error::ServiceError;
use crate::db::models::{ReScheduleLogRow, ReScheduleRow};
use crate::db::log_repository::LogRepository;
use crate::db::re_schedule_repository::ReScheduleRepository;
use crate::db::subject_repository::SubjectRepository;
use crate::engine::Engine;

/// Re-schedule service containing business logic
pub struct ReScheduleService {
    pool: Pool<Postgres>,
    engine: Engine,
}

impl ReScheduleService {
    pub fn new(pool: Pool<Postgres>, engine: Engine) -> Self {
        Self { pool, engine }
    }

    /// Create a re-schedule attempt in PENDING status. The scan loop
    /// admits it once its window opens.
    pub async fn create(
        &self,
        payload: &ReScheduleCreate,
    ) -> Result<ReScheduleResponse, ServiceError> {
        if payload.end_datetime <= payload.start_datetime {
            return Err(ServiceError::ValidationError(
                "end_datetime must be after start_datetime".to_string(),
            ));
        }

        let subject = SubjectRepository::get_with_credentials(&self.pool, payload.subject_id)
            .await?;
        if subject.is_none() {
            return Err(ServiceError::NotFound(format!(
                "Subject with id {} not found",
                payload.subject_id
            )));
        }

        let row = ReScheduleRepository::create(
            &self.pool,
            payload.subject_id,
            payload.start_datetime,
            payload.end_datetime,
        )
        .await?;

        info!("Re-schedule {} created for subject {}", row.id, row.subject_id);
        Ok(ReScheduleResponse {
            message: "Re-schedule created successfully".to_string(),
            re_schedule: row,
        })
    }

    pub async fn get(&self, id: i32) -> Result<ReScheduleRow, ServiceError> {
        ReScheduleRepository::get(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Re-schedule with id {} not found", id)))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ReScheduleRow>, ServiceError> {
        Ok(ReScheduleRepository::list(&self.pool, limit, offset).await?)
    }

    pub async fn logs(&self, id: i32) -> Result<Vec<ReScheduleLogRow>, ServiceError> {
        // confirm the re-schedule exists before listing its log
        self.get(id).await?;
        Ok(LogRepository::list_for(&self.pool, id, 500).await?)
    }

    /// Delete a re-schedule. Its pending dispatch entry is cancelled
    /// first so a deleted job can never start processing.
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        self.engine.cancel_dispatch(id);

        let deleted = ReScheduleRepository::delete(&self.pool, id).await?;
        if !deleted {
            return Err(ServiceError::NotFound(format!(
                "Re-schedule with id {} not found",
                id
            )));
        }
        info!("Re-schedule {} deleted", id);
        Ok(())
    }
}
