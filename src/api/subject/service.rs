use sqlx::{Pool, Postgres};
use std::sync::Arc;
use tracing::info;

use super::dto::{SubjectResponse, VerifyResponse};
use super::models::SubjectCreate;
use crate::api::error::ServiceError;
use crate::db::models::SubjectRow;
use crate::db::subject_repository::SubjectRepository;
use crate::engine::Engine;
use crate::portal::verify::CredentialCheck;
use crate::security::Secrets;

/// Subject service containing business logic
pub struct SubjectService {
    pool: Pool<Postgres>,
    secrets: Arc<Secrets>,
    engine: Engine,
}

impl SubjectService {
    pub fn new(pool: Pool<Postgres>, secrets: Arc<Secrets>, engine: Engine) -> Self {
        Self {
            pool,
            secrets,
            engine,
        }
    }

    pub async fn create(&self, payload: &SubjectCreate) -> Result<SubjectResponse, ServiceError> {
        if let (Some(min), Some(max)) = (payload.min_date, payload.max_date) {
            if max < min {
                return Err(ServiceError::ValidationError(
                    "max_date must not be before min_date".to_string(),
                ));
            }
        }

        let encrypted = self.secrets.encrypt_password(&payload.password);
        let row = SubjectRepository::create(
            &self.pool,
            &payload.name,
            &payload.last_name,
            &payload.email,
            &encrypted,
            payload.min_date,
            payload.max_date,
        )
        .await?;

        info!("Subject {} created", row.id);
        Ok(SubjectResponse {
            message: "Subject created successfully".to_string(),
            subject: row,
        })
    }

    pub async fn get(&self, id: i32) -> Result<SubjectRow, ServiceError> {
        SubjectRepository::get_with_credentials(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Subject with id {} not found", id)))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<SubjectRow>, ServiceError> {
        Ok(SubjectRepository::list(&self.pool, limit, offset).await?)
    }

    /// Run the credential check against the live portal and persist the
    /// outcome (schedule number, subject status)
    pub async fn verify(&self, id: i32) -> Result<VerifyResponse, ServiceError> {
        let check = self
            .engine
            .verify_subject(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Subject with id {} not found", id)))?;

        let response = match check {
            CredentialCheck::Verified { schedule_number } => VerifyResponse {
                success: true,
                schedule_number: Some(schedule_number),
                error: None,
            },
            CredentialCheck::VerifiedWithoutSchedule => VerifyResponse {
                success: true,
                schedule_number: None,
                error: Some(
                    "Login successful but no schedule number could be extracted".to_string(),
                ),
            },
            CredentialCheck::Failed { error } => VerifyResponse {
                success: false,
                schedule_number: None,
                error: Some(error),
            },
        };
        Ok(response)
    }
}
