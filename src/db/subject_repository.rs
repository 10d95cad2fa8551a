use chrono::NaiveDate;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::db::models::SubjectRow;

const COLUMNS: &str = "id, name, last_name, email, password, min_date, max_date, \
                       schedule_number, status, created_at, updated_at";

/// Repository for subject database operations
pub struct SubjectRepository;

impl SubjectRepository {
    /// Create a new subject. `password` must already be a Fernet token.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &Pool<Postgres>,
        name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        min_date: Option<NaiveDate>,
        max_date: Option<NaiveDate>,
    ) -> Result<SubjectRow, sqlx::Error> {
        debug!("Creating subject: email={}", email);

        sqlx::query_as::<_, SubjectRow>(&format!(
            "INSERT INTO subjects (name, last_name, email, password, min_date, max_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(last_name)
        .bind(email)
        .bind(password)
        .bind(min_date)
        .bind(max_date)
        .fetch_one(pool)
        .await
    }

    /// Fetch a subject including its encrypted credentials
    pub async fn get_with_credentials(
        pool: &Pool<Postgres>,
        id: i32,
    ) -> Result<Option<SubjectRow>, sqlx::Error> {
        sqlx::query_as::<_, SubjectRow>(&format!("SELECT {COLUMNS} FROM subjects WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &Pool<Postgres>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SubjectRow>, sqlx::Error> {
        sqlx::query_as::<_, SubjectRow>(&format!(
            "SELECT {COLUMNS} FROM subjects ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Persist the schedule identifier discovered during credential
    /// verification
    pub async fn update_schedule_number(
        pool: &Pool<Postgres>,
        id: i32,
        schedule_number: &str,
    ) -> Result<(), sqlx::Error> {
        debug!("Subject {}: schedule number set to {}", id, schedule_number);
        sqlx::query("UPDATE subjects SET schedule_number = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(schedule_number)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn update_status(
        pool: &Pool<Postgres>,
        id: i32,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        debug!("Subject {}: status set to {}", id, status);
        sqlx::query("UPDATE subjects SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(())
    }
}
