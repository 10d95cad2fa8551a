use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::api::reschedule::models::ScheduleStatus;
use crate::db::models::ReScheduleRow;

const COLUMNS: &str =
    "id, subject_id, start_datetime, end_datetime, status, error, created_at, updated_at";

/// Repository for re-schedule database operations
pub struct ReScheduleRepository;

impl ReScheduleRepository {
    /// Create a new re-schedule in PENDING status
    pub async fn create(
        pool: &Pool<Postgres>,
        subject_id: i32,
        start_datetime: DateTime<Utc>,
        end_datetime: DateTime<Utc>,
    ) -> Result<ReScheduleRow, sqlx::Error> {
        debug!("Creating re-schedule for subject {}", subject_id);

        let row = sqlx::query_as::<_, ReScheduleRow>(&format!(
            "INSERT INTO re_schedules (subject_id, start_datetime, end_datetime, status) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(subject_id)
        .bind(start_datetime)
        .bind(end_datetime)
        .bind(ScheduleStatus::Pending.as_str())
        .fetch_one(pool)
        .await?;

        debug!("Re-schedule created with id={}", row.id);
        Ok(row)
    }

    pub async fn get(
        pool: &Pool<Postgres>,
        id: i32,
    ) -> Result<Option<ReScheduleRow>, sqlx::Error> {
        sqlx::query_as::<_, ReScheduleRow>(&format!(
            "SELECT {COLUMNS} FROM re_schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List re-schedules in a given status, oldest window first,
    /// bounded page
    pub async fn list_by_status(
        pool: &Pool<Postgres>,
        status: ScheduleStatus,
        limit: i64,
    ) -> Result<Vec<ReScheduleRow>, sqlx::Error> {
        sqlx::query_as::<_, ReScheduleRow>(&format!(
            "SELECT {COLUMNS} FROM re_schedules WHERE status = $1 \
             ORDER BY start_datetime ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list(
        pool: &Pool<Postgres>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReScheduleRow>, sqlx::Error> {
        sqlx::query_as::<_, ReScheduleRow>(&format!(
            "SELECT {COLUMNS} FROM re_schedules ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Atomically move a re-schedule from one status to another.
    ///
    /// The guarded UPDATE means a second caller racing on the same row
    /// sees zero rows affected, so a job can only be advanced once.
    pub async fn transition(
        pool: &Pool<Postgres>,
        id: i32,
        from: ScheduleStatus,
        to: ScheduleStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE re_schedules SET status = $3, updated_at = now() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(pool)
        .await?;

        let advanced = result.rows_affected() > 0;
        debug!(
            "Transition {} -> {} for re-schedule {}: {}",
            from.as_str(),
            to.as_str(),
            id,
            if advanced { "applied" } else { "skipped" }
        );
        Ok(advanced)
    }

    /// Set a terminal (or otherwise unconditional) status, replacing the
    /// stored error and optionally stamping the end time
    pub async fn mark(
        pool: &Pool<Postgres>,
        id: i32,
        status: ScheduleStatus,
        error: Option<&str>,
        end_datetime: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE re_schedules SET status = $2, error = $3, \
             end_datetime = COALESCE($4, end_datetime), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(end_datetime)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a per-tick error without touching the status
    pub async fn set_error(
        pool: &Pool<Postgres>,
        id: i32,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE re_schedules SET error = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &Pool<Postgres>, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM re_schedules WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
