use sqlx::{Pool, Postgres};

use crate::api::reschedule::models::LogState;
use crate::db::models::ReScheduleLogRow;

/// Repository for the append-only re-schedule log
pub struct LogRepository;

impl LogRepository {
    pub async fn append(
        pool: &Pool<Postgres>,
        re_schedule_id: i32,
        state: LogState,
        content: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO re_schedule_logs (re_schedule_id, state, content) VALUES ($1, $2, $3)",
        )
        .bind(re_schedule_id)
        .bind(state.as_str())
        .bind(content)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for(
        pool: &Pool<Postgres>,
        re_schedule_id: i32,
        limit: i64,
    ) -> Result<Vec<ReScheduleLogRow>, sqlx::Error> {
        sqlx::query_as::<_, ReScheduleLogRow>(
            "SELECT id, re_schedule_id, state, content, created_at FROM re_schedule_logs \
             WHERE re_schedule_id = $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(re_schedule_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
