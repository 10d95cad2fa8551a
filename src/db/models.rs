use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Database representation of a re-schedule attempt
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReScheduleRow {
    pub id: i32,
    pub subject_id: i32,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database representation of a subject, credentials included.
/// The password column holds a Fernet token, never plaintext.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubjectRow {
    pub id: i32,
    pub name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub schedule_number: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only workflow log line for a re-schedule
#[derive(Debug, FromRow, Serialize)]
pub struct ReScheduleLogRow {
    pub id: i32,
    pub re_schedule_id: i32,
    pub state: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
