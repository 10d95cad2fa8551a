use serde::Serialize;

use crate::db::models::SubjectRow;

/// Response for subject creation; the row serializer never exposes the
/// password column
#[derive(Serialize)]
pub struct SubjectResponse {
    pub message: String,
    pub subject: SubjectRow,
}

/// Outcome of an on-demand credential verification
#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub schedule_number: Option<String>,
    pub error: Option<String>,
}
