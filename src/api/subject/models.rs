use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Subject account status, orthogonal to the re-schedule lifecycle.
/// LOGIN_PENDING flags credentials that failed and need remediation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectStatus {
    Active,
    LoginPending,
}

impl SubjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectStatus::Active => "ACTIVE",
            SubjectStatus::LoginPending => "LOGIN_PENDING",
        }
    }
}

/// Payload for creating a subject. The password arrives in the clear
/// over the API and is encrypted before it touches the database.
#[derive(Deserialize, Debug, Validate)]
pub struct SubjectCreate {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
    #[validate(length(min = 1, message = "Last name must not be empty"))]
    pub last_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: String,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}
