use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lifecycle status of a re-schedule attempt.
///
/// Transitions only move forward:
/// PENDING -> SCHEDULED -> PROCESSING -> {COMPLETED, FAILED, NOT_FOUND}.
/// A job never returns to PENDING once it has left it.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Scheduled,
    Processing,
    Completed,
    Failed,
    NotFound,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Scheduled => "SCHEDULED",
            ScheduleStatus::Processing => "PROCESSING",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Failed => "FAILED",
            ScheduleStatus::NotFound => "NOT_FOUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScheduleStatus::Pending),
            "SCHEDULED" => Some(ScheduleStatus::Scheduled),
            "PROCESSING" => Some(ScheduleStatus::Processing),
            "COMPLETED" => Some(ScheduleStatus::Completed),
            "FAILED" => Some(ScheduleStatus::Failed),
            "NOT_FOUND" => Some(ScheduleStatus::NotFound),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of `self` in the forward-only
    /// lifecycle.
    pub fn can_follow(self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Pending, Failed)
                | (Scheduled, Processing)
                | (Scheduled, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, NotFound)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScheduleStatus::Completed | ScheduleStatus::Failed | ScheduleStatus::NotFound
        )
    }
}

/// Severity of a workflow log line
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogState {
    Info,
    Warning,
    Error,
    Success,
}

impl LogState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogState::Info => "INFO",
            LogState::Warning => "WARNING",
            LogState::Error => "ERROR",
            LogState::Success => "SUCCESS",
        }
    }
}

/// Payload for creating a re-schedule attempt. Jobs always start out
/// PENDING; the scan loop picks them up once their window opens.
#[derive(Deserialize, Serialize, Debug, Validate)]
pub struct ReScheduleCreate {
    #[validate(range(min = 1, message = "subject_id must be a positive id"))]
    pub subject_id: i32,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ScheduleStatus::*;
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [Pending, Scheduled, Processing, Completed, Failed, NotFound] {
            assert_eq!(ScheduleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ScheduleStatus::parse("bogus"), None);
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        assert!(Pending.can_follow(Scheduled));
        assert!(Scheduled.can_follow(Processing));
        assert!(Processing.can_follow(Completed));
        assert!(Processing.can_follow(Failed));
        assert!(Processing.can_follow(NotFound));

        // no path back to PENDING
        for status in [Scheduled, Processing, Completed, Failed, NotFound] {
            assert!(!status.can_follow(Pending));
        }
        // terminal states have no successors
        for status in [Completed, Failed, NotFound] {
            for next in [Pending, Scheduled, Processing, Completed, Failed, NotFound] {
                assert!(!status.can_follow(next));
            }
        }
        // no skipping straight from PENDING to PROCESSING
        assert!(!Pending.can_follow(Processing));
    }
}
