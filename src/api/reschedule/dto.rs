use serde::Serialize;

use crate::db::models::{ReScheduleLogRow, ReScheduleRow};

/// Response for re-schedule creation
#[derive(Serialize)]
pub struct ReScheduleResponse {
    pub message: String,
    pub re_schedule: ReScheduleRow,
}

/// Response for the log listing of one re-schedule
#[derive(Serialize)]
pub struct ReScheduleLogsResponse {
    pub re_schedule_id: i32,
    pub logs: Vec<ReScheduleLogRow>,
}
