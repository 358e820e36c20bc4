use serde::Serialize;

use crate::db::models::{ErrorRow, JobRow, MessageRow};

/// Response for job creation and control operations
#[derive(Serialize)]
pub struct JobResponse {
    pub message: String,
    pub job: JobRow,
}

/// Full job snapshot: current record plus narration and error history
#[derive(Serialize)]
pub struct JobDetailResponse {
    pub job: JobRow,
    pub messages: Vec<MessageRow>,
    pub errors: Vec<ErrorRow>,
}

/// Response for job listing
#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobRow>,
}
