//! HTTP request/response bodies shared by livedatad and livedatactl

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub devices: usize,
    pub query_job_enabled: bool,
    pub cleanup_job_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequestBody {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRequestBody {
    #[serde(default)]
    pub days_to_keep: Option<u32>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// Returned when a job has been queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
}
