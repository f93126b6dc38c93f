//! Error types for livedata.
//!
//! Every variant is terminal for the invocation that raised it. Nothing here
//! is retried internally; retry is a queue policy decision.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LivedataError {
    #[error("Invalid object type '{0}'")]
    InvalidObjectType(String),

    #[error("{kind} '{id}' does not exist")]
    NotFound { kind: &'static str, id: String },

    #[error("Device {device} does not have a management address")]
    NoManagementAddress { device: String },

    #[error("Device {device} is not active (status: {state})")]
    NotActive { device: String, state: String },

    #[error("Device {device} does not support the commands required for Livedata because {reason}")]
    MissingCommandSource { device: String, reason: String },

    #[error("'{variable}' is undefined in template '{template}'")]
    UndefinedVariable { variable: String, template: String },

    #[error("Malformed template '{template}': {reason}")]
    TemplateSyntax { template: String, reason: String },

    #[error("Failed to connect to {address}: {reason}")]
    ConnectionError { address: String, reason: String },

    #[error("Command '{command}' failed: {reason}")]
    CommandExecutionError { command: String, reason: String },

    #[error("Invalid retention policy: {0}")]
    InvalidPolicy(String),

    #[error("Job '{0}' is not registered or not enabled")]
    JobDisabled(String),

    #[error("Job exceeded its soft time limit of {0}s")]
    TimeLimitExceeded(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LivedataError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            LivedataError::InvalidObjectType(_) => "invalid_object_type",
            LivedataError::NotFound { .. } => "not_found",
            LivedataError::NoManagementAddress { .. } => "no_management_address",
            LivedataError::NotActive { .. } => "not_active",
            LivedataError::MissingCommandSource { .. } => "missing_command_source",
            LivedataError::UndefinedVariable { .. } => "undefined_variable",
            LivedataError::TemplateSyntax { .. } => "template_syntax",
            LivedataError::ConnectionError { .. } => "connection_error",
            LivedataError::CommandExecutionError { .. } => "command_execution_error",
            LivedataError::InvalidPolicy(_) => "invalid_policy",
            LivedataError::JobDisabled(_) => "job_disabled",
            LivedataError::TimeLimitExceeded(_) => "time_limit_exceeded",
            LivedataError::Config(_) => "config",
            LivedataError::Storage(_) => "storage",
            LivedataError::Json(_) => "json",
        }
    }

    /// Operator-facing error code, shown next to the message in the UI
    pub fn code(&self) -> &'static str {
        match self {
            LivedataError::InvalidObjectType(_) => "E1001",
            LivedataError::NotFound { .. } => "E1002",
            LivedataError::NoManagementAddress { .. } => "E1003",
            LivedataError::NotActive { .. } => "E1004",
            LivedataError::CommandExecutionError { .. } => "E3001",
            LivedataError::MissingCommandSource { .. } => "E3002",
            LivedataError::UndefinedVariable { .. } => "E3003",
            LivedataError::TemplateSyntax { .. } => "E3004",
            LivedataError::ConnectionError { .. } => "E3005",
            LivedataError::TimeLimitExceeded(_) => "E3006",
            LivedataError::InvalidPolicy(_) => "E4001",
            LivedataError::JobDisabled(_) => "E4002",
            LivedataError::Config(_) => "E9001",
            LivedataError::Storage(_) => "E9002",
            LivedataError::Json(_) => "E9003",
        }
    }

    /// True for errors raised before any device session is opened
    pub fn is_pre_connection(&self) -> bool {
        matches!(
            self,
            LivedataError::InvalidObjectType(_)
                | LivedataError::NotFound { .. }
                | LivedataError::NoManagementAddress { .. }
                | LivedataError::NotActive { .. }
                | LivedataError::MissingCommandSource { .. }
                | LivedataError::UndefinedVariable { .. }
                | LivedataError::TemplateSyntax { .. }
        )
    }

    pub fn to_failure(&self) -> JobFailure {
        JobFailure {
            kind: self.kind().to_string(),
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured failure as persisted on a job record and returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: String,
    pub code: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, LivedataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failure_carries_command_text() {
        let err = LivedataError::CommandExecutionError {
            command: "show interface Gi1/0/2".to_string(),
            reason: "timed out reading prompt".to_string(),
        };
        assert_eq!(err.code(), "E3001");
        assert!(err.to_string().contains("show interface Gi1/0/2"));
        assert!(!err.is_pre_connection());
    }

    #[test]
    fn test_failure_payload() {
        let err = LivedataError::NotActive {
            device: "sw-core-1".to_string(),
            state: "planned".to_string(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.kind, "not_active");
        assert_eq!(failure.code, "E1004");
        assert!(failure.message.contains("sw-core-1"));
        assert!(err.is_pre_connection());
    }
}
