//! Error types for finwarden
//!
//! Two layers:
//! - [`Error`] is the library error used by storage, configuration and
//!   internal plumbing.
//! - [`ToolError`] is what a tool call returns to the protocol router: a
//!   stable snake_case code plus an optional message, always serializable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable error tags surfaced to callers of `execute_tool`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorCode {
    ToolNotFound,
    NameConflict,
    InvalidTool,
    NotFound,
    PrivacyModeInsufficient,
    NoExecutor,
    InvalidArguments,
    ValidationFailed,
    ExecutionFailed,
    UnfilteredResultBlocked,
    AuditUnavailable,
    Internal,
}

impl ToolErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolNotFound => "tool_not_found",
            Self::NameConflict => "name_conflict",
            Self::InvalidTool => "invalid_tool",
            Self::NotFound => "not_found",
            Self::PrivacyModeInsufficient => "privacy_mode_insufficient",
            Self::NoExecutor => "no_executor",
            Self::InvalidArguments => "invalid_arguments",
            Self::ValidationFailed => "validation_failed",
            Self::ExecutionFailed => "execution_failed",
            Self::UnfilteredResultBlocked => "unfiltered_result_blocked",
            Self::AuditUnavailable => "audit_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ToolErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error returned from tool registration and execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: ToolErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Individual validation messages (parser tools)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ToolError {
    pub fn new(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    /// Error with a code only
    pub fn bare(code: ToolErrorCode) -> Self {
        Self {
            code,
            message: None,
            details: Vec::new(),
        }
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(ToolErrorCode::ToolNotFound, format!("Unknown tool: {}", name))
    }

    pub fn validation(messages: Vec<String>) -> Self {
        Self {
            code: ToolErrorCode::ValidationFailed,
            message: Some(messages.join("; ")),
            details: messages,
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::InvalidArguments, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::ExecutionFailed, message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<Error> for ToolError {
    fn from(err: Error) -> Self {
        Self::new(ToolErrorCode::Internal, err.to_string())
    }
}
