use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Every item in the call succeeded.
    Success { artifact: Option<Artifact> },
    /// The call went through but the marketplace rejected some items; the
    /// rest of the call's items succeeded.
    PartialFailure {
        failures: Vec<ItemRejection>,
        artifact: Option<Artifact>,
    },
    /// The endpoint answered but refused the whole call.
    Error { reason: String },
}

impl CallOutcome {
    pub fn ok() -> Self {
        CallOutcome::Success { artifact: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRejection {
    pub id: String,
    pub reason: String,
    /// State a later retry of this item needs, kept in the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ItemRejection {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Binary output of a call, e.g. a PDF of shipping labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}
