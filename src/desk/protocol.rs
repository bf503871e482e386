//! Desk IPC protocol types.
//!
//! A reviewer tool sends one [`DeskRequest`] per line over the desk's Unix
//! socket and reads back one [`DeskResponse`] line.

use crate::desk::service::DeskError;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskRequest {
    /// Unique request ID (for correlating responses)
    pub request_id: String,

    #[serde(flatten)]
    pub op: DeskOp,
}

/// One desk operation. Encoded with an `"op"` tag, e.g.
/// `{"request_id": "r1", "op": "approve", "id": "APPROVAL-..", "approver": "alice"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeskOp {
    Pending,
    Detail {
        id: String,
    },
    Approve {
        id: String,
        approver: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
    },
    Reject {
        id: String,
        approver: String,
        reason: String,
    },
    Modify {
        id: String,
        approver: String,
        modifications: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
    },
    Statistics,
    Sweep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskResponse {
    pub request_id: String,
    pub ok: bool,
    /// 200 on success, otherwise the HTTP-style code of the failure.
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DeskResponse {
    pub fn success(request_id: String, data: Value) -> Self {
        Self {
            request_id,
            ok: true,
            code: 200,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(request_id: String, error: &DeskError) -> Self {
        Self {
            request_id,
            ok: false,
            code: error.status_code(),
            error: Some(error.to_string()),
            data: None,
        }
    }

    pub fn bad_request(request_id: String, error: impl Into<String>) -> Self {
        Self {
            request_id,
            ok: false,
            code: 400,
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn internal_error(request_id: String, error: impl Into<String>) -> Self {
        Self {
            request_id,
            ok: false,
            code: 500,
            error: Some(format!("Internal error: {}", error.into())),
            data: None,
        }
    }

    /// The payload of a successful response, or the failure as an error.
    pub fn into_data(self) -> Result<Value> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(anyhow!(
                "desk returned {}: {}",
                self.code,
                self.error.unwrap_or_else(|| "unknown error".into())
            ))
        }
    }
}
