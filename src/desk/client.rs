//! Desk client: sends requests to a running desk server.
//!
//! Synchronous on purpose so it can be used from the CLI and from tests
//! without a runtime.

use crate::desk::protocol::{DeskOp, DeskRequest, DeskResponse};
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct DeskClient {
    socket_path: PathBuf,
}

impl DeskClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Send a request and read its response. One connection per call.
    pub fn send(&self, request: &DeskRequest) -> Result<DeskResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).with_context(|| {
            format!(
                "Failed to connect to approval desk at {}. Is `regent desk serve` running?",
                self.socket_path.display()
            )
        })?;

        let json = serde_json::to_string(request)?;
        stream.write_all(json.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        serde_json::from_str(response_line.trim()).context("Failed to parse desk response")
    }

    fn call(&self, op: DeskOp) -> Result<Value> {
        let request = DeskRequest {
            request_id: Uuid::new_v4().to_string(),
            op,
        };
        self.send(&request)?.into_data()
    }

    pub fn pending(&self) -> Result<Value> {
        self.call(DeskOp::Pending)
    }

    pub fn detail(&self, id: &str) -> Result<Value> {
        self.call(DeskOp::Detail { id: id.to_string() })
    }

    pub fn approve(&self, id: &str, approver: &str, comments: Option<&str>) -> Result<Value> {
        self.call(DeskOp::Approve {
            id: id.to_string(),
            approver: approver.to_string(),
            comments: comments.map(str::to_string),
        })
    }

    pub fn reject(&self, id: &str, approver: &str, reason: &str) -> Result<Value> {
        self.call(DeskOp::Reject {
            id: id.to_string(),
            approver: approver.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn modify(
        &self,
        id: &str,
        approver: &str,
        modifications: Value,
        comments: Option<&str>,
    ) -> Result<Value> {
        self.call(DeskOp::Modify {
            id: id.to_string(),
            approver: approver.to_string(),
            modifications,
            comments: comments.map(str::to_string),
        })
    }

    pub fn statistics(&self) -> Result<Value> {
        self.call(DeskOp::Statistics)
    }

    pub fn sweep(&self) -> Result<Value> {
        self.call(DeskOp::Sweep)
    }
}
