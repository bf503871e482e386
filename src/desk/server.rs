//! Desk server: approval decisions over a Unix domain socket.
//!
//! Each connection carries JSON lines. Every request line gets exactly one
//! response line, including malformed ones.

use crate::desk::protocol::{DeskOp, DeskRequest, DeskResponse};
use crate::desk::service::{ApprovalDesk, DeskError};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub struct DeskServer {
    socket_path: PathBuf,
    desk: Arc<ApprovalDesk>,
}

impl DeskServer {
    pub fn new(socket_path: impl AsRef<Path>, desk: ApprovalDesk) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            desk: Arc::new(desk),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and serve connections until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket {}", self.socket_path.display())
            })?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind socket: {}", self.socket_path.display()))?;

        tracing::info!("Approval desk listening on {}", self.socket_path.display());

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let desk = self.desk.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, desk).await {
                            tracing::error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, desk: Arc<ApprovalDesk>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<DeskRequest>(line.trim()) {
            Ok(request) => {
                let desk = desk.clone();
                let request_id = request.request_id.clone();
                // Store access is blocking file I/O.
                match tokio::task::spawn_blocking(move || process_request(&desk, request)).await {
                    Ok(response) => response,
                    Err(e) => DeskResponse::internal_error(request_id, e.to_string()),
                }
            }
            Err(e) => DeskResponse::bad_request(
                "unknown".to_string(),
                format!("Invalid request JSON: {}", e),
            ),
        };

        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

/// Execute one request against the desk.
pub fn process_request(desk: &ApprovalDesk, request: DeskRequest) -> DeskResponse {
    let request_id = request.request_id;
    tracing::debug!(request_id = %request_id, op = ?request.op, "Desk request");

    let outcome = match request.op {
        DeskOp::Pending => desk.pending().and_then(encode),
        DeskOp::Detail { id } => desk.detail(&id).and_then(encode),
        DeskOp::Approve {
            id,
            approver,
            comments,
        } => desk.approve(&id, &approver, comments).and_then(encode),
        DeskOp::Reject {
            id,
            approver,
            reason,
        } => desk.reject(&id, &approver, &reason).and_then(encode),
        DeskOp::Modify {
            id,
            approver,
            modifications,
            comments,
        } => desk
            .modify(&id, &approver, modifications, comments)
            .and_then(encode),
        DeskOp::Statistics => desk.statistics().and_then(encode),
        DeskOp::Sweep => desk.sweep().and_then(encode),
    };

    match outcome {
        Ok(data) => DeskResponse::success(request_id, data),
        Err(DeskError::Store(e)) => DeskResponse::internal_error(request_id, e.to_string()),
        Err(e) => DeskResponse::failure(request_id, &e),
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, DeskError> {
    serde_json::to_value(value).map_err(|e| DeskError::Invalid(format!("unencodable response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::{Approval, ApprovalType};
    use crate::store::ApprovalStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ApprovalDesk, Approval) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path().join("approvals")).unwrap());
        let a = Approval::new(ApprovalType::TestCase, "tc-1", json!({"name": "login"}), "login");
        store.save(&a).unwrap();
        (tmp, ApprovalDesk::new(store), a)
    }

    fn req(op: DeskOp) -> DeskRequest {
        DeskRequest {
            request_id: "r1".into(),
            op,
        }
    }

    #[test]
    fn test_process_pending_and_approve() {
        let (_tmp, desk, a) = setup();

        let resp = process_request(&desk, req(DeskOp::Pending));
        assert!(resp.ok);
        assert_eq!(resp.request_id, "r1");
        let list = resp.data.unwrap();
        assert_eq!(list[0]["id"], json!(a.id));

        let resp = process_request(
            &desk,
            req(DeskOp::Approve {
                id: a.id.clone(),
                approver: "alice".into(),
                comments: None,
            }),
        );
        assert!(resp.ok);
        assert_eq!(resp.data.unwrap()["status"], json!("approved"));

        let resp = process_request(&desk, req(DeskOp::Pending));
        assert_eq!(resp.data.unwrap(), json!([]));
    }

    #[test]
    fn test_process_maps_error_codes() {
        let (_tmp, desk, a) = setup();

        let resp = process_request(&desk, req(DeskOp::Detail { id: "APPROVAL-none".into() }));
        assert!(!resp.ok);
        assert_eq!(resp.code, 404);

        let resp = process_request(
            &desk,
            req(DeskOp::Modify {
                id: a.id.clone(),
                approver: "alice".into(),
                modifications: json!({}),
                comments: None,
            }),
        );
        assert_eq!(resp.code, 400);
    }

    #[tokio::test]
    async fn test_server_answers_malformed_lines() {
        let (tmp, desk, _a) = setup();
        let socket = tmp.path().join("desk.sock");
        let server = DeskServer::new(&socket, desk);
        let handle = tokio::spawn(async move { server.run().await });

        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = UnixStream::connect(&socket).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let (reader, mut writer) = stream.expect("desk socket").into_split();
        writer.write_all(b"not json\n").await.unwrap();

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let resp: DeskResponse = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(resp.code, 400);
        assert_eq!(resp.request_id, "unknown");

        handle.abort();
    }
}
