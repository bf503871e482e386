//! The approval desk over a real Unix socket, driven by the sync client.

use regent::approval::{Approval, ApprovalStatus, ApprovalType};
use regent::desk::{ApprovalDesk, DeskClient, DeskServer};
use regent::store::ApprovalStore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

struct Running {
    _tmp: TempDir,
    socket: PathBuf,
    store: Arc<ApprovalStore>,
    server: JoinHandle<anyhow::Result<()>>,
}

async fn start() -> Running {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(ApprovalStore::open(tmp.path().join("approvals")).unwrap());
    let socket = tmp.path().join("desk.sock");
    let server = DeskServer::new(&socket, ApprovalDesk::new(store.clone()));
    let server = tokio::spawn(async move { server.run().await });

    for _ in 0..100 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Running {
        _tmp: tmp,
        socket,
        store,
        server,
    }
}

/// Run client calls off the runtime, the way a separate reviewer process would.
async fn with_client<T: Send + 'static>(
    socket: &Path,
    f: impl FnOnce(DeskClient) -> T + Send + 'static,
) -> T {
    let client = DeskClient::new(socket);
    tokio::task::spawn_blocking(move || f(client)).await.unwrap()
}

fn plan_approval() -> Approval {
    Approval::new(
        ApprovalType::TestPlan,
        "plan-shop",
        json!({"priority": "high", "cases": 2}),
        "Test plan for shop: checkout",
    )
}

#[tokio::test]
async fn test_list_and_approve_over_socket() {
    let desk = start().await;
    let approval = plan_approval();
    desk.store.save(&approval).unwrap();
    let id = approval.id.clone();

    let (pending, decided) = with_client(&desk.socket, move |client| {
        let pending = client.pending().unwrap();
        let decided = client.approve(&id, "alice", Some("looks complete")).unwrap();
        (pending, decided)
    })
    .await;

    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["item_id"], json!("plan-shop"));
    assert_eq!(decided["status"], json!("approved"));
    assert_eq!(decided["approved_by"], json!("alice"));

    let stored = desk.store.get(&approval.id).unwrap().unwrap();
    assert_eq!(stored.status, ApprovalStatus::Approved);
    assert_eq!(stored.comments.as_deref(), Some("looks complete"));

    desk.server.abort();
}

#[tokio::test]
async fn test_modify_and_conflict_codes() {
    let desk = start().await;
    let approval = plan_approval();
    desk.store.save(&approval).unwrap();
    let id = approval.id.clone();

    let (modified, conflict, missing) = with_client(&desk.socket, move |client| {
        let modified = client
            .modify(&id, "bob", json!({"priority": "critical"}), None)
            .unwrap();
        let conflict = client.reject(&id, "carol", "too late").unwrap_err();
        let missing = client.detail("APPROVAL-00000000").unwrap_err();
        (modified, conflict, missing)
    })
    .await;

    assert_eq!(modified["status"], json!("modified"));
    assert_eq!(
        modified["modified_item"],
        json!({"priority": "critical", "cases": 2})
    );
    assert!(conflict.to_string().contains("409"));
    assert!(missing.to_string().contains("404"));

    desk.server.abort();
}

#[tokio::test]
async fn test_expired_approval_is_refused_and_swept() {
    let desk = start().await;
    let stale = plan_approval()
        .with_timeout(1)
        .with_requested_at(chrono::Utc::now() - chrono::Duration::seconds(30));
    let other = plan_approval()
        .with_timeout(1)
        .with_requested_at(chrono::Utc::now() - chrono::Duration::seconds(30));
    desk.store.save(&stale).unwrap();
    desk.store.save(&other).unwrap();
    let id = stale.id.clone();

    let (refused, swept, stats) = with_client(&desk.socket, move |client| {
        let refused = client.approve(&id, "alice", None).unwrap_err();
        let swept = client.sweep().unwrap();
        let stats = client.statistics().unwrap();
        (refused, swept, stats)
    })
    .await;

    assert!(refused.to_string().contains("410"));
    // The refused one was already stamped; only the other is left to sweep.
    assert_eq!(swept.as_array().unwrap().len(), 1);
    assert_eq!(swept[0]["id"], json!(other.id));
    assert_eq!(stats["total"], json!(2));
    assert_eq!(stats["by_status"]["timeout"], json!(2));

    desk.server.abort();
}

#[tokio::test]
async fn test_raw_protocol_line() {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;

    let desk = start().await;
    let socket = desk.socket.clone();

    let response: Value = tokio::task::spawn_blocking(move || {
        let mut stream = UnixStream::connect(&socket).unwrap();
        stream
            .write_all(b"{\"request_id\":\"r-7\",\"op\":\"statistics\"}\n")
            .unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        serde_json::from_str(line.trim()).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(response["request_id"], json!("r-7"));
    assert_eq!(response["ok"], json!(true));
    assert_eq!(response["code"], json!(200));
    assert_eq!(response["data"]["total"], json!(0));

    desk.server.abort();
}
