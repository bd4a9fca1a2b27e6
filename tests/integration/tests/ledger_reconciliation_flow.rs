use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use brain_capture::idle_status;
use brain_gateway::{
    build_integration_router, IntegrationServerState, INTEGRATION_CREATE_ENDPOINT,
    INTEGRATION_SYNC_ENDPOINT, INTEGRATION_WEBHOOK_ENDPOINT,
};
use brain_tracker::{scan_ledger, Ledger, ReconcileEngine, TrackerClient, TrackerClientConfig};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const LEDGER: &str = "# Commitments\n\
\n\
- [ ] Ship thing — @owner — @tracker:AB-7 — added 2026-01-01\n\
- [ ] Review draft — @owner — @tracker:AB-8 — added 2026-01-02\n\
- [x] Old work — @tracker:AB-3 (completed via Linear 2026-01-03)\n\
- [ ] Untagged follow-up — @owner\n";

fn issue_node(identifier: &str, title: &str, state_name: &str, state_type: &str) -> Value {
    json!({
        "id": format!("uuid-{identifier}"),
        "identifier": identifier,
        "title": title,
        "state": { "name": state_name, "type": state_type },
        "assignee": null
    })
}

fn tracker_client(server: &MockServer) -> TrackerClient {
    TrackerClient::new(TrackerClientConfig {
        api_url: server.url("/graphql"),
        api_key: Some("lin_api_integration".to_string()),
        request_timeout_ms: 2_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("tracker client")
}

fn write_ledger(root: &Path) -> PathBuf {
    let path = root.join("commitments.md");
    std::fs::write(&path, LEDGER).expect("write ledger");
    path
}

async fn spawn_server(
    tracker: TrackerClient,
    ledger_path: PathBuf,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let engine = ReconcileEngine::new(Arc::new(tracker), Arc::new(Ledger::new(ledger_path)));
    let state = Arc::new(IntegrationServerState::new(
        Arc::new(engine),
        None,
        idle_status(),
    ));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_integration_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, handle))
}

#[tokio::test]
async fn integration_sync_endpoint_completes_terminal_issues_against_graphql_tracker() {
    let server = MockServer::start();
    let done = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("authorization", "lin_api_integration")
            .json_body_includes(json!({
                "variables": { "filter": { "number": { "eq": 7 }, "team": { "key": { "eq": "AB" } } } }
            }).to_string());
        then.status(200).json_body(json!({
            "data": { "issues": { "nodes": [issue_node("AB-7", "Ship thing", "Done", "completed")] } }
        }));
    });
    let started = server.mock(|when, then| {
        when.method(POST).path("/graphql").json_body_includes(json!({
            "variables": { "filter": { "number": { "eq": 8 }, "team": { "key": { "eq": "AB" } } } }
        }).to_string());
        then.status(200).json_body(json!({
            "data": { "issues": { "nodes": [issue_node("AB-8", "Review draft", "In Progress", "started")] } }
        }));
    });
    let completed_tag = server.mock(|when, then| {
        when.method(POST).path("/graphql").json_body_includes(json!({
            "variables": { "filter": { "number": { "eq": 3 } } }
        }).to_string());
        then.status(500);
    });

    let temp = tempfile::tempdir().expect("tempdir");
    let ledger_path = write_ledger(temp.path());
    let (addr, handle) = spawn_server(tracker_client(&server), ledger_path.clone())
        .await
        .expect("spawn server");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}{INTEGRATION_SYNC_ENDPOINT}");

    let first = client.post(&url).send().await.expect("first sync");
    assert_eq!(first.status(), reqwest::StatusCode::OK);
    let body = first.json::<Value>().await.expect("json body");
    assert_eq!(
        body,
        json!({
            "ok": true,
            "changes": [{ "type": "completed", "identifier": "AB-7", "title": "Ship thing", "state": "Done" }]
        })
    );
    done.assert_calls(1);
    started.assert_calls(1);
    completed_tag.assert_calls(0);

    let second = client.post(&url).send().await.expect("second sync");
    assert_eq!(
        second.json::<Value>().await.expect("json body"),
        json!({ "ok": true, "changes": [] })
    );
    done.assert_calls(1);
    started.assert_calls(2);

    let tags = scan_ledger(&ledger_path).expect("scan");
    let states = tags
        .iter()
        .map(|tag| (tag.remote_identifier.as_str(), tag.is_completed))
        .collect::<Vec<_>>();
    assert_eq!(states, vec![("AB-7", true), ("AB-8", false), ("AB-3", true)]);
    let content = std::fs::read_to_string(&ledger_path).expect("read ledger");
    assert_eq!(content.matches("(completed via Linear").count(), 2);
    assert!(content.ends_with("- [ ] Untagged follow-up — @owner\n"));
    handle.abort();
}

#[tokio::test]
async fn integration_webhook_and_sync_racing_on_same_tag_annotate_once() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql").json_body_includes(json!({
            "variables": { "filter": { "number": { "eq": 8 } } }
        }).to_string());
        then.status(200)
            .delay(Duration::from_millis(50))
            .json_body(json!({
                "data": { "issues": { "nodes": [issue_node("AB-8", "Review draft", "Canceled", "canceled")] } }
            }));
    });
    server.mock(|when, then| {
        when.method(POST).path("/graphql").json_body_includes(json!({
            "variables": { "filter": { "number": { "eq": 7 } } }
        }).to_string());
        then.status(200).json_body(json!({
            "data": { "issues": { "nodes": [issue_node("AB-7", "Ship thing", "Todo", "unstarted")] } }
        }));
    });

    let temp = tempfile::tempdir().expect("tempdir");
    let ledger_path = write_ledger(temp.path());
    let (addr, handle) = spawn_server(tracker_client(&server), ledger_path.clone())
        .await
        .expect("spawn server");
    let client = reqwest::Client::new();

    let sync = {
        let client = client.clone();
        let url = format!("http://{addr}{INTEGRATION_SYNC_ENDPOINT}");
        tokio::spawn(async move { client.post(url).send().await })
    };
    let webhook = {
        let client = client.clone();
        let url = format!("http://{addr}{INTEGRATION_WEBHOOK_ENDPOINT}");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client
                .post(url)
                .json(&json!({
                    "type": "Issue",
                    "data": {
                        "team": { "key": "AB" },
                        "number": 8,
                        "title": "Review draft",
                        "state": { "name": "Canceled", "type": "canceled" }
                    }
                }))
                .send()
                .await
        })
    };

    let sync_response = sync.await.expect("join sync").expect("sync request");
    let webhook_response = webhook.await.expect("join webhook").expect("webhook request");
    assert_eq!(webhook_response.status(), reqwest::StatusCode::OK);
    assert_eq!(sync_response.status(), reqwest::StatusCode::OK);

    let content = std::fs::read_to_string(&ledger_path).expect("read ledger");
    let review_line = content
        .lines()
        .find(|line| line.contains("@tracker:AB-8"))
        .expect("review line");
    assert!(review_line.starts_with("- [x] Review draft"));
    assert_eq!(review_line.matches("(completed via Linear").count(), 1);
    assert!(content.contains("- [ ] Ship thing"));
    handle.abort();
}

#[tokio::test]
async fn integration_create_endpoint_resolves_team_then_creates_issue() {
    let server = MockServer::start();
    let team = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .json_body_includes(json!({ "variables": { "key": "AB" } }).to_string());
        then.status(200)
            .json_body(json!({ "data": { "teams": { "nodes": [{ "id": "team-uuid" }] } } }));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path("/graphql").json_body_includes(json!({
            "variables": { "input": { "teamId": "team-uuid", "title": "Write docs" } }
        }).to_string());
        then.status(200).json_body(json!({
            "data": {
                "issueCreate": {
                    "success": true,
                    "issue": {
                        "id": "issue-uuid",
                        "identifier": "AB-12",
                        "title": "Write docs",
                        "url": "https://linear.app/ab/issue/AB-12"
                    }
                }
            }
        }));
    });

    let temp = tempfile::tempdir().expect("tempdir");
    let (addr, handle) = spawn_server(tracker_client(&server), write_ledger(temp.path()))
        .await
        .expect("spawn server");
    let client = reqwest::Client::new();
    let url = format!("http://{addr}{INTEGRATION_CREATE_ENDPOINT}");

    let missing_team = client
        .post(&url)
        .json(&json!({ "title": "X" }))
        .send()
        .await
        .expect("create without team");
    assert_eq!(missing_team.status(), reqwest::StatusCode::BAD_REQUEST);
    team.assert_calls(0);

    let created = client
        .post(&url)
        .json(&json!({ "team": "AB", "title": "Write docs", "description": "Captured from brain" }))
        .send()
        .await
        .expect("create");
    assert_eq!(created.status(), reqwest::StatusCode::OK);
    let body = created.json::<Value>().await.expect("json body");
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["issue"]["identifier"], json!("AB-12"));
    team.assert();
    create.assert();
    handle.abort();
}
