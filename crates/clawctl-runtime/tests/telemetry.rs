use clawctl_runtime::{OpenclawClient, TelemetrySync, compute_overlay};
use clawctl_store::{Database, queries::agent_session};
use clawctl_testing::{CommandScript, FakeRuntime, TestWorld};
use clawctl_types::SessionState;

fn status_payload() -> String {
    serde_json::json!({
        "sessions": {
            "recent": [
                {
                    "sessionId": "sess_a",
                    "key": "agent:builder:op:op1234567890",
                    "agentId": "builder",
                    "model": "anthropic/claude-sonnet-4",
                    "age": 1000,
                },
                {
                    "sessionId": "sess_b",
                    "key": "cron:heartbeat",
                    "agentId": "ops",
                    "age": 900_000,
                    "abortedLastRun": true,
                    "percentUsed": 82.5,
                },
                {"key": "no-session-id-entry"},
            ]
        }
    })
    .to_string()
}

#[tokio::test]
async fn sync_upserts_rows_from_status() {
    let world = TestWorld::new();
    let bin = FakeRuntime::new()
        .on_status(CommandScript::ok(status_payload()))
        .write(world.base_path());
    let db = Database::open_in_memory().unwrap();

    let sync = TelemetrySync::new(&db, OpenclawClient::new(bin.display().to_string()));
    let stats = sync.sync_agent_sessions().await.unwrap();

    assert!(!stats.skipped);
    assert_eq!(stats.sessions_upserted, 2);

    let a = agent_session::get(db.conn(), "sess_a").unwrap().unwrap();
    assert_eq!(a.state, SessionState::Active);
    assert_eq!(a.agent_id, "builder");
    assert_eq!(a.operation_id.as_deref(), Some("op1234567890"));

    let b = agent_session::get(db.conn(), "sess_b").unwrap().unwrap();
    assert_eq!(b.state, SessionState::Error);
    assert!(b.aborted_last_run);
    assert_eq!(b.percent_used, Some(82.5));
}

#[tokio::test]
async fn second_sync_within_gate_is_skipped() {
    let world = TestWorld::new();
    let bin = FakeRuntime::new()
        .on_status(CommandScript::ok(status_payload()))
        .write(world.base_path());
    let db = Database::open_in_memory().unwrap();

    let sync = TelemetrySync::new(&db, OpenclawClient::new(bin.display().to_string()));
    let first = sync.sync_agent_sessions().await.unwrap();
    assert!(!first.skipped);

    let second = sync.sync_agent_sessions().await.unwrap();
    assert!(second.skipped);
    assert_eq!(second.sessions_upserted, first.sessions_upserted);
}

#[tokio::test]
async fn failed_poll_leaves_rows_untouched() {
    let world = TestWorld::new();
    let ok_bin = FakeRuntime::new()
        .on_status(CommandScript::ok(status_payload()))
        .write(world.base_path());
    let db = Database::open_in_memory().unwrap();

    let sync = TelemetrySync::new(&db, OpenclawClient::new(ok_bin.display().to_string()));
    sync.sync_agent_sessions().await.unwrap();

    let broken = FakeRuntime::new()
        .on_status(CommandScript::fail(1, "runtime offline"))
        .write(world.base_path());
    let broken_sync = TelemetrySync::new(&db, OpenclawClient::new(broken.display().to_string()));
    assert!(broken_sync.sync_agent_sessions().await.is_err());

    // rows from the earlier successful poll are still there
    assert_eq!(agent_session::list_all(db.conn()).unwrap().len(), 2);
}

#[tokio::test]
async fn overlay_reflects_highest_priority_state() {
    let world = TestWorld::new();
    let bin = FakeRuntime::new()
        .on_status(CommandScript::ok(status_payload()))
        .write(world.base_path());
    let db = Database::open_in_memory().unwrap();

    let sync = TelemetrySync::new(&db, OpenclawClient::new(bin.display().to_string()));
    sync.sync_agent_sessions().await.unwrap();

    let rows = agent_session::list_all(db.conn()).unwrap();
    let overlay = compute_overlay(&rows);

    assert_eq!(overlay["builder"].state, SessionState::Active);
    assert_eq!(overlay["ops"].state, SessionState::Error);
    // the overlay never touched the store
    assert_eq!(agent_session::list_all(db.conn()).unwrap().len(), rows.len());
}
