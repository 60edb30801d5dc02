use clawctl_engine::{SyncBudget, UsageSyncEngine};
use clawctl_store::{Database, queries::usage};
use clawctl_testing::TestWorld;

fn line(input: i64, output: i64, ts: &str) -> String {
    TestWorld::usage_line(input, output, Some("anthropic/claude-sonnet-4"), ts)
}

/// Appending events and re-running the engine grows counters by exactly
/// the appended amounts, however many budget-bounded passes it takes.
#[test]
fn interleaved_appends_and_bounded_passes_count_exactly_once() {
    let world = TestWorld::new();
    let db = Database::open_in_memory().unwrap();

    for i in 0..4 {
        world.write_session_file(
            "a",
            &format!("s{i}"),
            &[&line(10, 5, "2026-02-01T08:00:00Z")],
        );
    }

    let engine = UsageSyncEngine::new(&db, world.home().to_path_buf());
    let tiny = SyncBudget {
        max_ms: 60_000,
        max_files: 1,
    };

    // two bounded passes cover half the files, then new data lands
    engine.sync_usage(tiny).unwrap();
    engine.sync_usage(tiny).unwrap();
    world.append_session_lines("a", "s0", &[&line(1, 1, "2026-02-01T09:00:00Z")]);
    world.append_session_lines("a", "s3", &[&line(2, 2, "2026-02-01T09:30:00Z")]);

    // drain until fully covered
    for _ in 0..6 {
        engine.sync_usage(SyncBudget::default()).unwrap();
    }

    let expect = |sid: &str, input: i64| {
        let row = usage::get_by_id(db.conn(), sid).unwrap().unwrap();
        assert_eq!(row.counters.input_tokens, input, "session {sid}");
    };
    expect("s0", 11);
    expect("s1", 10);
    expect("s2", 10);
    expect("s3", 12);
}

/// Without explicit totals, every bucket row keeps
/// `input + output + cacheRead + cacheWrite == total` exactly.
#[test]
fn daily_rows_preserve_component_sum() {
    let world = TestWorld::new();
    let db = Database::open_in_memory().unwrap();

    world.write_session_file(
        "a",
        "s1",
        &[
            &line(100, 50, "2026-02-01T08:00:00Z"),
            &line(7, 3, "2026-02-01T18:00:00Z"),
            &line(40, 2, "2026-02-02T08:00:00Z"),
        ],
    );

    let engine = UsageSyncEngine::new(&db, world.home().to_path_buf());
    engine.sync_usage(SyncBudget::default()).unwrap();

    let rows = usage::daily_rows_for_sessions(
        db.conn(),
        &["s1".to_string()],
        0,
        i64::MAX / 2,
    )
    .unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        let c = row.counters;
        assert_eq!(
            c.input_tokens + c.output_tokens + c.cache_read_tokens + c.cache_write_tokens,
            c.total_tokens
        );
    }
}

/// Lease exclusivity holds across separate connections to the same
/// database file.
#[test]
fn lease_is_exclusive_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clawctl.db");

    let db_a = Database::open(&path).unwrap();
    let db_b = Database::open(&path).unwrap();

    let now = 1_000_000;
    let a = clawctl_store::queries::lease::acquire(db_a.conn(), "usage.sync", 60_000, now).unwrap();
    let b = clawctl_store::queries::lease::acquire(db_b.conn(), "usage.sync", 60_000, now).unwrap();

    assert!(a.is_some());
    assert!(b.is_none());
}

/// A second engine pass over unchanged files is a no-op on every table.
#[test]
fn reingestion_is_idempotent_across_all_tables() {
    let world = TestWorld::new();
    let db = Database::open_in_memory().unwrap();

    world.write_session_file(
        "a",
        "s1",
        &[
            &line(100, 50, "2026-02-01T08:00:00Z"),
            &TestWorld::tool_line(&["read_file", "bash"], "2026-02-01T08:05:00Z"),
        ],
    );

    let engine = UsageSyncEngine::new(&db, world.home().to_path_buf());
    engine.sync_usage(SyncBudget::default()).unwrap();

    let snapshot = |db: &Database| -> (i64, i64, i64) {
        let agg = usage::get_by_id(db.conn(), "s1").unwrap().unwrap();
        let daily =
            usage::daily_rows_for_sessions(db.conn(), &["s1".to_string()], 0, i64::MAX / 2)
                .unwrap();
        let tools = usage::tool_daily_rows_for_sessions(
            db.conn(),
            &["s1".to_string()],
            0,
            i64::MAX / 2,
        )
        .unwrap();
        (
            agg.counters.total_tokens,
            daily.iter().map(|r| r.counters.total_tokens).sum(),
            tools.iter().map(|r| r.call_count).sum(),
        )
    };

    let before = snapshot(&db);
    engine.sync_usage(SyncBudget::default()).unwrap();
    let after = snapshot(&db);
    assert_eq!(before, after);
    assert_eq!(after.2, 2);
}
