use rusqlite::Connection;

use crate::Result;

// Bump whenever a table shape changes; a mismatch drops and rebuilds,
// since every row is derivable from the session logs.
pub const SCHEMA_VERSION: i32 = 1;

// All instants are epoch milliseconds (INTEGER). Day buckets are UTC
// midnights, hour buckets UTC hour starts. Costs are integer micro-USD.
// Every counter column uses increment semantics on conflict; replaying a
// byte window after a crash therefore requires the cursor commit to ride
// in the same transaction as the delta.

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS usage_cursors (
            source_path TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            device_id INTEGER NOT NULL,
            inode INTEGER NOT NULL,
            offset_bytes INTEGER NOT NULL,
            file_size_bytes INTEGER NOT NULL,
            file_mtime_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_usage (
            session_id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            session_key TEXT,
            source TEXT,
            channel TEXT,
            session_kind TEXT,
            session_class TEXT NOT NULL DEFAULT 'unknown',
            provider_key TEXT NOT NULL DEFAULT 'unknown',
            operation_id TEXT,
            work_order_id TEXT,
            model TEXT,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens INTEGER NOT NULL DEFAULT 0,
            cache_write_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            tool_calls INTEGER NOT NULL DEFAULT 0,
            cost_micros INTEGER NOT NULL DEFAULT 0,
            has_errors INTEGER NOT NULL DEFAULT 0,
            first_seen_at_ms INTEGER,
            last_seen_at_ms INTEGER
        );

        CREATE TABLE IF NOT EXISTS session_daily_usage (
            session_id TEXT NOT NULL,
            day_start_ms INTEGER NOT NULL,
            model_key TEXT NOT NULL,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens INTEGER NOT NULL DEFAULT 0,
            cache_write_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            tool_calls INTEGER NOT NULL DEFAULT 0,
            cost_micros INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, day_start_ms, model_key)
        );

        CREATE TABLE IF NOT EXISTS session_hourly_usage (
            session_id TEXT NOT NULL,
            hour_start_ms INTEGER NOT NULL,
            model_key TEXT NOT NULL,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens INTEGER NOT NULL DEFAULT 0,
            cache_write_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            tool_calls INTEGER NOT NULL DEFAULT 0,
            cost_micros INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, hour_start_ms, model_key)
        );

        CREATE TABLE IF NOT EXISTS session_tool_daily (
            session_id TEXT NOT NULL,
            day_start_ms INTEGER NOT NULL,
            tool_name TEXT NOT NULL,
            call_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, day_start_ms, tool_name)
        );

        CREATE TABLE IF NOT EXISTS session_tool_totals (
            session_id TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            call_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, tool_name)
        );

        CREATE TABLE IF NOT EXISTS leases (
            name TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            acquired_at_ms INTEGER NOT NULL,
            expires_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_sessions (
            session_id TEXT PRIMARY KEY,
            session_key TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            kind TEXT,
            model TEXT,
            state TEXT NOT NULL DEFAULT 'idle',
            updated_at_ms INTEGER NOT NULL,
            last_seen_at_ms INTEGER NOT NULL,
            aborted_last_run INTEGER NOT NULL DEFAULT 0,
            percent_used REAL,
            operation_id TEXT,
            work_order_id TEXT,
            raw_json TEXT
        );

        CREATE TABLE IF NOT EXISTS ops_actionable_events (
            fingerprint TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            job_id TEXT,
            run_at_ms INTEGER,
            team_id TEXT,
            ops_agent_id TEXT,
            relay_key TEXT,
            severity TEXT NOT NULL,
            decision_required INTEGER NOT NULL DEFAULT 0,
            summary TEXT NOT NULL,
            recommendation TEXT,
            evidence TEXT,
            work_order_id TEXT,
            relayed_at_ms INTEGER,
            created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS work_orders (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            title TEXT NOT NULL,
            priority TEXT NOT NULL,
            tags TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS team_governance (
            team_id TEXT PRIMARY KEY,
            ops_agent_template TEXT,
            relay_key TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_cursors_updated ON usage_cursors(updated_at_ms);
        CREATE INDEX IF NOT EXISTS idx_daily_day ON session_daily_usage(day_start_ms);
        CREATE INDEX IF NOT EXISTS idx_hourly_hour ON session_hourly_usage(hour_start_ms);
        CREATE INDEX IF NOT EXISTS idx_tool_daily_day ON session_tool_daily(day_start_ms);
        CREATE INDEX IF NOT EXISTS idx_sessions_agent ON session_usage(agent_id);
        CREATE INDEX IF NOT EXISTS idx_ops_relay ON ops_actionable_events(relayed_at_ms, created_at_ms);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS usage_cursors;
        DROP TABLE IF EXISTS session_usage;
        DROP TABLE IF EXISTS session_daily_usage;
        DROP TABLE IF EXISTS session_hourly_usage;
        DROP TABLE IF EXISTS session_tool_daily;
        DROP TABLE IF EXISTS session_tool_totals;
        DROP TABLE IF EXISTS leases;
        DROP TABLE IF EXISTS agent_sessions;
        DROP TABLE IF EXISTS ops_actionable_events;
        DROP TABLE IF EXISTS work_orders;
        DROP TABLE IF EXISTS team_governance;
        "#,
    )?;
    Ok(())
}
