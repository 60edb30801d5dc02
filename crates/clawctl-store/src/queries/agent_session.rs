use rusqlite::{Connection, OptionalExtension, params};

use clawctl_types::SessionState;

use crate::{Result, records::AgentSessionRecord};

/// Upsert a session row from a telemetry poll or a dispatch.
///
/// The runtime is authoritative for `agent_id` and `session_key`, so they
/// overwrite; linkage and descriptive fields keep the first non-null value
/// seen and are overlaid only by fresh non-null data.
pub fn upsert(conn: &Connection, record: &AgentSessionRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agent_sessions (
            session_id, session_key, agent_id, kind, model, state,
            updated_at_ms, last_seen_at_ms, aborted_last_run, percent_used,
            operation_id, work_order_id, raw_json
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(session_id) DO UPDATE SET
            session_key = excluded.session_key,
            agent_id = excluded.agent_id,
            kind = COALESCE(excluded.kind, agent_sessions.kind),
            model = COALESCE(excluded.model, agent_sessions.model),
            state = excluded.state,
            updated_at_ms = excluded.updated_at_ms,
            last_seen_at_ms = excluded.last_seen_at_ms,
            aborted_last_run = excluded.aborted_last_run,
            percent_used = COALESCE(excluded.percent_used, agent_sessions.percent_used),
            operation_id = COALESCE(excluded.operation_id, agent_sessions.operation_id),
            work_order_id = COALESCE(excluded.work_order_id, agent_sessions.work_order_id),
            raw_json = COALESCE(excluded.raw_json, agent_sessions.raw_json)
        "#,
        params![
            &record.session_id,
            &record.session_key,
            &record.agent_id,
            &record.kind,
            &record.model,
            record.state.as_str(),
            record.updated_at_ms,
            record.last_seen_at_ms,
            record.aborted_last_run as i64,
            record.percent_used,
            &record.operation_id,
            &record.work_order_id,
            &record.raw_json,
        ],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<AgentSessionRecord>> {
    let record = conn
        .query_row(
            &format!("{SELECT} WHERE session_id = ?1"),
            [session_id],
            row_to_record,
        )
        .optional()?;

    Ok(record)
}

pub fn list_all(conn: &Connection) -> Result<Vec<AgentSessionRecord>> {
    let mut stmt = conn.prepare(&format!("{SELECT} ORDER BY last_seen_at_ms DESC"))?;

    let records = stmt
        .query_map([], row_to_record)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(records)
}

const SELECT: &str = r#"
    SELECT session_id, session_key, agent_id, kind, model, state,
           updated_at_ms, last_seen_at_ms, aborted_last_run, percent_used,
           operation_id, work_order_id, raw_json
    FROM agent_sessions
"#;

fn row_to_record(row: &rusqlite::Row<'_>) -> std::result::Result<AgentSessionRecord, rusqlite::Error> {
    Ok(AgentSessionRecord {
        session_id: row.get(0)?,
        session_key: row.get(1)?,
        agent_id: row.get(2)?,
        kind: row.get(3)?,
        model: row.get(4)?,
        state: SessionState::from_str_lossy(&row.get::<_, String>(5)?),
        updated_at_ms: row.get(6)?,
        last_seen_at_ms: row.get(7)?,
        aborted_last_run: row.get::<_, i64>(8)? != 0,
        percent_used: row.get(9)?,
        operation_id: row.get(10)?,
        work_order_id: row.get(11)?,
        raw_json: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn record(session_id: &str, state: SessionState) -> AgentSessionRecord {
        AgentSessionRecord {
            session_id: session_id.to_string(),
            session_key: "agent:a1".to_string(),
            agent_id: "a1".to_string(),
            kind: None,
            model: None,
            state,
            updated_at_ms: 1_000,
            last_seen_at_ms: 1_000,
            aborted_last_run: false,
            percent_used: None,
            operation_id: None,
            work_order_id: None,
            raw_json: None,
        }
    }

    #[test]
    fn test_canonical_fields_overwrite_but_linkage_sticks() {
        let db = Database::open_in_memory().unwrap();

        let mut first = record("s1", SessionState::Active);
        first.operation_id = Some("op1234567890".to_string());
        first.model = Some("claude-sonnet-4".to_string());
        upsert(db.conn(), &first).unwrap();

        let mut second = record("s1", SessionState::Idle);
        second.session_key = "agent:a1:renamed".to_string();
        upsert(db.conn(), &second).unwrap();

        let row = get(db.conn(), "s1").unwrap().unwrap();
        assert_eq!(row.session_key, "agent:a1:renamed");
        assert_eq!(row.state, SessionState::Idle);
        // null poll values never clear earlier linkage or model
        assert_eq!(row.operation_id.as_deref(), Some("op1234567890"));
        assert_eq!(row.model.as_deref(), Some("claude-sonnet-4"));
    }

    #[test]
    fn test_list_all_orders_by_recency() {
        let db = Database::open_in_memory().unwrap();

        let mut old = record("s-old", SessionState::Idle);
        old.last_seen_at_ms = 100;
        let mut new = record("s-new", SessionState::Active);
        new.last_seen_at_ms = 200;
        upsert(db.conn(), &old).unwrap();
        upsert(db.conn(), &new).unwrap();

        let all = list_all(db.conn()).unwrap();
        assert_eq!(all[0].session_id, "s-new");
    }
}
