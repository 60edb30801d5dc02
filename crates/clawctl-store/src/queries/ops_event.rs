use rusqlite::{Connection, OptionalExtension, params};

use clawctl_types::Severity;

use crate::{Error, Result, records::OpsActionableEventRecord};

/// Outcome of inserting an actionable event.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(OpsActionableEventRecord),
    /// A row with this fingerprint already exists.
    Deduped(OpsActionableEventRecord),
}

pub fn insert(conn: &Connection, event: &OpsActionableEventRecord) -> Result<InsertOutcome> {
    let inserted = conn.execute(
        r#"
        INSERT INTO ops_actionable_events (
            fingerprint, source, job_id, run_at_ms, team_id, ops_agent_id,
            relay_key, severity, decision_required, summary, recommendation,
            evidence, work_order_id, relayed_at_ms, created_at_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            &event.fingerprint,
            &event.source,
            &event.job_id,
            event.run_at_ms,
            &event.team_id,
            &event.ops_agent_id,
            &event.relay_key,
            event.severity.as_str(),
            event.decision_required as i64,
            &event.summary,
            &event.recommendation,
            &event.evidence,
            &event.work_order_id,
            event.relayed_at_ms,
            event.created_at_ms,
        ],
    );

    match inserted {
        Ok(_) => Ok(InsertOutcome::Created(event.clone())),
        Err(err) => {
            let err = Error::from(err);
            if err.is_unique_violation() {
                let existing = get_by_fingerprint(conn, &event.fingerprint)?.ok_or_else(|| {
                    Error::Query(format!(
                        "fingerprint conflict without row: {}",
                        event.fingerprint
                    ))
                })?;
                Ok(InsertOutcome::Deduped(existing))
            } else {
                Err(err)
            }
        }
    }
}

pub fn get_by_fingerprint(
    conn: &Connection,
    fingerprint: &str,
) -> Result<Option<OpsActionableEventRecord>> {
    let record = conn
        .query_row(
            &format!("{SELECT} WHERE fingerprint = ?1"),
            [fingerprint],
            row_to_record,
        )
        .optional()?;

    Ok(record)
}

pub fn set_work_order(conn: &Connection, fingerprint: &str, work_order_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE ops_actionable_events SET work_order_id = ?2 WHERE fingerprint = ?1",
        params![fingerprint, work_order_id],
    )?;
    Ok(())
}

/// Select up to `max_items` unrelayed events in scope (oldest first) and
/// mark them relayed. Runs against the caller's transaction; a second call
/// sees `relayed_at_ms` set and returns nothing.
pub fn poll_and_mark_relayed(
    conn: &Connection,
    max_items: usize,
    team_id: Option<&str>,
    relay_key: Option<&str>,
    now_ms: i64,
) -> Result<Vec<OpsActionableEventRecord>> {
    let mut sql = format!(
        "{SELECT} WHERE relayed_at_ms IS NULL"
    );
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(team) = team_id {
        sql.push_str(" AND team_id = ?");
        bind.push(Box::new(team.to_string()));
    }
    if let Some(relay) = relay_key {
        sql.push_str(" AND relay_key = ?");
        bind.push(Box::new(relay.to_string()));
    }
    sql.push_str(" ORDER BY created_at_ms ASC LIMIT ?");
    bind.push(Box::new(max_items as i64));

    let mut stmt = conn.prepare(&sql)?;
    let bind_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt
        .query_map(bind_refs.as_slice(), row_to_record)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    for row in &mut rows {
        let updated = conn.execute(
            "UPDATE ops_actionable_events SET relayed_at_ms = ?2 WHERE fingerprint = ?1 AND relayed_at_ms IS NULL",
            params![&row.fingerprint, now_ms],
        )?;
        if updated > 0 {
            row.relayed_at_ms = Some(now_ms);
        }
    }

    Ok(rows)
}

const SELECT: &str = r#"
    SELECT fingerprint, source, job_id, run_at_ms, team_id, ops_agent_id,
           relay_key, severity, decision_required, summary, recommendation,
           evidence, work_order_id, relayed_at_ms, created_at_ms
    FROM ops_actionable_events
"#;

fn row_to_record(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<OpsActionableEventRecord, rusqlite::Error> {
    Ok(OpsActionableEventRecord {
        fingerprint: row.get(0)?,
        source: row.get(1)?,
        job_id: row.get(2)?,
        run_at_ms: row.get(3)?,
        team_id: row.get(4)?,
        ops_agent_id: row.get(5)?,
        relay_key: row.get(6)?,
        severity: Severity::from_str_lossy(&row.get::<_, String>(7)?),
        decision_required: row.get::<_, i64>(8)? != 0,
        summary: row.get(9)?,
        recommendation: row.get(10)?,
        evidence: row.get(11)?,
        work_order_id: row.get(12)?,
        relayed_at_ms: row.get(13)?,
        created_at_ms: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn event(fingerprint: &str, created_at_ms: i64) -> OpsActionableEventRecord {
        OpsActionableEventRecord {
            fingerprint: fingerprint.to_string(),
            source: "cron".to_string(),
            job_id: Some("job_1".to_string()),
            run_at_ms: Some(1_000),
            team_id: None,
            ops_agent_id: Some("wf-ops".to_string()),
            relay_key: None,
            severity: Severity::High,
            decision_required: false,
            summary: "Gateway errors spiked".to_string(),
            recommendation: Some("Rollback".to_string()),
            evidence: None,
            work_order_id: None,
            relayed_at_ms: None,
            created_at_ms,
        }
    }

    #[test]
    fn test_insert_then_dedup() {
        let db = Database::open_in_memory().unwrap();

        match insert(db.conn(), &event("fp1", 10)).unwrap() {
            InsertOutcome::Created(_) => {}
            InsertOutcome::Deduped(_) => panic!("first insert must create"),
        }

        match insert(db.conn(), &event("fp1", 20)).unwrap() {
            InsertOutcome::Deduped(existing) => assert_eq!(existing.created_at_ms, 10),
            InsertOutcome::Created(_) => panic!("second insert must dedup"),
        }
    }

    #[test]
    fn test_poll_marks_and_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &event("fp1", 10)).unwrap();
        insert(db.conn(), &event("fp2", 20)).unwrap();

        let first = poll_and_mark_relayed(db.conn(), 10, None, None, 99).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].fingerprint, "fp1");
        assert_eq!(first[0].relayed_at_ms, Some(99));

        let second = poll_and_mark_relayed(db.conn(), 10, None, None, 100).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_poll_scope_filter() {
        let db = Database::open_in_memory().unwrap();
        let mut scoped = event("fp-team", 10);
        scoped.team_id = Some("team_b".to_string());
        insert(db.conn(), &scoped).unwrap();
        insert(db.conn(), &event("fp-global", 20)).unwrap();

        let items = poll_and_mark_relayed(db.conn(), 10, Some("team_b"), None, 99).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].fingerprint, "fp-team");

        // the unscoped row is still pending
        let rest = poll_and_mark_relayed(db.conn(), 10, None, None, 100).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].fingerprint, "fp-global");
    }

    #[test]
    fn test_poll_respects_limit() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            insert(db.conn(), &event(&format!("fp{i}"), i)).unwrap();
        }

        let items = poll_and_mark_relayed(db.conn(), 2, None, None, 99).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].fingerprint, "fp0");
        assert_eq!(items[1].fingerprint, "fp1");
    }
}
