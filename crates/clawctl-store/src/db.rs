use std::path::Path;

use rusqlite::Connection;

use crate::{
    Result,
    records::{
        DailyUsageRecord, HourlyUsageRecord, OpsActionableEventRecord, SessionUsageRecord,
        ToolDailyRecord, ToolTotalRecord, UsageCursorRecord,
    },
    schema,
};

/// Everything one ingestion pass over one file produced, committed as a
/// single transaction together with the advanced cursor. Splitting the
/// commit would double-count events replayed after a crash.
#[derive(Debug, Default)]
pub struct SessionDeltaRows {
    pub aggregate: Option<SessionUsageRecord>,
    pub daily: Vec<DailyUsageRecord>,
    pub hourly: Vec<HourlyUsageRecord>,
    pub tool_daily: Vec<ToolDailyRecord>,
    pub tool_totals: Vec<ToolTotalRecord>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction; commit on `Ok`, roll back on `Err`.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Commit one file's delta and its advanced cursor atomically.
    pub fn commit_session_delta(
        &self,
        delta: &SessionDeltaRows,
        cursor: &UsageCursorRecord,
    ) -> Result<()> {
        self.with_transaction(|conn| {
            if let Some(ref aggregate) = delta.aggregate {
                crate::queries::usage::upsert_aggregate(conn, aggregate)?;
            }
            for row in &delta.daily {
                crate::queries::usage::increment_daily(conn, row)?;
            }
            for row in &delta.hourly {
                crate::queries::usage::increment_hourly(conn, row)?;
            }
            for row in &delta.tool_daily {
                crate::queries::usage::increment_tool_daily(conn, row)?;
            }
            for row in &delta.tool_totals {
                crate::queries::usage::increment_tool_total(conn, row)?;
            }
            crate::queries::cursor::upsert(conn, cursor)?;
            Ok(())
        })
    }

    /// Transactional poll-and-mark for the ops relay; an immediate
    /// second call returns nothing.
    pub fn poll_actionable_events(
        &self,
        max_items: usize,
        team_id: Option<&str>,
        relay_key: Option<&str>,
        now_ms: i64,
    ) -> Result<Vec<OpsActionableEventRecord>> {
        self.with_transaction(|conn| {
            crate::queries::ops_event::poll_and_mark_relayed(conn, max_items, team_id, relay_key, now_ms)
        })
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute("VACUUM", [])?;
        Ok(())
    }
}
