use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use clawctl_store::{AgentSessionRecord, Database, queries::agent_session};
use clawctl_types::{
    SessionState, extract_operation_id, extract_work_order_id, parse_timestamp_ms,
};

use crate::{Result, client::OpenclawClient};

/// Completed polls younger than this are reused instead of re-polling.
const GATE_TTL: Duration = Duration::from_secs(4);

/// Sessions idle less than this read as active.
const ACTIVE_AGE_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    pub sessions_upserted: usize,
    /// True when a fresh enough poll was reused.
    pub skipped: bool,
}

/// Highest-priority live state for one agent, derived for a response and
/// never persisted.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverlay {
    pub agent_id: String,
    pub state: SessionState,
    pub session_id: String,
    pub last_seen_at_ms: i64,
}

/// Polls the runtime's status command and reconciles session rows.
///
/// Concurrent callers coalesce: one poll runs at a time and completions
/// within the gate TTL are shared.
pub struct TelemetrySync<'a> {
    db: &'a Database,
    client: OpenclawClient,
    gate: Mutex<Option<(Instant, TelemetryStats)>>,
}

impl<'a> TelemetrySync<'a> {
    pub fn new(db: &'a Database, client: OpenclawClient) -> Self {
        Self {
            db,
            client,
            gate: Mutex::new(None),
        }
    }

    pub async fn sync_agent_sessions(&self) -> Result<TelemetryStats> {
        let mut gate = self.gate.lock().await;
        if let Some((completed_at, stats)) = gate.as_ref() {
            if completed_at.elapsed() < GATE_TTL {
                let mut reused = stats.clone();
                reused.skipped = true;
                return Ok(reused);
            }
        }

        let stats = self.poll_once().await?;
        *gate = Some((Instant::now(), stats.clone()));
        Ok(stats)
    }

    async fn poll_once(&self) -> Result<TelemetryStats> {
        let status = self.client.status_all().await?;
        let now_ms = Utc::now().timestamp_millis();

        let recent = status
            .pointer("/sessions/recent")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut sessions_upserted = 0;
        for entry in &recent {
            if let Some(record) = parse_status_entry(entry, now_ms) {
                agent_session::upsert(self.db.conn(), &record)?;
                sessions_upserted += 1;
            }
        }

        tracing::debug!(sessions_upserted, "agent session telemetry synced");
        Ok(TelemetryStats {
            sessions_upserted,
            skipped: false,
        })
    }
}

/// Map one `sessions.recent[]` entry onto a session row. Entries without
/// a session id are dropped.
pub fn parse_status_entry(entry: &Value, now_ms: i64) -> Option<AgentSessionRecord> {
    let session_id = entry
        .get("sessionId")
        .or_else(|| entry.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    let session_key = entry
        .get("key")
        .or_else(|| entry.get("sessionKey"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let agent_id = entry
        .get("agentId")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("unknown")
        .to_string();

    let updated_at_ms = match entry.get("updatedAt") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(now_ms),
        Some(Value::String(s)) => parse_timestamp_ms(s).unwrap_or(now_ms),
        _ => now_ms,
    };

    let age_ms = entry
        .get("age")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| (now_ms - updated_at_ms).max(0));

    let aborted_last_run = entry
        .get("abortedLastRun")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let state = if aborted_last_run {
        SessionState::Error
    } else if age_ms < ACTIVE_AGE_MS {
        SessionState::Active
    } else {
        SessionState::Idle
    };

    let (operation_id, work_order_id) = resolve_linkage(entry, &session_key);

    Some(AgentSessionRecord {
        session_id,
        session_key,
        agent_id,
        kind: entry.get("kind").and_then(Value::as_str).map(str::to_string),
        model: entry.get("model").and_then(Value::as_str).map(str::to_string),
        state,
        updated_at_ms,
        last_seen_at_ms: updated_at_ms,
        aborted_last_run,
        percent_used: entry.get("percentUsed").and_then(Value::as_f64),
        operation_id,
        work_order_id,
        raw_json: None,
    })
}

/// Linkage priority: metadata, then `op:`/`wo:` flags, then the session
/// key regexes.
fn resolve_linkage(entry: &Value, session_key: &str) -> (Option<String>, Option<String>) {
    let from_metadata = |field: &str| {
        entry
            .pointer(&format!("/metadata/{field}"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let from_flags = |prefix: &str| {
        entry
            .get("flags")
            .and_then(Value::as_array)
            .and_then(|flags| {
                flags.iter().find_map(|f| {
                    f.as_str()
                        .and_then(|s| s.strip_prefix(prefix))
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
            })
    };

    let operation_id = from_metadata("operationId")
        .or_else(|| from_flags("op:"))
        .or_else(|| extract_operation_id(session_key));
    let work_order_id = from_metadata("workOrderId")
        .or_else(|| from_flags("wo:"))
        .or_else(|| extract_work_order_id(session_key));

    (operation_id, work_order_id)
}

/// Per-agent overlay over session rows: `error > active > idle`, ties by
/// recency. Touches only the response, never the store.
pub fn compute_overlay(rows: &[AgentSessionRecord]) -> HashMap<String, AgentOverlay> {
    let mut overlay: HashMap<String, AgentOverlay> = HashMap::new();

    for row in rows {
        let candidate = AgentOverlay {
            agent_id: row.agent_id.clone(),
            state: row.state,
            session_id: row.session_id.clone(),
            last_seen_at_ms: row.last_seen_at_ms,
        };

        match overlay.get(&row.agent_id) {
            Some(current)
                if (current.state.overlay_rank(), current.last_seen_at_ms)
                    >= (candidate.state.overlay_rank(), candidate.last_seen_at_ms) => {}
            _ => {
                overlay.insert(row.agent_id.clone(), candidate);
            }
        }
    }

    overlay
}
