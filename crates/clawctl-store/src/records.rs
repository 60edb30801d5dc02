use clawctl_types::{SessionClass, SessionIdentity, SessionState, Severity, TokenCounters};

/// Durable read position for one session file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCursorRecord {
    pub source_path: String,
    pub agent_id: String,
    pub session_id: String,
    pub device_id: i64,
    pub inode: i64,
    pub offset_bytes: i64,
    pub file_size_bytes: i64,
    pub file_mtime_ms: i64,
    pub updated_at_ms: i64,
}

/// Lifetime aggregate for one session.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUsageRecord {
    pub session_id: String,
    pub agent_id: String,
    pub identity: SessionIdentity,
    pub session_class: SessionClass,
    pub provider_key: String,
    pub model: Option<String>,
    pub counters: TokenCounters,
    pub cost_micros: i64,
    pub has_errors: bool,
    pub first_seen_at_ms: Option<i64>,
    pub last_seen_at_ms: Option<i64>,
}

/// One `(session, day, model)` usage bucket.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsageRecord {
    pub session_id: String,
    pub day_start_ms: i64,
    pub model_key: String,
    pub counters: TokenCounters,
    pub cost_micros: i64,
}

/// One `(session, hour, model)` usage bucket.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyUsageRecord {
    pub session_id: String,
    pub hour_start_ms: i64,
    pub model_key: String,
    pub counters: TokenCounters,
    pub cost_micros: i64,
}

/// One `(session, day, tool)` call-count bucket.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDailyRecord {
    pub session_id: String,
    pub day_start_ms: i64,
    pub tool_name: String,
    pub call_count: i64,
}

/// Lifetime call count of one tool within one session.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTotalRecord {
    pub session_id: String,
    pub tool_name: String,
    pub call_count: i64,
}

#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub name: String,
    pub owner_id: String,
    pub acquired_at_ms: i64,
    pub expires_at_ms: i64,
}

/// Authoritative record of a dispatched session.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionRecord {
    pub session_id: String,
    pub session_key: String,
    pub agent_id: String,
    pub kind: Option<String>,
    pub model: Option<String>,
    pub state: SessionState,
    pub updated_at_ms: i64,
    pub last_seen_at_ms: i64,
    pub aborted_last_run: bool,
    pub percent_used: Option<f64>,
    pub operation_id: Option<String>,
    pub work_order_id: Option<String>,
    pub raw_json: Option<String>,
}

/// De-duplicated actionable signal from a scheduled job.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsActionableEventRecord {
    pub fingerprint: String,
    pub source: String,
    pub job_id: Option<String>,
    pub run_at_ms: Option<i64>,
    pub team_id: Option<String>,
    pub ops_agent_id: Option<String>,
    pub relay_key: Option<String>,
    pub severity: Severity,
    pub decision_required: bool,
    pub summary: String,
    pub recommendation: Option<String>,
    pub evidence: Option<String>,
    pub work_order_id: Option<String>,
    pub relayed_at_ms: Option<i64>,
    pub created_at_ms: i64,
}

/// Minimal work-order row materialized by the ops intake.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderRecord {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub priority: String,
    pub tags: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct TeamGovernanceRecord {
    pub team_id: String,
    pub ops_agent_template: Option<String>,
    pub relay_key: Option<String>,
}
