use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use clawctl_store::{
    Database, OpsActionableEventRecord, WorkOrderRecord,
    queries::{governance, ops_event, work_order},
};
use clawctl_types::{Severity, truncate};

use crate::Result;

/// Legacy catch-all owner when neither the payload nor team governance
/// names an ops agent.
const LEGACY_OPS_AGENT: &str = "wf-ops";

pub const MAX_POLL_ITEMS: usize = 100;

const TITLE_SUMMARY_LEN: usize = 80;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntakePayload {
    pub source: Option<String>,
    pub job_id: Option<String>,
    pub run_at_ms: Option<i64>,
    pub team_id: Option<String>,
    pub ops_agent_id: Option<String>,
    pub relay_key: Option<String>,
    pub severity: Option<String>,
    pub decision_required: Option<bool>,
    pub summary: Option<String>,
    pub recommendation: Option<String>,
    pub evidence: Option<Value>,
    pub no_action: Option<bool>,
    pub actionability: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeOutcome {
    pub ignored: bool,
    pub deduped: bool,
    pub created: bool,
    pub fingerprint: Option<String>,
    pub work_order_id: Option<String>,
    pub event: Option<OpsActionableEventRecord>,
}

/// De-dups cron-originated actionable events by fingerprint and
/// materializes at most one work order per fingerprint.
pub struct OpsIntake<'a> {
    db: &'a Database,
}

impl<'a> OpsIntake<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn ingest(&self, payload: IntakePayload) -> Result<IntakeOutcome> {
        if should_ignore(&payload) {
            return Ok(IntakeOutcome {
                ignored: true,
                deduped: false,
                created: false,
                fingerprint: None,
                work_order_id: None,
                event: None,
            });
        }

        let scope = self.resolve_scope(&payload)?;
        let source = payload.source.clone().unwrap_or_else(|| "unknown".to_string());
        let summary = payload.summary.clone().unwrap_or_default();
        let severity = payload
            .severity
            .as_deref()
            .map(Severity::from_str_lossy)
            .unwrap_or(Severity::Medium);

        let fingerprint = compute_fingerprint(
            payload.team_id.as_deref(),
            scope.relay_key.as_deref(),
            &source,
            payload.job_id.as_deref(),
            payload.run_at_ms,
            &summary,
        );

        let record = OpsActionableEventRecord {
            fingerprint: fingerprint.clone(),
            source: source.clone(),
            job_id: payload.job_id.clone(),
            run_at_ms: payload.run_at_ms,
            team_id: payload.team_id.clone(),
            ops_agent_id: Some(scope.ops_agent_id.clone()),
            relay_key: scope.relay_key.clone(),
            severity,
            decision_required: payload.decision_required.unwrap_or(false),
            summary: summary.clone(),
            recommendation: payload.recommendation.clone(),
            evidence: payload.evidence.as_ref().map(|v| v.to_string()),
            work_order_id: None,
            relayed_at_ms: None,
            created_at_ms: Utc::now().timestamp_millis(),
        };

        self.db.with_transaction(|conn| {
            match ops_event::insert(conn, &record)? {
                ops_event::InsertOutcome::Deduped(existing) => Ok(IntakeOutcome {
                    ignored: false,
                    deduped: true,
                    created: false,
                    fingerprint: Some(fingerprint.clone()),
                    work_order_id: existing.work_order_id.clone(),
                    event: Some(existing),
                }),
                ops_event::InsertOutcome::Created(mut created) => {
                    let order = build_work_order(&created, &scope.ops_agent_id);
                    work_order::insert(conn, &order)?;
                    ops_event::set_work_order(conn, &created.fingerprint, &order.id)?;
                    created.work_order_id = Some(order.id.clone());

                    tracing::info!(
                        fingerprint = %created.fingerprint,
                        work_order = %order.id,
                        "actionable event materialized"
                    );

                    Ok(IntakeOutcome {
                        ignored: false,
                        deduped: false,
                        created: true,
                        fingerprint: Some(fingerprint.clone()),
                        work_order_id: Some(order.id),
                        event: Some(created),
                    })
                }
            }
        })
        .map_err(Into::into)
    }

    /// Select and mark up to `max_items` unrelayed events in scope.
    /// Transactional and idempotent; an immediate second call is empty.
    pub fn poll(
        &self,
        max_items: usize,
        team_id: Option<&str>,
        relay_key: Option<&str>,
    ) -> Result<Vec<OpsActionableEventRecord>> {
        let now_ms = Utc::now().timestamp_millis();
        let items = self.db.poll_actionable_events(
            max_items.min(MAX_POLL_ITEMS),
            team_id,
            relay_key,
            now_ms,
        )?;
        Ok(items)
    }

    fn resolve_scope(&self, payload: &IntakePayload) -> Result<ResolvedScope> {
        let team = match payload.team_id.as_deref() {
            Some(team_id) => governance::get(self.db.conn(), team_id)?,
            None => None,
        };

        let ops_agent_id = payload
            .ops_agent_id
            .clone()
            .or_else(|| team.as_ref().and_then(|t| t.ops_agent_template.clone()))
            .unwrap_or_else(|| LEGACY_OPS_AGENT.to_string());

        let relay_key = payload
            .relay_key
            .clone()
            .or_else(|| team.as_ref().and_then(|t| t.relay_key.clone()));

        Ok(ResolvedScope {
            ops_agent_id,
            relay_key,
        })
    }
}

struct ResolvedScope {
    ops_agent_id: String,
    relay_key: Option<String>,
}

fn should_ignore(payload: &IntakePayload) -> bool {
    if payload.no_action == Some(true) {
        return true;
    }
    if payload.actionability.as_deref() == Some("no_action") {
        return true;
    }
    let normalized = payload
        .summary
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase()
        .replace([' ', '-'], "_");
    matches!(normalized.as_str(), "NO_ACTION" | "NO_REPLY")
}

/// `sha256(scopeToken | source | jobId | runAtMs | sha256(summary)[..16])`
/// where the scope token pins the `(team, relay)` pair.
fn compute_fingerprint(
    team_id: Option<&str>,
    relay_key: Option<&str>,
    source: &str,
    job_id: Option<&str>,
    run_at_ms: Option<i64>,
    summary: &str,
) -> String {
    let scope_token = format!(
        "{}|{}",
        team_id.unwrap_or("team:none"),
        relay_key.unwrap_or("relay:none")
    );

    let summary_digest = hex(&Sha256::digest(summary.as_bytes()));
    let run_at = run_at_ms.map(|v| v.to_string()).unwrap_or_default();

    let material = format!(
        "{scope_token}|{source}|{}|{run_at}|{}",
        job_id.unwrap_or(""),
        &summary_digest[..16]
    );
    hex(&Sha256::digest(material.as_bytes()))
}

fn build_work_order(event: &OpsActionableEventRecord, ops_agent_id: &str) -> WorkOrderRecord {
    let mut tags = vec![format!("source:{}", event.source)];
    if let Some(job) = &event.job_id {
        tags.push(format!("job:{job}"));
    }
    if let Some(team) = &event.team_id {
        tags.push(format!("team:{team}"));
    }
    if let Some(relay) = &event.relay_key {
        tags.push(format!("relay:{relay}"));
    }

    WorkOrderRecord {
        id: format!("wo_{}", Uuid::new_v4().simple()),
        agent_id: ops_agent_id.to_string(),
        title: format!(
            "[Ops][{}] {}",
            event.severity.as_str().to_ascii_uppercase(),
            truncate(&event.summary, TITLE_SUMMARY_LEN)
        ),
        priority: event.severity.work_order_priority().to_string(),
        tags: serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string()),
        created_at_ms: Utc::now().timestamp_millis(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
