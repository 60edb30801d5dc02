// Plain-text rendering for `--format plain`. One value type, one
// renderer; JSON output bypasses this module entirely.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};

use clawctl_engine::{
    ActivityResult, BreakdownResult, OptionsResult, ParityScope, SessionsPage, SummaryResult,
    SyncStats,
};
use clawctl_runtime::{
    AgentOverlay, IntakeOutcome, ModelInfo, ProviderAuth, SpawnResult, TelemetryStats,
};
use clawctl_store::{AgentSessionRecord, OpsActionableEventRecord};

pub fn sync_stats(stats: &SyncStats) -> String {
    if !stats.lock_acquired {
        return "sync skipped: another run holds the usage.sync lease".to_string();
    }
    format!(
        "scanned {} of {} files ({} updated, {} sessions, {} cursor resets)\n\
         coverage {:.2}% ({} remaining), {}ms",
        stats.files_scanned,
        stats.files_total,
        stats.files_updated,
        stats.sessions_updated,
        stats.cursor_resets,
        stats.coverage_pct,
        stats.files_remaining,
        stats.duration_ms,
    )
}

pub fn parity_scope(scope: &ParityScope) -> String {
    let mut out = format!(
        "{} sessions in range, sampled {} (limit {}), {} missing coverage",
        scope.sessions_in_range_total,
        scope.sampled_count,
        scope.session_limit,
        scope.missing_coverage_count,
    );
    for path in &scope.priority_paths {
        out.push_str("\n  needs ingest: ");
        out.push_str(path);
    }
    out
}

pub fn summary(result: &SummaryResult) -> String {
    let totals = &result.totals;
    let mut out = format!(
        "{} sessions, {} tokens, {} (cache efficiency {:.1}%)\n\
         per day: {} tokens, {}",
        totals.session_count,
        totals.counters.total_tokens,
        usd(totals.cost_micros),
        totals.cache_efficiency_pct,
        totals.avg_tokens_per_day,
        usd(totals.avg_cost_micros_per_day),
    );
    for point in &result.series {
        out.push_str(&format!(
            "\n  {}  {:>12} tokens  {}",
            day(point.day_start_ms),
            point.counters.total_tokens,
            usd(point.cost_micros),
        ));
    }
    out
}

pub fn breakdown(result: &BreakdownResult) -> String {
    let mut out = format!("by {}:", result.group_by);
    for group in &result.groups {
        out.push_str(&format!(
            "\n  {:<32} {:>12} tokens  {}  ({} sessions)",
            group.key,
            group.counters.total_tokens,
            usd(group.cost_micros),
            group.session_count,
        ));
    }
    out
}

pub fn activity(result: &ActivityResult) -> String {
    let mut out = format!("activity ({}):", result.timezone);
    for bucket in &result.weekdays {
        out.push_str(&format!(
            "\n  {:<9} {:>12} tokens  {}",
            bucket.weekday,
            bucket.counters.total_tokens,
            usd(bucket.cost_micros),
        ));
    }
    for bucket in &result.hours {
        out.push_str(&format!(
            "\n  {:02}:00     {:>12} tokens  {}",
            bucket.hour,
            bucket.counters.total_tokens,
            usd(bucket.cost_micros),
        ));
    }
    out
}

pub fn sessions_page(page: &SessionsPage) -> String {
    let mut out = format!(
        "page {} ({} per page, {} total)",
        page.page, page.page_size, page.total_sessions,
    );
    for item in &page.items {
        out.push_str(&format!(
            "\n  {}  [{}] {:>12} tokens  {}  {}",
            item.session_id,
            item.agent_id,
            item.counters.total_tokens,
            usd(item.cost_micros),
            item.models.join(", "),
        ));
    }
    out
}

pub fn options(result: &OptionsResult) -> String {
    [
        ("agents", &result.agents),
        ("models", &result.models),
        ("providers", &result.providers),
        ("sources", &result.sources),
        ("channels", &result.channels),
        ("classes", &result.session_classes),
        ("tools", &result.tools),
    ]
    .iter()
    .map(|(label, values)| format!("{label}: {}", values.join(", ")))
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn telemetry(stats: &TelemetryStats) -> String {
    if stats.skipped {
        format!("reused recent poll ({} sessions)", stats.sessions_upserted)
    } else {
        format!("polled runtime, {} sessions upserted", stats.sessions_upserted)
    }
}

pub fn session_list(
    rows: &[AgentSessionRecord],
    overlay: &HashMap<String, AgentOverlay>,
) -> String {
    if rows.is_empty() {
        return "no sessions".to_string();
    }
    let mut out = String::new();
    for row in rows {
        let live = overlay
            .get(&row.agent_id)
            .filter(|o| o.session_id == row.session_id)
            .map(|_| " *")
            .unwrap_or("");
        out.push_str(&format!(
            "{}  [{}] {} {}{}\n",
            row.session_id,
            row.agent_id,
            row.state.as_str(),
            row.session_key,
            live,
        ));
    }
    out.pop();
    out
}

pub fn spawn_result(result: &SpawnResult) -> String {
    match &result.session_id {
        Some(id) => format!("spawned {} as {}", result.session_key, id),
        None => format!("spawned {} (no session id reported)", result.session_key),
    }
}

pub fn intake_outcome(outcome: &IntakeOutcome) -> String {
    if outcome.ignored {
        return "ignored (not actionable)".to_string();
    }
    let fingerprint = outcome.fingerprint.as_deref().unwrap_or("?");
    if outcome.deduped {
        return format!("deduped against {fingerprint}");
    }
    format!(
        "created {} -> work order {}",
        fingerprint,
        outcome.work_order_id.as_deref().unwrap_or("?"),
    )
}

pub fn actionable_events(items: &[OpsActionableEventRecord]) -> String {
    if items.is_empty() {
        return "nothing to relay".to_string();
    }
    items
        .iter()
        .map(|item| {
            format!(
                "[{}] {}  ({} -> {})",
                item.severity.as_str(),
                item.summary,
                item.source,
                item.ops_agent_id.as_deref().unwrap_or("?"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn model_list(models: &[ModelInfo]) -> String {
    if models.is_empty() {
        return "no models".to_string();
    }
    models
        .iter()
        .map(|m| format!("{:<40} {}", m.key, m.provider_key))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn provider_auth(status: &[ProviderAuth]) -> String {
    if status.is_empty() {
        return "no providers".to_string();
    }
    status
        .iter()
        .map(|s| {
            format!(
                "{:<16} auth={} oauth={}",
                s.provider, s.authenticated, s.oauth,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn usd(micros: i64) -> String {
    format!("${:.6}", micros as f64 / 1_000_000.0)
}

fn day(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ms.to_string())
}
