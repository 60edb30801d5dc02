use std::collections::BTreeMap;

use clawctl_types::{
    SessionClass, SessionIdentity, TokenCounters, UsageEvent, day_start_ms, hour_start_ms,
    model_key, provider_key,
};

use clawctl_store::{
    DailyUsageRecord, HourlyUsageRecord, SessionDeltaRows, SessionUsageRecord, ToolDailyRecord,
    ToolTotalRecord,
};

#[derive(Debug, Clone, Copy, Default)]
struct BucketDelta {
    counters: TokenCounters,
    cost_micros: i64,
}

/// In-memory fold of one ingestion pass over one file.
///
/// Commutative with other deltas for the same session: counters add,
/// identity keeps the first non-empty hit, timestamps min/max.
#[derive(Debug, Default)]
pub struct SessionDelta {
    counters: TokenCounters,
    cost_micros: i64,
    identity: SessionIdentity,
    class: SessionClass,
    model: Option<String>,
    has_errors: bool,
    first_seen_at_ms: Option<i64>,
    last_seen_at_ms: Option<i64>,
    daily: BTreeMap<(i64, String), BucketDelta>,
    hourly: BTreeMap<(i64, String), BucketDelta>,
    tool_daily: BTreeMap<(i64, String), i64>,
    tool_totals: BTreeMap<String, i64>,
}

impl SessionDelta {
    pub fn new() -> SessionDelta {
        SessionDelta::default()
    }

    /// Fold one accepted event. Events without a usable timestamp take
    /// `fallback_ts_ms` (the file mtime at stat time).
    pub fn fold(&mut self, event: &UsageEvent, fallback_ts_ms: i64) {
        let ts = if event.seen_at_ms > 0 {
            event.seen_at_ms
        } else {
            fallback_ts_ms
        };

        let counters = event.counters();
        self.counters.add(&counters);
        self.cost_micros = self.cost_micros.saturating_add(event.cost_micros);
        self.has_errors |= event.has_error;

        self.first_seen_at_ms = Some(self.first_seen_at_ms.map_or(ts, |t| t.min(ts)));
        self.last_seen_at_ms = Some(self.last_seen_at_ms.map_or(ts, |t| t.max(ts)));

        self.identity.coalesce_from(&event.identity);
        self.class = self.class.merge(event.identity.classify());

        if self.model.is_none() {
            if let Some(m) = event.model.as_deref() {
                if !m.trim().is_empty() {
                    self.model = Some(m.to_string());
                }
            }
        }

        // bucket rows only exist for events that actually consumed something
        if !counters.is_empty() || event.cost_micros > 0 {
            let key = model_key(event.model.as_deref());

            let day = self.daily.entry((day_start_ms(ts), key.clone())).or_default();
            day.counters.add(&counters);
            day.cost_micros = day.cost_micros.saturating_add(event.cost_micros);

            let hour = self.hourly.entry((hour_start_ms(ts), key)).or_default();
            hour.counters.add(&counters);
            hour.cost_micros = hour.cost_micros.saturating_add(event.cost_micros);
        }

        for tool in &event.tool_calls {
            *self
                .tool_daily
                .entry((day_start_ms(ts), tool.clone()))
                .or_default() += 1;
            *self.tool_totals.entry(tool.clone()).or_default() += 1;
        }
    }

    /// A delta is empty when nothing would change on commit: no counter,
    /// no bucket entry, no identity hint, no error bit.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.cost_micros == 0
            && self.identity.is_empty()
            && !self.has_errors
            && self.daily.is_empty()
            && self.tool_daily.is_empty()
            && self.first_seen_at_ms.is_none()
    }

    pub fn tool_count(&self) -> usize {
        self.tool_totals.len()
    }

    /// Materialize store rows for one `(agent, session)`.
    pub fn into_rows(self, agent_id: &str, session_id: &str) -> SessionDeltaRows {
        if self.is_empty() {
            return SessionDeltaRows::default();
        }

        let provider = self
            .model
            .as_deref()
            .map(provider_key)
            .unwrap_or_else(|| "unknown".to_string());

        let aggregate = SessionUsageRecord {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            identity: self.identity,
            session_class: self.class,
            provider_key: provider,
            model: self.model,
            counters: self.counters,
            cost_micros: self.cost_micros,
            has_errors: self.has_errors,
            first_seen_at_ms: self.first_seen_at_ms,
            last_seen_at_ms: self.last_seen_at_ms,
        };

        SessionDeltaRows {
            aggregate: Some(aggregate),
            daily: self
                .daily
                .into_iter()
                .map(|((day_start_ms, model_key), b)| DailyUsageRecord {
                    session_id: session_id.to_string(),
                    day_start_ms,
                    model_key,
                    counters: b.counters,
                    cost_micros: b.cost_micros,
                })
                .collect(),
            hourly: self
                .hourly
                .into_iter()
                .map(|((hour_start_ms, model_key), b)| HourlyUsageRecord {
                    session_id: session_id.to_string(),
                    hour_start_ms,
                    model_key,
                    counters: b.counters,
                    cost_micros: b.cost_micros,
                })
                .collect(),
            tool_daily: self
                .tool_daily
                .into_iter()
                .map(|((day_start_ms, tool_name), call_count)| ToolDailyRecord {
                    session_id: session_id.to_string(),
                    day_start_ms,
                    tool_name,
                    call_count,
                })
                .collect(),
            tool_totals: self
                .tool_totals
                .into_iter()
                .map(|(tool_name, call_count)| ToolTotalRecord {
                    session_id: session_id.to_string(),
                    tool_name,
                    call_count,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawctl_usage::parse_line;

    fn ts(s: &str) -> i64 {
        clawctl_types::parse_timestamp_ms(s).unwrap()
    }

    #[test]
    fn test_fold_two_lines_matches_expected_buckets() {
        // warm-ingest shape: one model-tagged line, one untagged costed line
        let mut delta = SessionDelta::new();
        let a = parse_line(
            r#"{"usage":{"inputTokens":100,"outputTokens":50},"model":"anthropic/claude-sonnet-4","timestamp":"2026-02-01T10:00:00Z"}"#,
        )
        .unwrap();
        let b = parse_line(
            r#"{"usage":{"totalTokens":200,"cost":{"total":0.001}},"timestamp":"2026-02-01T11:30:00Z"}"#,
        )
        .unwrap();
        delta.fold(&a, 0);
        delta.fold(&b, 0);

        let rows = delta.into_rows("a1", "s1");
        let aggregate = rows.aggregate.unwrap();
        assert_eq!(aggregate.counters.input_tokens, 100);
        assert_eq!(aggregate.counters.output_tokens, 50);
        assert_eq!(aggregate.counters.total_tokens, 350);
        assert_eq!(aggregate.cost_micros, 1000);
        assert_eq!(aggregate.provider_key, "anthropic");
        assert_eq!(aggregate.first_seen_at_ms, Some(ts("2026-02-01T10:00:00Z")));
        assert_eq!(aggregate.last_seen_at_ms, Some(ts("2026-02-01T11:30:00Z")));

        let day = day_start_ms(ts("2026-02-01T10:00:00Z"));
        assert_eq!(rows.daily.len(), 2);
        let tagged = rows
            .daily
            .iter()
            .find(|r| r.model_key == "anthropic/claude-sonnet-4")
            .unwrap();
        assert_eq!(tagged.day_start_ms, day);
        assert_eq!(tagged.counters.total_tokens, 150);

        let untagged = rows.daily.iter().find(|r| r.model_key == "unknown").unwrap();
        assert_eq!(untagged.counters.total_tokens, 200);
        assert_eq!(untagged.cost_micros, 1000);

        // hourly buckets split by hour
        assert_eq!(rows.hourly.len(), 2);
    }

    #[test]
    fn test_fold_tool_calls() {
        let mut delta = SessionDelta::new();
        let event = parse_line(
            r#"{"toolCalls":["read_file","write_file","read_file"],"timestamp":"2026-02-01T10:00:00Z"}"#,
        )
        .unwrap();
        delta.fold(&event, 0);
        delta.fold(&event, 0);

        let rows = delta.into_rows("a1", "s1");
        // dedup within an event, additive across events
        assert_eq!(rows.tool_totals.len(), 2);
        let read = rows.tool_totals.iter().find(|t| t.tool_name == "read_file").unwrap();
        assert_eq!(read.call_count, 2);
        assert_eq!(rows.tool_daily.len(), 2);
        assert_eq!(rows.aggregate.unwrap().counters.tool_calls, 4);
    }

    #[test]
    fn test_identity_first_non_null_and_class() {
        let mut delta = SessionDelta::new();
        let first = parse_line(r#"{"usage":{"inputTokens":1},"sessionKey":"web:u1"}"#).unwrap();
        let second =
            parse_line(r#"{"usage":{"inputTokens":1},"sessionKey":"cron:tick"}"#).unwrap();
        delta.fold(&first, 100);
        delta.fold(&second, 200);

        let rows = delta.into_rows("a1", "s1");
        let aggregate = rows.aggregate.unwrap();
        assert_eq!(aggregate.identity.session_key.as_deref(), Some("web:u1"));
        // the cron-marked event still elevates the class
        assert_eq!(aggregate.session_class, SessionClass::BackgroundCron);
    }

    #[test]
    fn test_fallback_timestamp_used_when_event_has_none() {
        let mut delta = SessionDelta::new();
        let event = parse_line(r#"{"usage":{"inputTokens":5}}"#).unwrap();
        delta.fold(&event, ts("2026-03-01T00:30:00Z"));

        let rows = delta.into_rows("a1", "s1");
        assert_eq!(
            rows.daily[0].day_start_ms,
            day_start_ms(ts("2026-03-01T00:30:00Z"))
        );
    }

    #[test]
    fn test_error_only_event_is_non_empty_but_bucketless() {
        let mut delta = SessionDelta::new();
        let event = parse_line(r#"{"level":"error"}"#).unwrap();
        delta.fold(&event, 1_000);

        assert!(!delta.is_empty());
        let rows = delta.into_rows("a1", "s1");
        let aggregate = rows.aggregate.unwrap();
        assert!(aggregate.has_errors);
        assert!(rows.daily.is_empty());
    }

    #[test]
    fn test_empty_delta() {
        let delta = SessionDelta::new();
        assert!(delta.is_empty());
        assert!(delta.into_rows("a1", "s1").aggregate.is_none());
    }
}
