use std::collections::BTreeSet;

use serde_json::Value;

use clawctl_types::{
    SessionIdentity, UsageEvent, extract_operation_id, extract_work_order_id, parse_timestamp_ms,
};

use crate::coerce::{as_count, as_usd_micros, first_key, first_string};

const TIMESTAMP_KEYS: [&str; 5] = ["timestamp", "ts", "seenAt", "time", "at"];

const INPUT_KEYS: [&str; 2] = ["inputTokens", "input_tokens"];
const OUTPUT_KEYS: [&str; 2] = ["outputTokens", "output_tokens"];
const CACHE_READ_KEYS: [&str; 3] = [
    "cacheReadTokens",
    "cache_read_tokens",
    "cache_read_input_tokens",
];
const CACHE_WRITE_KEYS: [&str; 3] = [
    "cacheWriteTokens",
    "cache_write_tokens",
    "cache_creation_input_tokens",
];
const TOTAL_KEYS: [&str; 2] = ["totalTokens", "total_tokens"];

/// Parse one JSONL line into a typed usage event.
///
/// Returns `None` for blank lines, non-object JSON, and lines carrying no
/// usage, no tool calls, and no error markers. Never fails on a bad line.
pub fn parse_line(line: &str) -> Option<UsageEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let root: Value = serde_json::from_str(line).ok()?;
    if !root.is_object() {
        return None;
    }

    let usage = find_usage(&root);
    let tool_calls = collect_tool_calls(&root);
    let has_error = detect_error(&root);

    if usage.is_none() && tool_calls.is_empty() && !has_error {
        return None;
    }

    let mut event = UsageEvent {
        seen_at_ms: extract_timestamp(&root),
        model: first_string(&root, &[&["model"], &["message", "model"], &["payload", "model"]])
            .map(str::to_string),
        identity: extract_identity(&root),
        tool_calls,
        has_error,
        has_usage: usage.is_some(),
        ..Default::default()
    };

    if let Some(usage) = usage {
        event.input_tokens = first_key(usage, &INPUT_KEYS).map(as_count).unwrap_or(0);
        event.output_tokens = first_key(usage, &OUTPUT_KEYS).map(as_count).unwrap_or(0);
        event.cache_read_tokens = first_key(usage, &CACHE_READ_KEYS).map(as_count).unwrap_or(0);
        event.cache_write_tokens = first_key(usage, &CACHE_WRITE_KEYS).map(as_count).unwrap_or(0);

        // Explicit totals are trusted even when they disagree with the
        // component sum; otherwise the total is the sum.
        event.total_tokens = match first_key(usage, &TOTAL_KEYS) {
            Some(v) => as_count(v),
            None => {
                event.input_tokens
                    + event.output_tokens
                    + event.cache_read_tokens
                    + event.cache_write_tokens
            }
        };

        event.cost_micros = extract_cost(usage).or_else(|| root.get("cost").map(cost_value_micros)).unwrap_or(0);
    } else {
        event.cost_micros = root.get("cost").map(cost_value_micros).unwrap_or(0);
    }

    Some(event)
}

/// Usage payloads appear top-level, under `message`, or under `payload`.
fn find_usage(root: &Value) -> Option<&Value> {
    [&["usage"][..], &["message", "usage"], &["payload", "usage"]]
        .iter()
        .find_map(|path| {
            let mut cur = root;
            for seg in *path {
                cur = cur.get(seg)?;
            }
            cur.is_object().then_some(cur)
        })
}

fn extract_timestamp(root: &Value) -> i64 {
    for key in TIMESTAMP_KEYS {
        if let Some(v) = root.get(key) {
            match v {
                Value::String(s) => {
                    if let Some(ms) = parse_timestamp_ms(s) {
                        return ms;
                    }
                }
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        return if i >= 1_000_000_000_000 { i } else { i * 1000 };
                    }
                }
                _ => {}
            }
        }
    }
    0
}

fn extract_cost(usage: &Value) -> Option<i64> {
    usage.get("cost").map(cost_value_micros)
}

/// Cost shapes: scalar USD, `{total}`, or component sum.
fn cost_value_micros(cost: &Value) -> i64 {
    match cost {
        Value::Object(map) => {
            if let Some(total) = map.get("total") {
                return as_usd_micros(total);
            }
            ["input", "output", "cacheRead", "cacheWrite"]
                .iter()
                .filter_map(|k| map.get(*k))
                .map(as_usd_micros)
                .sum()
        }
        other => as_usd_micros(other),
    }
}

fn collect_tool_calls(root: &Value) -> Vec<String> {
    let mut set = BTreeSet::new();

    for path in [&["toolCalls"][..], &["message", "toolCalls"], &["payload", "toolCalls"]] {
        let mut cur = root;
        let mut found = true;
        for seg in path {
            match cur.get(seg) {
                Some(next) => cur = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        if let Some(items) = cur.as_array() {
            for item in items {
                let name = match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(_) => item
                        .get("name")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("tool").and_then(Value::as_str)),
                    _ => None,
                };
                if let Some(name) = name {
                    let name = name.trim().to_ascii_lowercase();
                    if !name.is_empty() {
                        set.insert(name);
                    }
                }
            }
        }
    }

    set.into_iter().collect()
}

fn detect_error(root: &Value) -> bool {
    if let Some(level) = root.get("level").and_then(Value::as_str) {
        let level = level.to_ascii_lowercase();
        if level == "error" || level == "fatal" {
            return true;
        }
    }

    if let Some(ty) = root.get("type").and_then(Value::as_str) {
        let ty = ty.to_ascii_lowercase();
        if ty.contains("error") || ty.contains("exception") || ty.contains("failed") {
            return true;
        }
    }

    if root.get("error").is_some() || root.get("err").is_some() || root.get("exception").is_some() {
        return true;
    }

    // system-role lines whose content mentions an error
    let role = root
        .get("role")
        .and_then(Value::as_str)
        .or_else(|| first_string(root, &[&["message", "role"]]));
    if role == Some("system") {
        let content = first_string(root, &[&["content"], &["message", "content"]]);
        if let Some(content) = content {
            if content.to_ascii_lowercase().contains("error") {
                return true;
            }
        }
    }

    false
}

fn extract_identity(root: &Value) -> SessionIdentity {
    let session_key = first_string(
        root,
        &[
            &["sessionKey"],
            &["session_key"],
            &["meta", "sessionKey"],
            &["metadata", "sessionKey"],
            &["payload", "sessionKey"],
        ],
    )
    .map(str::to_string);

    let mut operation_id = first_string(
        root,
        &[
            &["operationId"],
            &["operation_id"],
            &["metadata", "operationId"],
            &["payload", "operationId"],
        ],
    )
    .map(str::to_string);

    let mut work_order_id = first_string(
        root,
        &[
            &["workOrderId"],
            &["work_order_id"],
            &["metadata", "workOrderId"],
            &["payload", "workOrderId"],
        ],
    )
    .map(str::to_string);

    // linkage ids can also ride inside the session key itself
    if let Some(key) = session_key.as_deref() {
        if operation_id.is_none() {
            operation_id = extract_operation_id(key);
        }
        if work_order_id.is_none() {
            work_order_id = extract_work_order_id(key);
        }
    }

    SessionIdentity {
        session_key,
        source: first_string(
            root,
            &[&["source"], &["metadata", "source"], &["payload", "source"]],
        )
        .map(str::to_string),
        channel: first_string(
            root,
            &[&["channel"], &["metadata", "channel"], &["payload", "channel"]],
        )
        .map(str::to_string),
        session_kind: first_string(root, &[&["sessionKind"], &["kind"]]).map(str::to_string),
        operation_id,
        work_order_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_and_malformed() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line("[1,2,3]").is_none());
        assert!(parse_line("42").is_none());
    }

    #[test]
    fn test_rejects_line_with_nothing_usable() {
        assert!(parse_line(r#"{"type":"message","content":"hi"}"#).is_none());
    }

    #[test]
    fn test_top_level_usage() {
        let event = parse_line(
            r#"{"usage":{"inputTokens":100,"outputTokens":50},"model":"anthropic/claude-sonnet-4","timestamp":"2026-02-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(event.has_usage);
        assert_eq!(event.input_tokens, 100);
        assert_eq!(event.output_tokens, 50);
        assert_eq!(event.total_tokens, 150);
        assert_eq!(event.model.as_deref(), Some("anthropic/claude-sonnet-4"));
        assert!(event.seen_at_ms > 0);
    }

    #[test]
    fn test_explicit_total_and_cost_object() {
        let event =
            parse_line(r#"{"usage":{"totalTokens":200,"cost":{"total":0.001}}}"#).unwrap();
        assert_eq!(event.total_tokens, 200);
        assert_eq!(event.cost_micros, 1000);
        assert_eq!(event.input_tokens, 0);
    }

    #[test]
    fn test_explicit_total_trusted_over_component_sum() {
        let event = parse_line(
            r#"{"usage":{"inputTokens":10,"outputTokens":10,"totalTokens":999}}"#,
        )
        .unwrap();
        assert_eq!(event.total_tokens, 999);
    }

    #[test]
    fn test_usage_under_message_and_payload() {
        let a = parse_line(r#"{"message":{"usage":{"input_tokens":7}}}"#).unwrap();
        assert_eq!(a.input_tokens, 7);
        let b = parse_line(r#"{"payload":{"usage":{"outputTokens":"12"}}}"#).unwrap();
        assert_eq!(b.output_tokens, 12);
    }

    #[test]
    fn test_cost_scalar_and_component_sum() {
        let scalar = parse_line(r#"{"usage":{"inputTokens":1,"cost":0.5}}"#).unwrap();
        assert_eq!(scalar.cost_micros, 500_000);

        let parts = parse_line(
            r#"{"usage":{"inputTokens":1,"cost":{"input":0.001,"output":0.002,"cacheRead":0.0005}}}"#,
        )
        .unwrap();
        assert_eq!(parts.cost_micros, 3500);
    }

    #[test]
    fn test_tool_calls_lowercased_deduped() {
        let event = parse_line(
            r#"{"toolCalls":[" Read_File ","read_file",{"name":"Bash"},{"tool":"grep"}]}"#,
        )
        .unwrap();
        assert_eq!(event.tool_calls, vec!["bash", "grep", "read_file"]);
        assert!(!event.has_usage);
    }

    #[test]
    fn test_error_markers() {
        assert!(parse_line(r#"{"level":"error"}"#).unwrap().has_error);
        assert!(parse_line(r#"{"level":"fatal"}"#).unwrap().has_error);
        assert!(parse_line(r#"{"type":"tool_failed"}"#).unwrap().has_error);
        assert!(parse_line(r#"{"error":{"message":"boom"}}"#).unwrap().has_error);
        assert!(
            parse_line(r#"{"role":"system","content":"Error: rate limited"}"#)
                .unwrap()
                .has_error
        );
        // system content without the word is not an error marker
        assert!(parse_line(r#"{"role":"system","content":"all good"}"#).is_none());
    }

    #[test]
    fn test_identity_extraction_with_regex_fallback() {
        let event = parse_line(
            r#"{"usage":{"inputTokens":1},"sessionKey":"agent:builder:wo:wo1234567890:op:op9876543210","channel":"slack"}"#,
        )
        .unwrap();
        assert_eq!(
            event.identity.session_key.as_deref(),
            Some("agent:builder:wo:wo1234567890:op:op9876543210")
        );
        assert_eq!(event.identity.operation_id.as_deref(), Some("op9876543210"));
        assert_eq!(event.identity.work_order_id.as_deref(), Some("wo1234567890"));
        assert_eq!(event.identity.channel.as_deref(), Some("slack"));
    }

    #[test]
    fn test_explicit_linkage_beats_regex() {
        let event = parse_line(
            r#"{"usage":{"inputTokens":1},"operationId":"explicit123","sessionKey":"x:op:fromkey9999"}"#,
        )
        .unwrap();
        assert_eq!(event.identity.operation_id.as_deref(), Some("explicit123"));
    }

    #[test]
    fn test_numeric_string_coercion() {
        let event = parse_line(
            r#"{"usage":{"inputTokens":"100","outputTokens":"9007199254740993","cacheReadTokens":"bad"}}"#,
        )
        .unwrap();
        assert_eq!(event.input_tokens, 100);
        assert_eq!(event.output_tokens, 9_007_199_254_740_993);
        assert_eq!(event.cache_read_tokens, 0);
    }
}
