use serde::{Deserialize, Serialize};

use crate::{SessionClass, util::i64_string};

/// Additive per-event counters rolled into every aggregate bucket.
///
/// Serialized as strings: lifetime totals can exceed 2^53 and REST
/// consumers must keep full precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounters {
    #[serde(with = "i64_string")]
    pub input_tokens: i64,
    #[serde(with = "i64_string")]
    pub output_tokens: i64,
    #[serde(with = "i64_string")]
    pub cache_read_tokens: i64,
    #[serde(with = "i64_string")]
    pub cache_write_tokens: i64,
    #[serde(with = "i64_string")]
    pub total_tokens: i64,
    #[serde(with = "i64_string")]
    pub tool_calls: i64,
}

impl TokenCounters {
    pub fn add(&mut self, other: &TokenCounters) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_write_tokens = self
            .cache_write_tokens
            .saturating_add(other.cache_write_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.tool_calls = self.tool_calls.saturating_add(other.tool_calls);
    }

    pub fn is_empty(&self) -> bool {
        *self == TokenCounters::default()
    }
}

/// Identity hints carried by a session's events.
///
/// First non-empty value wins when folding events into a delta; later
/// `None`s never overwrite an earlier hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub session_key: Option<String>,
    pub source: Option<String>,
    pub channel: Option<String>,
    pub session_kind: Option<String>,
    pub operation_id: Option<String>,
    pub work_order_id: Option<String>,
}

impl SessionIdentity {
    /// Fill any still-empty field from `other` (first-non-empty-wins).
    pub fn coalesce_from(&mut self, other: &SessionIdentity) {
        fn fill(slot: &mut Option<String>, candidate: &Option<String>) {
            if slot.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true) {
                if let Some(v) = candidate {
                    if !v.trim().is_empty() {
                        *slot = Some(v.clone());
                    }
                }
            }
        }
        fill(&mut self.session_key, &other.session_key);
        fill(&mut self.source, &other.source);
        fill(&mut self.channel, &other.channel);
        fill(&mut self.session_kind, &other.session_kind);
        fill(&mut self.operation_id, &other.operation_id);
        fill(&mut self.work_order_id, &other.work_order_id);
    }

    pub fn is_empty(&self) -> bool {
        *self == SessionIdentity::default()
    }

    /// Classification over the current set of hints.
    pub fn classify(&self) -> SessionClass {
        SessionClass::classify(
            self.source.as_deref(),
            self.channel.as_deref(),
            self.session_key.as_deref(),
            self.session_kind.as_deref(),
            self.operation_id.as_deref(),
            self.work_order_id.as_deref(),
        )
    }
}

/// One parsed JSONL usage line.
///
/// Token counts are non-negative; costs are integer micro-USD. When the
/// source does not supply an explicit total, `total_tokens` equals the
/// component sum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub seen_at_ms: i64,
    pub model: Option<String>,
    pub identity: SessionIdentity,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub total_tokens: i64,
    pub cost_micros: i64,
    pub tool_calls: Vec<String>,
    pub has_error: bool,
    pub has_usage: bool,
}

impl UsageEvent {
    pub fn counters(&self) -> TokenCounters {
        TokenCounters {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_tokens,
            cache_write_tokens: self.cache_write_tokens,
            total_tokens: self.total_tokens,
            tool_calls: self.tool_calls.len() as i64,
        }
    }
}
