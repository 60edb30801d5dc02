use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Behavioral class of a session, derived from its identity hints.
///
/// Ordered by rank: when two classifications of the same session disagree,
/// the higher-ranked class wins (`cron > workflow > interactive > unknown`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionClass {
    #[default]
    Unknown,
    Interactive,
    BackgroundWorkflow,
    BackgroundCron,
}

impl SessionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionClass::Unknown => "unknown",
            SessionClass::Interactive => "interactive",
            SessionClass::BackgroundWorkflow => "background_workflow",
            SessionClass::BackgroundCron => "background_cron",
        }
    }

    pub fn from_str_lossy(s: &str) -> SessionClass {
        match s {
            "background_cron" => SessionClass::BackgroundCron,
            "background_workflow" => SessionClass::BackgroundWorkflow,
            "interactive" => SessionClass::Interactive,
            _ => SessionClass::Unknown,
        }
    }

    /// Classify from identity hints. Precedence: cron markers, then
    /// workflow linkage, then any identity hint at all.
    pub fn classify(
        source: Option<&str>,
        channel: Option<&str>,
        session_key: Option<&str>,
        session_kind: Option<&str>,
        operation_id: Option<&str>,
        work_order_id: Option<&str>,
    ) -> SessionClass {
        const CRON_MARKERS: [&str; 4] = ["cron", "heartbeat", "scheduler", "scheduled"];

        let has_marker = |v: Option<&str>| {
            v.map(|s| {
                let s = s.to_ascii_lowercase();
                CRON_MARKERS.iter().any(|m| s.contains(m))
            })
            .unwrap_or(false)
        };

        if has_marker(source) || has_marker(channel) || has_marker(session_key) || has_marker(session_kind)
        {
            return SessionClass::BackgroundCron;
        }

        let present = |v: Option<&str>| v.map(|s| !s.trim().is_empty()).unwrap_or(false);

        if present(operation_id) || present(work_order_id) {
            return SessionClass::BackgroundWorkflow;
        }

        if present(source) || present(channel) || present(session_key) || present(session_kind) {
            return SessionClass::Interactive;
        }

        SessionClass::Unknown
    }

    /// Merge two classifications of the same session: higher rank wins.
    pub fn merge(self, other: SessionClass) -> SessionClass {
        self.max(other)
    }
}

/// Live state of a dispatched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Idle,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Idle => "idle",
            SessionState::Error => "error",
        }
    }

    pub fn from_str_lossy(s: &str) -> SessionState {
        match s {
            "active" => SessionState::Active,
            "error" => SessionState::Error,
            _ => SessionState::Idle,
        }
    }

    /// Overlay priority: `error > active > idle`.
    pub fn overlay_rank(&self) -> u8 {
        match self {
            SessionState::Error => 2,
            SessionState::Active => 1,
            SessionState::Idle => 0,
        }
    }
}

/// Severity of an ops actionable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Unknown labels coerce to medium; intake payloads are tolerant input.
    pub fn from_str_lossy(s: &str) -> Severity {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    /// Work-order priority bucket for this severity.
    pub fn work_order_priority(&self) -> &'static str {
        match self {
            Severity::Critical | Severity::High => "P1",
            Severity::Medium => "P2",
            Severity::Low => "P3",
        }
    }
}

/// Provider attribution for a model label.
///
/// A `/`-qualified model keeps its prefix; bare labels go through a rule map.
pub fn provider_key(model: &str) -> String {
    let model = model.trim();
    if model.is_empty() {
        return "unknown".to_string();
    }

    if let Some(idx) = model.find('/') {
        let prefix = model[..idx].trim();
        if !prefix.is_empty() {
            return prefix.to_ascii_lowercase();
        }
    }

    let lower = model.to_ascii_lowercase();
    if ["claude", "sonnet", "opus", "haiku"].iter().any(|m| lower.contains(m)) {
        "anthropic".to_string()
    } else if lower.contains("codex") {
        "openai-codex".to_string()
    } else if lower.starts_with("gpt-") {
        "openai".to_string()
    } else if lower.contains("gemini") {
        "google".to_string()
    } else if lower.contains("grok") {
        "xai".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Canonical aggregation key for a model label: lowercased, trimmed,
/// `unknown` when absent.
pub fn model_key(model: Option<&str>) -> String {
    match model.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_ascii_lowercase(),
        _ => "unknown".to_string(),
    }
}

/// Normalize a source label extracted from a session key.
pub fn normalize_source_label(label: &str) -> String {
    match label {
        "agent" => "overlay".to_string(),
        "webchat" | "browser" => "web".to_string(),
        other => other.to_string(),
    }
}

/// Fallback source derivation: first `:`-delimited token of the session
/// key, normalized.
pub fn source_from_session_key(session_key: &str) -> Option<String> {
    let token = session_key.split(':').next()?.trim();
    if token.is_empty() {
        return None;
    }
    Some(normalize_source_label(&token.to_ascii_lowercase()))
}

static OP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|:)op:([a-z0-9]{10,})").expect("op regex"));
static WO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|:)wo:([a-z0-9]{10,})").expect("wo regex"));

/// Extract an operation id from a `...:op:<id>` session-key token.
pub fn extract_operation_id(session_key: &str) -> Option<String> {
    OP_RE
        .captures(session_key)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract a work-order id from a `...:wo:<id>` session-key token.
pub fn extract_work_order_id(session_key: &str) -> Option<String> {
    WO_RE
        .captures(session_key)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_key_prefix_wins() {
        assert_eq!(provider_key("anthropic/claude-sonnet-4"), "anthropic");
        assert_eq!(provider_key("openai-codex/gpt-5.3-codex"), "openai-codex");
    }

    #[test]
    fn test_provider_key_rule_map() {
        assert_eq!(provider_key("claude-3-5-haiku"), "anthropic");
        assert_eq!(provider_key("sonnet-4"), "anthropic");
        assert_eq!(provider_key("codex-mini"), "openai-codex");
        assert_eq!(provider_key("gpt-4o"), "openai");
        assert_eq!(provider_key("gemini-2.5-pro"), "google");
        assert_eq!(provider_key("grok-3"), "xai");
        assert_eq!(provider_key("llama-70b"), "unknown");
        assert_eq!(provider_key(""), "unknown");
    }

    #[test]
    fn test_session_class_precedence() {
        // cron markers beat workflow linkage
        let class = SessionClass::classify(
            Some("cron"),
            None,
            Some("agent:a1:op:abcdef12345"),
            None,
            Some("abcdef12345"),
            None,
        );
        assert_eq!(class, SessionClass::BackgroundCron);

        let class = SessionClass::classify(None, None, None, None, Some("abcdef12345"), None);
        assert_eq!(class, SessionClass::BackgroundWorkflow);

        let class = SessionClass::classify(Some("web"), None, None, None, None, None);
        assert_eq!(class, SessionClass::Interactive);

        let class = SessionClass::classify(None, None, None, None, None, None);
        assert_eq!(class, SessionClass::Unknown);
    }

    #[test]
    fn test_session_class_marker_in_session_key() {
        let class = SessionClass::classify(
            None,
            None,
            Some("agent:main:heartbeat"),
            None,
            None,
            None,
        );
        assert_eq!(class, SessionClass::BackgroundCron);
    }

    #[test]
    fn test_session_class_merge_takes_max_rank() {
        assert_eq!(
            SessionClass::Interactive.merge(SessionClass::BackgroundCron),
            SessionClass::BackgroundCron
        );
        assert_eq!(
            SessionClass::BackgroundWorkflow.merge(SessionClass::Unknown),
            SessionClass::BackgroundWorkflow
        );
    }

    #[test]
    fn test_source_from_session_key() {
        assert_eq!(source_from_session_key("agent:a1:wo:x"), Some("overlay".to_string()));
        assert_eq!(source_from_session_key("webchat:u1"), Some("web".to_string()));
        assert_eq!(source_from_session_key("slack:c42"), Some("slack".to_string()));
        assert_eq!(source_from_session_key(""), None);
    }

    #[test]
    fn test_linkage_extraction() {
        let key = "agent:builder:wo:wo12345678901:op:op1234567890";
        assert_eq!(extract_operation_id(key), Some("op1234567890".to_string()));
        assert_eq!(extract_work_order_id(key), Some("wo12345678901".to_string()));

        // short ids do not match
        assert_eq!(extract_operation_id("op:short"), None);
        // token must be `:`-anchored
        assert_eq!(extract_operation_id("scoop:abcdefghij12"), None);
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Severity::Critical.work_order_priority(), "P1");
        assert_eq!(Severity::High.work_order_priority(), "P1");
        assert_eq!(Severity::Medium.work_order_priority(), "P2");
        assert_eq!(Severity::Low.work_order_priority(), "P3");
        assert_eq!(Severity::from_str_lossy("weird"), Severity::Medium);
    }

    #[test]
    fn test_overlay_rank() {
        assert!(SessionState::Error.overlay_rank() > SessionState::Active.overlay_rank());
        assert!(SessionState::Active.overlay_rank() > SessionState::Idle.overlay_rank());
    }
}
