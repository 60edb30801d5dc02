use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use clawctl_store::{AgentSessionRecord, Database, queries::agent_session};
use clawctl_types::{
    SessionState, extract_operation_id, extract_work_order_id, model_key, truncate,
};

use crate::{
    Error, Result,
    client::{CommandOutput, OpenclawClient},
    config::{DispatchMode, RuntimeConfig},
};

/// Injected at the head of the agent fallback chain when the caller asks
/// for a non-codex model without an OpenAI key configured.
const FALLBACK_MODEL: &str = "openai-codex/gpt-5.3-codex";

const RAW_JSON_LIMIT: usize = 48 * 1024;

pub const DEFAULT_SPAWN_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub agent_id: String,
    pub label: String,
    pub task: String,
    pub context: Value,
    pub model: Option<String>,
    pub timeout_seconds: u64,
}

impl SpawnRequest {
    pub fn new(agent_id: impl Into<String>, label: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            label: label.into(),
            task: task.into(),
            context: Value::Null,
            model: None,
            timeout_seconds: DEFAULT_SPAWN_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResult {
    pub session_key: String,
    pub session_id: Option<String>,
}

/// Spawns sessions on the external runtime via `run` or `agent --local`,
/// memoizing the mode that worked for the life of the process.
pub struct Dispatcher<'a> {
    db: &'a Database,
    config: RuntimeConfig,
    client: OpenclawClient,
    resolved_mode: OnceLock<DispatchMode>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(db: &'a Database, config: RuntimeConfig) -> Self {
        let client = OpenclawClient::new(config.bin.clone());
        Self {
            db,
            config,
            client,
            resolved_mode: OnceLock::new(),
        }
    }

    pub async fn spawn(&self, request: SpawnRequest) -> Result<SpawnResult> {
        let mode = self
            .resolved_mode
            .get()
            .copied()
            .unwrap_or(self.config.dispatch_mode);

        match mode {
            DispatchMode::Run => self
                .spawn_run(&request)
                .await
                .map_err(|err| wrap_forced("run", err)),
            DispatchMode::AgentLocal => self
                .spawn_agent_local(&request)
                .await
                .map_err(|err| wrap_forced("agent_local", err)),
            DispatchMode::Auto => match self.spawn_run(&request).await {
                Ok(result) => {
                    let _ = self.resolved_mode.set(DispatchMode::Run);
                    Ok(result)
                }
                Err(run_err) if is_fallback_signature(&run_err) => {
                    tracing::debug!(error = %run_err, "run mode unavailable, falling back to agent_local");
                    match self.spawn_agent_local(&request).await {
                        Ok(result) => {
                            let _ = self.resolved_mode.set(DispatchMode::AgentLocal);
                            Ok(result)
                        }
                        Err(local_err) => Err(Error::DispatchFailed(format!(
                            "run: {run_err}; agent_local: {local_err}"
                        ))),
                    }
                }
                Err(run_err) => Err(wrap_forced("run", run_err)),
            },
        }
    }

    async fn spawn_run(&self, request: &SpawnRequest) -> Result<SpawnResult> {
        let payload = json!({
            "sessionKey": request.label,
            "task": request.task,
            "context": request.context,
        });

        let mut args = vec![
            "run".to_string(),
            request.agent_id.clone(),
            "--label".to_string(),
            request.label.clone(),
            "--timeout".to_string(),
            request.timeout_seconds.to_string(),
        ];
        if let Some(model) = request.model.as_deref() {
            args.push("--model".to_string());
            args.push(model_key(Some(model)));
        }
        args.push("--".to_string());
        args.push(payload.to_string());

        let output = self
            .client
            .exec(&args, Duration::from_secs(request.timeout_seconds))
            .await?;
        if !output.success() {
            return Err(Error::Command(format!(
                "run exited {:?}: {} {}",
                output.exit_code,
                truncate(output.stderr.trim(), 400),
                truncate(output.stdout.trim(), 400)
            )));
        }

        let parsed: Value = serde_json::from_str(&output.stdout).map_err(|err| {
            Error::Command(format!(
                "run produced invalid JSON ({err}): {}",
                truncate(output.stdout.trim(), 400)
            ))
        })?;

        let session_id = parsed
            .get("sessionId")
            .and_then(Value::as_str)
            .or_else(|| parsed.get("id").and_then(Value::as_str))
            .map(str::to_string);

        if let Some(ref id) = session_id {
            self.persist_session(request, id, &output, &parsed)?;
        }

        Ok(SpawnResult {
            session_key: request.label.clone(),
            session_id,
        })
    }

    async fn spawn_agent_local(&self, request: &SpawnRequest) -> Result<SpawnResult> {
        let mut model_sync_warning = None;
        if let Some(model) = request.model.as_deref() {
            let is_codex = model.to_ascii_lowercase().starts_with("openai-codex/");
            if !is_codex && !self.config.openai_api_key_present {
                if let Err(err) = self.sync_fallback_models(&request.agent_id) {
                    model_sync_warning = Some(format!("model_sync_warning: {err}"));
                }
            }
        }

        let session_id = deterministic_session_id(&request.label);
        let message = format!(
            "{}\n\nCLAWCONTROL_CONTEXT_JSON:{}",
            request.task,
            json!({"sessionKey": request.label, "context": request.context})
        );

        let args = vec![
            "agent".to_string(),
            "--local".to_string(),
            "--agent".to_string(),
            request.agent_id.clone(),
            "--session-id".to_string(),
            session_id,
            "--message".to_string(),
            message,
            "--json".to_string(),
            "--timeout".to_string(),
            request.timeout_seconds.to_string(),
        ];

        let append_warning = |msg: String, warning: &Option<String>| match warning {
            Some(w) => format!("{msg}; {w}"),
            None => msg,
        };

        let output = self
            .client
            .exec(&args, Duration::from_secs(request.timeout_seconds))
            .await?;
        if !output.success() {
            return Err(Error::Command(append_warning(
                format!(
                    "agent_local exited {:?}: {} {}",
                    output.exit_code,
                    truncate(output.stderr.trim(), 400),
                    truncate(output.stdout.trim(), 400)
                ),
                &model_sync_warning,
            )));
        }

        let parsed: Value = serde_json::from_str(&output.stdout).map_err(|err| {
            Error::Command(append_warning(
                format!(
                    "agent_local produced invalid JSON ({err}): {}",
                    truncate(output.stdout.trim(), 400)
                ),
                &model_sync_warning,
            ))
        })?;

        let parsed_session_id = extract_session_id(&parsed).ok_or_else(|| {
            Error::SessionIdMissing(append_warning(
                format!(
                    "stdout: {} stderr: {}",
                    truncate(output.stdout.trim(), 400),
                    truncate(output.stderr.trim(), 400)
                ),
                &model_sync_warning,
            ))
        })?;

        self.persist_session(request, &parsed_session_id, &output, &parsed)?;

        Ok(SpawnResult {
            session_key: request.label.clone(),
            session_id: Some(parsed_session_id),
        })
    }

    /// Best-effort enrichment of the agent config with a codex fallback
    /// chain; failures surface only as a warning on later errors.
    fn sync_fallback_models(&self, agent_id: &str) -> std::result::Result<(), String> {
        let path = self.config.home.join("agents").join(agent_id).join("agent.json");

        let mut config: Value = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| e.to_string())?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => json!({}),
            Err(err) => return Err(err.to_string()),
        };

        let existing: Vec<String> = config
            .get("modelFallbacks")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let chain = merge_fallback_chain(existing);
        config["modelFallbacks"] = json!(chain);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?,
        )
        .map_err(|e| e.to_string())
    }

    fn persist_session(
        &self,
        request: &SpawnRequest,
        session_id: &str,
        output: &CommandOutput,
        parsed: &Value,
    ) -> Result<()> {
        let raw = json!({
            "spawn": {"stdout": output.stdout, "stderr": output.stderr},
            "parsed": parsed,
        })
        .to_string();

        let now_ms = Utc::now().timestamp_millis();
        let record = AgentSessionRecord {
            session_id: session_id.to_string(),
            session_key: request.label.clone(),
            agent_id: request.agent_id.clone(),
            kind: None,
            model: request.model.clone(),
            state: SessionState::Active,
            updated_at_ms: now_ms,
            last_seen_at_ms: now_ms,
            aborted_last_run: false,
            percent_used: None,
            operation_id: extract_operation_id(&request.label),
            work_order_id: extract_work_order_id(&request.label),
            raw_json: Some(cap_raw_json(raw)),
        };

        agent_session::upsert(self.db.conn(), &record)?;
        Ok(())
    }
}

fn wrap_forced(mode: &str, err: Error) -> Error {
    match err {
        Error::SessionIdMissing(_) | Error::DispatchFailed(_) | Error::Store(_) => err,
        other => Error::DispatchFailed(format!("{mode}: {other}")),
    }
}

/// The `run` subcommand is absent on older runtimes; these signatures
/// trigger the agent_local fallback.
fn is_fallback_signature(err: &Error) -> bool {
    let message = err.to_string();
    ["unknown command 'run'", "did you mean cron?", "ENOENT", "not found"]
        .iter()
        .any(|sig| message.contains(sig))
}

/// Prepend the codex fallback, de-duplicated case-insensitively while
/// preserving first-occurrence order.
fn merge_fallback_chain(existing: Vec<String>) -> Vec<String> {
    let mut chain = vec![FALLBACK_MODEL.to_string()];
    for model in existing {
        if !chain.iter().any(|m| m.eq_ignore_ascii_case(&model)) {
            chain.push(model);
        }
    }
    chain
}

/// UUIDv4-shaped hex derived from the label: stable across calls, no
/// randomness. Version nibble forced to 4, variant nibble to 8..b.
pub fn deterministic_session_id(label: &str) -> String {
    let digest = Sha256::digest(label.as_bytes());
    let mut hex: Vec<u8> = hex_string(&digest).into_bytes();
    hex.truncate(32);

    hex[12] = b'4';
    let nibble = match hex[16] {
        b'0'..=b'9' => hex[16] - b'0',
        c => c - b'a' + 10,
    };
    let variant = 8 + (nibble & 3);
    hex[16] = if variant < 10 {
        b'0' + variant
    } else {
        b'a' + variant - 10
    };
    let hex = String::from_utf8(hex).expect("hex digits");

    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn extract_session_id(parsed: &Value) -> Option<String> {
    [
        &["sessionId"][..],
        &["meta", "sessionId"],
        &["meta", "agentMeta", "sessionId"],
        &["meta", "systemPromptReport", "sessionId"],
    ]
    .iter()
    .find_map(|path| {
        let mut cur = parsed;
        for seg in *path {
            cur = cur.get(seg)?;
        }
        cur.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Cap persisted spawn output at 48 KiB; oversized payloads keep a
/// preview plus the original length. The preview is cut in bytes on a
/// UTF-8 boundary, then shrunk further until the wrapper itself fits —
/// JSON escaping can inflate the preview past any fixed byte budget.
fn cap_raw_json(raw: String) -> String {
    if raw.len() <= RAW_JSON_LIMIT {
        return raw;
    }

    let mut cut = RAW_JSON_LIMIT - 1024;
    loop {
        while cut > 0 && !raw.is_char_boundary(cut) {
            cut -= 1;
        }
        let wrapped = json!({
            "truncated": true,
            "originalLength": raw.len(),
            "preview": &raw[..cut],
        })
        .to_string();
        if wrapped.len() <= RAW_JSON_LIMIT || cut == 0 {
            return wrapped;
        }
        cut /= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_session_id_shape() {
        let id = deterministic_session_id("agent:builder:wo:wo1234567890");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(parts[2].starts_with('4'));
        assert!(matches!(parts[3].as_bytes()[0], b'8' | b'9' | b'a' | b'b'));
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_deterministic_session_id_is_stable() {
        assert_eq!(
            deterministic_session_id("label-x"),
            deterministic_session_id("label-x")
        );
        assert_ne!(
            deterministic_session_id("label-x"),
            deterministic_session_id("label-y")
        );
    }

    #[test]
    fn test_fallback_signatures() {
        assert!(is_fallback_signature(&Error::Command(
            "run exited Some(1): error: unknown command 'run'".to_string()
        )));
        assert!(is_fallback_signature(&Error::Command(
            "did you mean cron?".to_string()
        )));
        assert!(is_fallback_signature(&Error::Command(
            "ENOENT: openclaw not found".to_string()
        )));
        assert!(!is_fallback_signature(&Error::Command(
            "run exited Some(1): agent busy".to_string()
        )));
    }

    #[test]
    fn test_merge_fallback_chain_dedups_case_insensitively() {
        let chain = merge_fallback_chain(vec![
            "OpenAI-Codex/GPT-5.3-Codex".to_string(),
            "anthropic/claude-sonnet-4".to_string(),
        ]);
        assert_eq!(
            chain,
            vec![
                FALLBACK_MODEL.to_string(),
                "anthropic/claude-sonnet-4".to_string()
            ]
        );
    }

    #[test]
    fn test_extract_session_id_priority() {
        let top = serde_json::json!({"sessionId": "top", "meta": {"sessionId": "nested"}});
        assert_eq!(extract_session_id(&top), Some("top".to_string()));

        let nested = serde_json::json!({"meta": {"agentMeta": {"sessionId": "sess_X"}}});
        assert_eq!(extract_session_id(&nested), Some("sess_X".to_string()));

        let report = serde_json::json!({"meta": {"systemPromptReport": {"sessionId": "rep"}}});
        assert_eq!(extract_session_id(&report), Some("rep".to_string()));

        assert_eq!(extract_session_id(&serde_json::json!({"id": "x"})), None);
    }

    #[test]
    fn test_cap_raw_json() {
        let small = "x".repeat(100);
        assert_eq!(cap_raw_json(small.clone()), small);

        let big = "y".repeat(RAW_JSON_LIMIT + 10);
        let capped = cap_raw_json(big);
        assert!(capped.len() <= RAW_JSON_LIMIT);
        let value: Value = serde_json::from_str(&capped).unwrap();
        assert_eq!(value["truncated"], Value::Bool(true));
        assert_eq!(value["originalLength"], serde_json::json!(RAW_JSON_LIMIT + 10));
    }

    #[test]
    fn test_cap_raw_json_multibyte_stays_within_byte_budget() {
        // 3-byte scalars: a char-counted cut would blow the byte bound
        let big = "€".repeat(RAW_JSON_LIMIT);
        let original_len = big.len();

        let capped = cap_raw_json(big);
        assert!(capped.len() <= RAW_JSON_LIMIT, "got {} bytes", capped.len());

        let value: Value = serde_json::from_str(&capped).unwrap();
        assert_eq!(value["originalLength"], serde_json::json!(original_len));
        // the preview still ends on a whole character
        assert!(value["preview"].as_str().unwrap().chars().all(|c| c == '€'));
    }

    #[test]
    fn test_cap_raw_json_escape_heavy_input() {
        // every byte escapes to two: the wrapper must still fit
        let big = "\"".repeat(RAW_JSON_LIMIT + 10);
        let capped = cap_raw_json(big);
        assert!(capped.len() <= RAW_JSON_LIMIT, "got {} bytes", capped.len());
        assert!(serde_json::from_str::<Value>(&capped).is_ok());
    }
}
