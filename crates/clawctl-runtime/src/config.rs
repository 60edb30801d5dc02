use std::path::PathBuf;

use crate::{Error, Result};

/// How new sessions are dispatched onto the external runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Try `run`, fall back to `agent_local` on known signatures.
    Auto,
    Run,
    AgentLocal,
}

impl DispatchMode {
    pub fn parse(s: &str) -> Result<DispatchMode> {
        match s {
            "auto" => Ok(DispatchMode::Auto),
            "run" => Ok(DispatchMode::Run),
            "agent_local" => Ok(DispatchMode::AgentLocal),
            other => Err(Error::Config(format!("unknown dispatch mode: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Auto => "auto",
            DispatchMode::Run => "run",
            DispatchMode::AgentLocal => "agent_local",
        }
    }
}

/// Environment-derived runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root containing `agents/<agentId>/sessions/*.jsonl`.
    pub home: PathBuf,
    /// External runtime binary.
    pub bin: String,
    pub dispatch_mode: DispatchMode,
    /// Presence toggles the agent_local fallback-model injection.
    pub openai_api_key_present: bool,
}

impl RuntimeConfig {
    /// Resolve from the environment:
    /// `OPENCLAW_HOME` (default `~/.openclaw`),
    /// `CLAWCONTROL_OPENCLAW_DISPATCH_MODE` (default `auto`),
    /// `OPENAI_API_KEY` presence.
    pub fn from_env() -> Result<RuntimeConfig> {
        let home = match std::env::var_os("OPENCLAW_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .ok_or_else(|| Error::Config("no home directory".to_string()))?
                .join(".openclaw"),
        };

        let dispatch_mode = match std::env::var("CLAWCONTROL_OPENCLAW_DISPATCH_MODE") {
            Ok(raw) if !raw.trim().is_empty() => DispatchMode::parse(raw.trim())?,
            _ => DispatchMode::Auto,
        };

        let openai_api_key_present = std::env::var("OPENAI_API_KEY")
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);

        Ok(RuntimeConfig {
            home,
            bin: std::env::var("OPENCLAW_BIN").unwrap_or_else(|_| "openclaw".to_string()),
            dispatch_mode,
            openai_api_key_present,
        })
    }

    pub fn with_home(home: PathBuf) -> RuntimeConfig {
        RuntimeConfig {
            home,
            bin: "openclaw".to_string(),
            dispatch_mode: DispatchMode::Auto,
            openai_api_key_present: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!(DispatchMode::parse("auto").unwrap(), DispatchMode::Auto);
        assert_eq!(DispatchMode::parse("run").unwrap(), DispatchMode::Run);
        assert_eq!(
            DispatchMode::parse("agent_local").unwrap(),
            DispatchMode::AgentLocal
        );
        assert!(DispatchMode::parse("turbo").is_err());
    }
}
