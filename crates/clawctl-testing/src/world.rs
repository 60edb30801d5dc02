use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Isolated per-test environment: a throwaway runtime home (with the
/// `agents/` skeleton) and a database path, plus builders for session
/// JSONL fixtures.
///
/// # Example
/// ```no_run
/// use clawctl_testing::TestWorld;
///
/// let world = TestWorld::new();
/// world.write_session_file(
///     "agent-1",
///     "session-1",
///     &[&TestWorld::usage_line(100, 50, Some("anthropic/claude-sonnet-4"), "2026-02-01T10:00:00Z")],
/// );
/// ```
pub struct TestWorld {
    temp_dir: TempDir,
    home: PathBuf,
    db_path: PathBuf,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> TestWorld {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let home = temp_dir.path().join("openclaw");
        let db_path = temp_dir.path().join("clawctl.db");
        fs::create_dir_all(home.join("agents")).expect("Failed to create home");

        TestWorld {
            temp_dir,
            home,
            db_path,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn base_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn session_path(&self, agent_id: &str, session_id: &str) -> PathBuf {
        self.home
            .join("agents")
            .join(agent_id)
            .join("sessions")
            .join(format!("{session_id}.jsonl"))
    }

    /// Create (or replace) a session file with the given JSONL lines.
    pub fn write_session_file(&self, agent_id: &str, session_id: &str, lines: &[&str]) -> PathBuf {
        let path = self.session_path(agent_id, session_id);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create sessions dir");

        let mut file = fs::File::create(&path).expect("Failed to create session file");
        for line in lines {
            writeln!(file, "{line}").expect("Failed to write session line");
        }
        path
    }

    /// Append lines to an existing session file.
    pub fn append_session_lines(&self, agent_id: &str, session_id: &str, lines: &[&str]) {
        let path = self.session_path(agent_id, session_id);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("Failed to open session file for append");
        for line in lines {
            writeln!(file, "{line}").expect("Failed to append session line");
        }
    }

    /// Pin a session file's mtime (for cursor-invalidation and parity
    /// range tests).
    pub fn set_session_mtime(&self, agent_id: &str, session_id: &str, unix_seconds: i64) {
        let path = self.session_path(agent_id, session_id);
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(unix_seconds, 0))
            .expect("Failed to set mtime");
    }

    /// A minimal usage line in the runtime's log shape.
    pub fn usage_line(
        input_tokens: i64,
        output_tokens: i64,
        model: Option<&str>,
        timestamp: &str,
    ) -> String {
        let mut line = serde_json::json!({
            "timestamp": timestamp,
            "usage": {"inputTokens": input_tokens, "outputTokens": output_tokens},
        });
        if let Some(model) = model {
            line["model"] = serde_json::json!(model);
        }
        line.to_string()
    }

    /// A usage line carrying tool calls.
    pub fn tool_line(tools: &[&str], timestamp: &str) -> String {
        serde_json::json!({"timestamp": timestamp, "toolCalls": tools}).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_layout() {
        let world = TestWorld::new();
        let path = world.write_session_file("a1", "s1", &["{}"]);
        assert!(path.ends_with("agents/a1/sessions/s1.jsonl"));
        assert!(path.exists());

        world.append_session_lines("a1", "s1", &["{\"x\":1}"]);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_usage_line_is_valid_json() {
        let line = TestWorld::usage_line(1, 2, Some("m"), "2026-01-01T00:00:00Z");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["usage"]["inputTokens"], 1);
    }
}
