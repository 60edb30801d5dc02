use std::fs;
use std::path::{Path, PathBuf};

/// Scripted behavior for one runtime subcommand.
#[derive(Debug, Clone)]
pub struct CommandScript {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandScript {
    pub fn ok(stdout: impl Into<String>) -> CommandScript {
        CommandScript {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn fail(exit_code: i32, stderr: impl Into<String>) -> CommandScript {
        CommandScript {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// A scripted stand-in for the external runtime binary.
///
/// Generates a shell script whose stdout/stderr/exit code are fixed per
/// subcommand, so dispatch fallback and status-sync paths can be driven
/// end to end without a real runtime.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    run: Option<CommandScript>,
    agent: Option<CommandScript>,
    status: Option<CommandScript>,
    models_list: Option<CommandScript>,
    models_status: Option<CommandScript>,
}

impl FakeRuntime {
    pub fn new() -> FakeRuntime {
        FakeRuntime::default()
    }

    pub fn on_run(mut self, script: CommandScript) -> Self {
        self.run = Some(script);
        self
    }

    pub fn on_agent(mut self, script: CommandScript) -> Self {
        self.agent = Some(script);
        self
    }

    pub fn on_status(mut self, script: CommandScript) -> Self {
        self.status = Some(script);
        self
    }

    pub fn on_models_list(mut self, script: CommandScript) -> Self {
        self.models_list = Some(script);
        self
    }

    pub fn on_models_status(mut self, script: CommandScript) -> Self {
        self.models_status = Some(script);
        self
    }

    /// Write the script into `dir` and return its path (usable as the
    /// runtime binary).
    pub fn write(&self, dir: &Path) -> PathBuf {
        let mut body = String::from("#!/bin/sh\ncase \"$1\" in\n");

        let mut arm = |pattern: &str, script: &Option<CommandScript>| {
            let script = script.clone().unwrap_or_else(|| CommandScript {
                exit_code: 2,
                stdout: String::new(),
                stderr: format!("error: unknown command '{pattern}'"),
            });
            body.push_str(&format!(
                "  {pattern})\n    printf '%s' {}\n    printf '%s' {} >&2\n    exit {}\n    ;;\n",
                sh_quote(&script.stdout),
                sh_quote(&script.stderr),
                script.exit_code,
            ));
        };

        arm("run", &self.run);
        arm("agent", &self.agent);
        arm("status.all.json", &self.status);
        arm("models.list.all.json", &self.models_list);
        arm("models.status.json", &self.models_status);

        body.push_str("  *)\n    echo \"error: unknown command '$1'\" >&2\n    exit 2\n    ;;\nesac\n");

        let path = dir.join("openclaw-fake");
        fs::write(&path, body).expect("Failed to write fake runtime");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("Failed to chmod fake runtime");
        }

        path
    }
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_generation_quotes_json() {
        let dir = tempfile::tempdir().unwrap();
        let bin = FakeRuntime::new()
            .on_run(CommandScript::ok(r#"{"sessionId":"it's"}"#))
            .write(dir.path());

        let body = fs::read_to_string(&bin).unwrap();
        assert!(body.starts_with("#!/bin/sh"));
        assert!(body.contains("run)"));
        assert!(body.contains(r"'\''"));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_runs() {
        let dir = tempfile::tempdir().unwrap();
        let bin = FakeRuntime::new()
            .on_status(CommandScript::ok(r#"{"sessions":{"recent":[]}}"#))
            .write(dir.path());

        let output = std::process::Command::new(&bin)
            .arg("status.all.json")
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(
            String::from_utf8_lossy(&output.stdout),
            r#"{"sessions":{"recent":[]}}"#
        );

        let unknown = std::process::Command::new(&bin).arg("run").output().unwrap();
        assert_eq!(unknown.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&unknown.stderr).contains("unknown command 'run'"));
    }
}
