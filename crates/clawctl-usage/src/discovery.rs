use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One discovered session log under `<home>/agents/<agentId>/sessions/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFileRef {
    pub agent_id: String,
    pub session_id: String,
    pub path: PathBuf,
}

/// Canonical path of a session log for an `(agent, session)` pair.
pub fn session_file_path(home: &Path, agent_id: &str, session_id: &str) -> PathBuf {
    home.join("agents")
        .join(agent_id)
        .join("sessions")
        .join(format!("{session_id}.jsonl"))
}

/// Enumerate every `agents/*/sessions/*.jsonl` under the runtime home.
///
/// Unreadable entries are skipped. Results are sorted by path for stable
/// downstream prioritization.
pub fn list_session_files(home: &Path) -> Vec<SessionFileRef> {
    let agents_root = home.join("agents");
    let mut files = Vec::new();

    for entry in WalkDir::new(&agents_root)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().is_none_or(|e| e != "jsonl") {
            continue;
        }

        let Some(parent) = path.parent() else { continue };
        if parent.file_name().is_none_or(|n| n != "sessions") {
            continue;
        }
        let Some(agent_dir) = parent.parent() else { continue };

        let (Some(agent_id), Some(session_id)) = (
            agent_dir.file_name().and_then(|n| n.to_str()),
            path.file_stem().and_then(|n| n.to_str()),
        ) else {
            continue;
        };

        files.push(SessionFileRef {
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
            path: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"{}\n").unwrap();
    }

    #[test]
    fn test_lists_only_session_jsonl_files() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();

        touch(&session_file_path(home, "a1", "s1"));
        touch(&session_file_path(home, "a2", "s2"));
        // wrong extension and wrong directory are ignored
        touch(&home.join("agents/a1/sessions/notes.txt"));
        touch(&home.join("agents/a1/other/s3.jsonl"));

        let files = list_session_files(home);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].agent_id, "a1");
        assert_eq!(files[0].session_id, "s1");
        assert_eq!(files[1].agent_id, "a2");
    }

    #[test]
    fn test_missing_home_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = list_session_files(&dir.path().join("nope"));
        assert!(files.is_empty());
    }

    #[test]
    fn test_sorted_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        touch(&session_file_path(home, "zeta", "s1"));
        touch(&session_file_path(home, "alpha", "s9"));

        let files = list_session_files(home);
        assert!(files[0].path < files[1].path);
    }
}
