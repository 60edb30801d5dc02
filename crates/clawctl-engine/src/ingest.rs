use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use clawctl_store::{Database, UsageCursorRecord, queries::cursor};
use clawctl_usage::{FileFingerprint, SessionFileRef, list_session_files, parse_line, read_window};

use crate::{Result, cursor::resolve_start_offset, delta::SessionDelta, lease::with_lease};

/// Lease guarding concurrent ingestion runs. One writer at a time; other
/// callers get `lock_acquired: false` back immediately.
pub const USAGE_SYNC_LEASE: &str = "usage.sync";

/// Wall-clock and file-count budget for one ingestion pass.
#[derive(Debug, Clone, Copy)]
pub struct SyncBudget {
    pub max_ms: u64,
    pub max_files: usize,
}

impl Default for SyncBudget {
    fn default() -> Self {
        Self {
            max_ms: 15_000,
            max_files: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub lock_acquired: bool,
    pub files_scanned: usize,
    pub files_updated: usize,
    pub sessions_updated: usize,
    pub tools_upserted: usize,
    pub cursor_resets: usize,
    pub files_total: usize,
    pub files_remaining: usize,
    pub coverage_pct: f64,
    pub duration_ms: u64,
}

/// Incremental, crash-safe tailer over `agents/*/sessions/*.jsonl`.
///
/// Strictly advisory: exits at the next file boundary once a budget
/// trips, and per-file failures only skip that file.
pub struct UsageSyncEngine<'a> {
    db: &'a Database,
    home: PathBuf,
}

impl<'a> UsageSyncEngine<'a> {
    pub fn new(db: &'a Database, home: PathBuf) -> Self {
        Self { db, home }
    }

    pub fn sync_usage(&self, budget: SyncBudget) -> Result<SyncStats> {
        let ttl_ms = (budget.max_ms as i64 * 2).max(60_000);

        let stats = with_lease(self.db, USAGE_SYNC_LEASE, ttl_ms, || {
            self.run_locked(budget)
        })?;

        Ok(stats.unwrap_or_default())
    }

    fn run_locked(&self, budget: SyncBudget) -> Result<SyncStats> {
        let started = Instant::now();
        let mut stats = SyncStats {
            lock_acquired: true,
            ..Default::default()
        };

        let queue = self.build_queue()?;
        stats.files_total = queue.len();

        let mut covered = 0usize;
        for file in &queue {
            if stats.files_scanned >= budget.max_files
                || started.elapsed().as_millis() as u64 > budget.max_ms
            {
                break;
            }
            stats.files_scanned += 1;

            match self.process_file(file, &mut stats) {
                Ok(true) => covered += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(path = %file.path.display(), error = %err, "skipping session file");
                }
            }
        }

        stats.files_remaining = stats.files_total.saturating_sub(covered);
        stats.coverage_pct = if stats.files_total == 0 {
            100.0
        } else {
            (covered as f64 / stats.files_total as f64 * 10_000.0).round() / 100.0
        };
        stats.duration_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            scanned = stats.files_scanned,
            updated = stats.files_updated,
            coverage = stats.coverage_pct,
            "usage sync pass finished"
        );

        Ok(stats)
    }

    /// Unseen files first (path order), then seen files oldest-touched
    /// first. Fair rotation over very many files without a heap.
    fn build_queue(&self) -> Result<Vec<SessionFileRef>> {
        let files = list_session_files(&self.home);
        let cursors: HashMap<String, UsageCursorRecord> = cursor::get_all(self.db.conn())?
            .into_iter()
            .map(|c| (c.source_path.clone(), c))
            .collect();

        let (mut unseen, mut seen): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|f| !cursors.contains_key(&f.path.display().to_string()));

        unseen.sort_by(|a, b| a.path.cmp(&b.path));
        seen.sort_by(|a, b| {
            let ua = cursors
                .get(&a.path.display().to_string())
                .map(|c| c.updated_at_ms)
                .unwrap_or(0);
            let ub = cursors
                .get(&b.path.display().to_string())
                .map(|c| c.updated_at_ms)
                .unwrap_or(0);
            ua.cmp(&ub).then_with(|| a.path.cmp(&b.path))
        });

        unseen.extend(seen);
        Ok(unseen)
    }

    /// One file is one atomic unit: the folded delta and the advanced
    /// cursor commit in the same transaction. Returns whether the file is
    /// now covered.
    fn process_file(&self, file: &SessionFileRef, stats: &mut SyncStats) -> Result<bool> {
        let path_str = file.path.display().to_string();

        let fingerprint = match FileFingerprint::for_path(&file.path) {
            Ok(fp) => fp,
            Err(_) => return Ok(false),
        };

        let stored = cursor::get(self.db.conn(), &path_str)?;
        let decision = resolve_start_offset(stored.as_ref(), &fingerprint);
        if decision.was_reset {
            stats.cursor_resets += 1;
        }

        let next_cursor = UsageCursorRecord {
            source_path: path_str,
            agent_id: file.agent_id.clone(),
            session_id: file.session_id.clone(),
            device_id: fingerprint.device_id,
            inode: fingerprint.inode,
            offset_bytes: fingerprint.size_bytes,
            file_size_bytes: fingerprint.size_bytes,
            file_mtime_ms: fingerprint.mtime_ms,
            updated_at_ms: Utc::now().timestamp_millis(),
        };

        if fingerprint.size_bytes <= decision.start_offset {
            cursor::upsert(self.db.conn(), &next_cursor)?;
            return Ok(true);
        }

        let lines = read_window(
            &file.path,
            decision.start_offset as u64,
            fingerprint.size_bytes as u64,
        )?;

        let mut delta = SessionDelta::new();
        for line in &lines {
            if let Some(event) = parse_line(line) {
                delta.fold(&event, fingerprint.mtime_ms);
            }
        }

        if delta.is_empty() {
            cursor::upsert(self.db.conn(), &next_cursor)?;
        } else {
            stats.tools_upserted += delta.tool_count();
            let rows = delta.into_rows(&file.agent_id, &file.session_id);
            self.db.commit_session_delta(&rows, &next_cursor)?;
            stats.sessions_updated += 1;
            stats.files_updated += 1;
        }

        Ok(true)
    }
}
