use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use clawctl_store::{Database, queries::cursor};
use clawctl_usage::{FileFingerprint, list_session_files};

use crate::{Result, cache::TtlCache};

pub const DEFAULT_SESSION_LIMIT: usize = 1000;
pub const MAX_SESSION_LIMIT: usize = 5000;

const CACHE_TTL: Duration = Duration::from_secs(15);

/// Which session files must be fully ingested to serve a time-windowed
/// parity view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParityScope {
    pub sampled_session_ids: Vec<String>,
    pub sampled_count: usize,
    pub sessions_in_range_total: usize,
    pub priority_paths: Vec<String>,
    pub missing_coverage_count: usize,
    pub session_limit: usize,
}

pub struct ParityScopeResolver<'a> {
    db: &'a Database,
    home: PathBuf,
    cache: TtlCache<(i64, i64, usize), ParityScope>,
}

impl<'a> ParityScopeResolver<'a> {
    pub fn new(db: &'a Database, home: PathBuf) -> Self {
        Self {
            db,
            home,
            cache: TtlCache::new(CACHE_TTL),
        }
    }

    /// Enumerate session files touched since `from`, sample the newest
    /// `session_limit`, and diff the sample against cursor coverage.
    /// Results are cached for 15s; stale reads are acceptable.
    pub fn resolve(
        &self,
        from_ms: i64,
        to_ms: i64,
        session_limit: Option<usize>,
    ) -> Result<ParityScope> {
        let limit = session_limit
            .unwrap_or(DEFAULT_SESSION_LIMIT)
            .min(MAX_SESSION_LIMIT);

        self.cache
            .load_or_compute((from_ms, to_ms, limit), || self.compute(from_ms, limit))
    }

    fn compute(&self, from_ms: i64, limit: usize) -> Result<ParityScope> {
        let mut in_range = Vec::new();
        for file in list_session_files(&self.home) {
            let Ok(fp) = FileFingerprint::for_path(&file.path) else {
                continue;
            };
            if fp.mtime_ms >= from_ms {
                in_range.push((file, fp));
            }
        }

        // newest first, ties by path for determinism
        in_range.sort_by(|(a, fa), (b, fb)| {
            fb.mtime_ms
                .cmp(&fa.mtime_ms)
                .then_with(|| a.path.cmp(&b.path))
        });

        let sessions_in_range_total = in_range
            .iter()
            .map(|(f, _)| f.session_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let sample = &in_range[..limit.min(in_range.len())];

        let mut sampled_session_ids = Vec::new();
        let mut seen = HashSet::new();
        for (file, _) in sample {
            if seen.insert(file.session_id.clone()) {
                sampled_session_ids.push(file.session_id.clone());
            }
        }

        let mut priority_paths = Vec::new();
        for (file, fp) in sample {
            let path_str = file.path.display().to_string();
            let stored = cursor::get(self.db.conn(), &path_str)?;
            let fully_ingested = stored.is_some_and(|c| {
                c.device_id == fp.device_id
                    && c.inode == fp.inode
                    && c.offset_bytes == fp.size_bytes
                    && c.file_size_bytes == fp.size_bytes
                    && c.file_mtime_ms == fp.mtime_ms
            });
            if !fully_ingested {
                priority_paths.push(path_str);
            }
        }

        Ok(ParityScope {
            sampled_count: sampled_session_ids.len(),
            sampled_session_ids,
            sessions_in_range_total,
            missing_coverage_count: priority_paths.len(),
            priority_paths,
            session_limit: limit,
        })
    }
}
