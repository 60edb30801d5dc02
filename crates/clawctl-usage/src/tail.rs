use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::Result;

/// Physical identity + growth fingerprint of a session file.
///
/// `(device_id, inode)` is the identity; the path is convenience only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub device_id: i64,
    pub inode: i64,
    pub size_bytes: i64,
    pub mtime_ms: i64,
}

impl FileFingerprint {
    pub fn for_path(path: &Path) -> Result<FileFingerprint> {
        let meta = std::fs::metadata(path)?;
        Ok(Self::from_metadata(&meta))
    }

    pub fn from_metadata(meta: &std::fs::Metadata) -> FileFingerprint {
        let (device_id, inode) = identity(meta);
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        FileFingerprint {
            device_id,
            inode,
            size_bytes: meta.len() as i64,
            mtime_ms,
        }
    }
}

#[cfg(unix)]
fn identity(meta: &std::fs::Metadata) -> (i64, i64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev() as i64, meta.ino() as i64)
}

#[cfg(not(unix))]
fn identity(_meta: &std::fs::Metadata) -> (i64, i64) {
    (0, 0)
}

/// Read the byte window `[offset, end)` of a file and split it into lines.
///
/// The window is bounded by the size observed at stat time so the cursor
/// can be advanced to exactly `end` afterwards; bytes appended after the
/// stat are left for the next pass. A torn trailing line inside the
/// window fails JSON parsing upstream and is skipped.
pub fn read_window(path: &Path, offset: u64, end: u64) -> Result<Vec<String>> {
    if end <= offset {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = Vec::with_capacity((end - offset) as usize);
    file.take(end - offset).read_to_end(&mut buf)?;

    let text = String::from_utf8_lossy(&buf);
    Ok(text.lines().map(str::to_string).collect())
}
