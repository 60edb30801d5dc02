use clawctl_store::UsageCursorRecord;
use clawctl_usage::FileFingerprint;

/// Effective read position for one file, after identity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorDecision {
    pub start_offset: i64,
    pub was_reset: bool,
}

/// Compare the stored cursor against the current stat and decide where to
/// resume reading.
///
/// The cursor is invalidated (offset back to 0) when the file is not the
/// one the cursor was written for, or its content visibly went backwards:
/// device changed, inode changed, the file shrank below the offset, or
/// the mtime rewound while the size changed.
pub fn resolve_start_offset(
    cursor: Option<&UsageCursorRecord>,
    current: &FileFingerprint,
) -> CursorDecision {
    let Some(cursor) = cursor else {
        return CursorDecision {
            start_offset: 0,
            was_reset: false,
        };
    };

    let identity_changed =
        cursor.device_id != current.device_id || cursor.inode != current.inode;
    let truncated = current.size_bytes < cursor.offset_bytes;
    let suspicious_rewind = current.mtime_ms < cursor.file_mtime_ms
        && current.size_bytes != cursor.file_size_bytes;

    if identity_changed || truncated || suspicious_rewind {
        return CursorDecision {
            start_offset: 0,
            was_reset: true,
        };
    }

    CursorDecision {
        start_offset: cursor.offset_bytes,
        was_reset: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(device: i64, inode: i64, offset: i64, size: i64, mtime: i64) -> UsageCursorRecord {
        UsageCursorRecord {
            source_path: "/tmp/s1.jsonl".to_string(),
            agent_id: "a1".to_string(),
            session_id: "s1".to_string(),
            device_id: device,
            inode,
            offset_bytes: offset,
            file_size_bytes: size,
            file_mtime_ms: mtime,
            updated_at_ms: mtime,
        }
    }

    fn fp(device: i64, inode: i64, size: i64, mtime: i64) -> FileFingerprint {
        FileFingerprint {
            device_id: device,
            inode,
            size_bytes: size,
            mtime_ms: mtime,
        }
    }

    #[test]
    fn test_no_cursor_starts_at_zero_without_reset() {
        let d = resolve_start_offset(None, &fp(1, 2, 100, 50));
        assert_eq!(d, CursorDecision { start_offset: 0, was_reset: false });
    }

    #[test]
    fn test_grown_file_resumes_at_offset() {
        let c = cursor(1, 2, 4096, 4096, 1_000);
        let d = resolve_start_offset(Some(&c), &fp(1, 2, 8192, 2_000));
        assert_eq!(d, CursorDecision { start_offset: 4096, was_reset: false });
    }

    #[test]
    fn test_inode_change_resets() {
        let c = cursor(1, 2, 4096, 4096, 1_000);
        let d = resolve_start_offset(Some(&c), &fp(1, 3, 8192, 2_000));
        assert!(d.was_reset);
        assert_eq!(d.start_offset, 0);
    }

    #[test]
    fn test_device_change_resets() {
        let c = cursor(1, 2, 10, 10, 1_000);
        assert!(resolve_start_offset(Some(&c), &fp(9, 2, 10, 1_000)).was_reset);
    }

    #[test]
    fn test_truncation_resets() {
        // rewritten shorter with the same inode and an earlier mtime
        let c = cursor(1, 2, 4096, 4096, 2_000);
        let d = resolve_start_offset(Some(&c), &fp(1, 2, 512, 1_000));
        assert!(d.was_reset);
    }

    #[test]
    fn test_mtime_rewind_with_size_change_resets() {
        let c = cursor(1, 2, 100, 100, 2_000);
        let d = resolve_start_offset(Some(&c), &fp(1, 2, 200, 1_000));
        assert!(d.was_reset);
    }

    #[test]
    fn test_mtime_rewind_same_size_is_tolerated() {
        // clock skew alone (size unchanged) does not invalidate
        let c = cursor(1, 2, 100, 100, 2_000);
        let d = resolve_start_offset(Some(&c), &fp(1, 2, 100, 1_000));
        assert_eq!(d, CursorDecision { start_offset: 100, was_reset: false });
    }
}
