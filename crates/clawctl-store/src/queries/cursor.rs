use rusqlite::{Connection, OptionalExtension, params};

use crate::{Result, records::UsageCursorRecord};

pub fn upsert(conn: &Connection, cursor: &UsageCursorRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO usage_cursors (
            source_path, agent_id, session_id, device_id, inode,
            offset_bytes, file_size_bytes, file_mtime_ms, updated_at_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(source_path) DO UPDATE SET
            agent_id = ?2,
            session_id = ?3,
            device_id = ?4,
            inode = ?5,
            offset_bytes = ?6,
            file_size_bytes = ?7,
            file_mtime_ms = ?8,
            updated_at_ms = ?9
        "#,
        params![
            &cursor.source_path,
            &cursor.agent_id,
            &cursor.session_id,
            cursor.device_id,
            cursor.inode,
            cursor.offset_bytes,
            cursor.file_size_bytes,
            cursor.file_mtime_ms,
            cursor.updated_at_ms,
        ],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, source_path: &str) -> Result<Option<UsageCursorRecord>> {
    let cursor = conn
        .query_row(
            r#"
            SELECT source_path, agent_id, session_id, device_id, inode,
                   offset_bytes, file_size_bytes, file_mtime_ms, updated_at_ms
            FROM usage_cursors
            WHERE source_path = ?1
            "#,
            [source_path],
            row_to_cursor,
        )
        .optional()?;

    Ok(cursor)
}

pub fn get_all(conn: &Connection) -> Result<Vec<UsageCursorRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT source_path, agent_id, session_id, device_id, inode,
               offset_bytes, file_size_bytes, file_mtime_ms, updated_at_ms
        FROM usage_cursors
        ORDER BY source_path
        "#,
    )?;

    let cursors = stmt
        .query_map([], row_to_cursor)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(cursors)
}

fn row_to_cursor(row: &rusqlite::Row<'_>) -> std::result::Result<UsageCursorRecord, rusqlite::Error> {
    Ok(UsageCursorRecord {
        source_path: row.get(0)?,
        agent_id: row.get(1)?,
        session_id: row.get(2)?,
        device_id: row.get(3)?,
        inode: row.get(4)?,
        offset_bytes: row.get(5)?,
        file_size_bytes: row.get(6)?,
        file_mtime_ms: row.get(7)?,
        updated_at_ms: row.get(8)?,
    })
}
