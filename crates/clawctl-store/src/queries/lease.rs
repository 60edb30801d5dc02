use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::{Error, Result, records::LeaseRecord};

/// Try to take the named lease for `ttl_ms`.
///
/// Expired rows are purged first; the unique key on `name` then arbitrates
/// between concurrent claimants. Returns the owner id on success, `None`
/// when another live owner holds the lease. Callers skip, never block.
pub fn acquire(conn: &Connection, name: &str, ttl_ms: i64, now_ms: i64) -> Result<Option<String>> {
    conn.execute(
        "DELETE FROM leases WHERE name = ?1 AND expires_at_ms < ?2",
        params![name, now_ms],
    )?;

    let owner_id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        r#"
        INSERT INTO leases (name, owner_id, acquired_at_ms, expires_at_ms)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![name, &owner_id, now_ms, now_ms + ttl_ms],
    );

    match inserted {
        Ok(_) => Ok(Some(owner_id)),
        Err(err) => {
            let err = Error::from(err);
            if err.is_unique_violation() {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

/// Release the lease if (and only if) `owner_id` still owns it.
/// Stale releases are no-ops.
pub fn release(conn: &Connection, name: &str, owner_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM leases WHERE name = ?1 AND owner_id = ?2",
        params![name, owner_id],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, name: &str) -> Result<Option<LeaseRecord>> {
    let lease = conn
        .query_row(
            r#"
            SELECT name, owner_id, acquired_at_ms, expires_at_ms
            FROM leases
            WHERE name = ?1
            "#,
            [name],
            |row| {
                Ok(LeaseRecord {
                    name: row.get(0)?,
                    owner_id: row.get(1)?,
                    acquired_at_ms: row.get(2)?,
                    expires_at_ms: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(lease)
}
