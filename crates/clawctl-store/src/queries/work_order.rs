use rusqlite::{Connection, OptionalExtension, params};

use crate::{Result, records::WorkOrderRecord};

pub fn insert(conn: &Connection, order: &WorkOrderRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO work_orders (id, agent_id, title, priority, tags, created_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            &order.id,
            &order.agent_id,
            &order.title,
            &order.priority,
            &order.tags,
            order.created_at_ms,
        ],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<WorkOrderRecord>> {
    let record = conn
        .query_row(
            r#"
            SELECT id, agent_id, title, priority, tags, created_at_ms
            FROM work_orders
            WHERE id = ?1
            "#,
            [id],
            |row| {
                Ok(WorkOrderRecord {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    title: row.get(2)?,
                    priority: row.get(3)?,
                    tags: row.get(4)?,
                    created_at_ms: row.get(5)?,
                })
            },
        )
        .optional()?;

    Ok(record)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM work_orders", [], |row| row.get(0))?;
    Ok(count as usize)
}
