use rusqlite::{Connection, OptionalExtension, params};

use crate::{Result, records::TeamGovernanceRecord};

pub fn get(conn: &Connection, team_id: &str) -> Result<Option<TeamGovernanceRecord>> {
    let record = conn
        .query_row(
            r#"
            SELECT team_id, ops_agent_template, relay_key
            FROM team_governance
            WHERE team_id = ?1
            "#,
            [team_id],
            |row| {
                Ok(TeamGovernanceRecord {
                    team_id: row.get(0)?,
                    ops_agent_template: row.get(1)?,
                    relay_key: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(record)
}

pub fn upsert(conn: &Connection, record: &TeamGovernanceRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO team_governance (team_id, ops_agent_template, relay_key)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(team_id) DO UPDATE SET
            ops_agent_template = ?2,
            relay_key = ?3
        "#,
        params![&record.team_id, &record.ops_agent_template, &record.relay_key],
    )?;

    Ok(())
}
