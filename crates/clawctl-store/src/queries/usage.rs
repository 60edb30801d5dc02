use rusqlite::{Connection, OptionalExtension, params};

use clawctl_types::{SessionClass, SessionIdentity, TokenCounters};

use crate::{
    Result,
    records::{DailyUsageRecord, HourlyUsageRecord, SessionUsageRecord, ToolDailyRecord, ToolTotalRecord},
};

use super::{for_id_chunks, id_params, placeholders};

/// Apply one session delta row to the lifetime aggregate.
///
/// Counters increment; identity fields follow coalesce-then-overlay
/// (delta first, existing fills the blanks); the class is re-derived from
/// the merged identity and elevated to the highest rank seen; the error
/// bit is sticky.
pub fn upsert_aggregate(conn: &Connection, delta: &SessionUsageRecord) -> Result<()> {
    let existing = get_by_id(conn, &delta.session_id)?;

    let mut identity = delta.identity.clone();
    if let Some(ref ex) = existing {
        identity.coalesce_from(&ex.identity);
    }

    let model = match delta.model.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => delta.model.clone(),
        _ => existing.as_ref().and_then(|ex| ex.model.clone()),
    };

    let provider_key = if delta.provider_key != "unknown" {
        delta.provider_key.clone()
    } else {
        existing
            .as_ref()
            .map(|ex| ex.provider_key.clone())
            .unwrap_or_else(|| "unknown".to_string())
    };

    let mut class = identity.classify().merge(delta.session_class);
    if let Some(ref ex) = existing {
        class = class.merge(ex.session_class);
    }

    conn.execute(
        r#"
        INSERT INTO session_usage (
            session_id, agent_id, session_key, source, channel, session_kind,
            session_class, provider_key, operation_id, work_order_id, model,
            input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
            total_tokens, tool_calls, cost_micros, has_errors,
            first_seen_at_ms, last_seen_at_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
        ON CONFLICT(session_id) DO UPDATE SET
            agent_id = excluded.agent_id,
            session_key = excluded.session_key,
            source = excluded.source,
            channel = excluded.channel,
            session_kind = excluded.session_kind,
            session_class = excluded.session_class,
            provider_key = excluded.provider_key,
            operation_id = excluded.operation_id,
            work_order_id = excluded.work_order_id,
            model = excluded.model,
            input_tokens = session_usage.input_tokens + excluded.input_tokens,
            output_tokens = session_usage.output_tokens + excluded.output_tokens,
            cache_read_tokens = session_usage.cache_read_tokens + excluded.cache_read_tokens,
            cache_write_tokens = session_usage.cache_write_tokens + excluded.cache_write_tokens,
            total_tokens = session_usage.total_tokens + excluded.total_tokens,
            tool_calls = session_usage.tool_calls + excluded.tool_calls,
            cost_micros = session_usage.cost_micros + excluded.cost_micros,
            has_errors = MAX(session_usage.has_errors, excluded.has_errors),
            first_seen_at_ms = MIN(
                COALESCE(session_usage.first_seen_at_ms, excluded.first_seen_at_ms),
                COALESCE(excluded.first_seen_at_ms, session_usage.first_seen_at_ms)
            ),
            last_seen_at_ms = MAX(
                COALESCE(session_usage.last_seen_at_ms, excluded.last_seen_at_ms),
                COALESCE(excluded.last_seen_at_ms, session_usage.last_seen_at_ms)
            )
        "#,
        params![
            &delta.session_id,
            &delta.agent_id,
            &identity.session_key,
            &identity.source,
            &identity.channel,
            &identity.session_kind,
            class.as_str(),
            &provider_key,
            &identity.operation_id,
            &identity.work_order_id,
            &model,
            delta.counters.input_tokens,
            delta.counters.output_tokens,
            delta.counters.cache_read_tokens,
            delta.counters.cache_write_tokens,
            delta.counters.total_tokens,
            delta.counters.tool_calls,
            delta.cost_micros,
            delta.has_errors as i64,
            delta.first_seen_at_ms,
            delta.last_seen_at_ms,
        ],
    )?;

    Ok(())
}

pub fn increment_daily(conn: &Connection, row: &DailyUsageRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_daily_usage (
            session_id, day_start_ms, model_key, input_tokens, output_tokens,
            cache_read_tokens, cache_write_tokens, total_tokens, tool_calls, cost_micros
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(session_id, day_start_ms, model_key) DO UPDATE SET
            input_tokens = session_daily_usage.input_tokens + excluded.input_tokens,
            output_tokens = session_daily_usage.output_tokens + excluded.output_tokens,
            cache_read_tokens = session_daily_usage.cache_read_tokens + excluded.cache_read_tokens,
            cache_write_tokens = session_daily_usage.cache_write_tokens + excluded.cache_write_tokens,
            total_tokens = session_daily_usage.total_tokens + excluded.total_tokens,
            tool_calls = session_daily_usage.tool_calls + excluded.tool_calls,
            cost_micros = session_daily_usage.cost_micros + excluded.cost_micros
        "#,
        params![
            &row.session_id,
            row.day_start_ms,
            &row.model_key,
            row.counters.input_tokens,
            row.counters.output_tokens,
            row.counters.cache_read_tokens,
            row.counters.cache_write_tokens,
            row.counters.total_tokens,
            row.counters.tool_calls,
            row.cost_micros,
        ],
    )?;

    Ok(())
}

pub fn increment_hourly(conn: &Connection, row: &HourlyUsageRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_hourly_usage (
            session_id, hour_start_ms, model_key, input_tokens, output_tokens,
            cache_read_tokens, cache_write_tokens, total_tokens, tool_calls, cost_micros
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(session_id, hour_start_ms, model_key) DO UPDATE SET
            input_tokens = session_hourly_usage.input_tokens + excluded.input_tokens,
            output_tokens = session_hourly_usage.output_tokens + excluded.output_tokens,
            cache_read_tokens = session_hourly_usage.cache_read_tokens + excluded.cache_read_tokens,
            cache_write_tokens = session_hourly_usage.cache_write_tokens + excluded.cache_write_tokens,
            total_tokens = session_hourly_usage.total_tokens + excluded.total_tokens,
            tool_calls = session_hourly_usage.tool_calls + excluded.tool_calls,
            cost_micros = session_hourly_usage.cost_micros + excluded.cost_micros
        "#,
        params![
            &row.session_id,
            row.hour_start_ms,
            &row.model_key,
            row.counters.input_tokens,
            row.counters.output_tokens,
            row.counters.cache_read_tokens,
            row.counters.cache_write_tokens,
            row.counters.total_tokens,
            row.counters.tool_calls,
            row.cost_micros,
        ],
    )?;

    Ok(())
}

pub fn increment_tool_daily(conn: &Connection, row: &ToolDailyRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_tool_daily (session_id, day_start_ms, tool_name, call_count)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(session_id, day_start_ms, tool_name) DO UPDATE SET
            call_count = session_tool_daily.call_count + excluded.call_count
        "#,
        params![&row.session_id, row.day_start_ms, &row.tool_name, row.call_count],
    )?;

    Ok(())
}

pub fn increment_tool_total(conn: &Connection, row: &ToolTotalRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_tool_totals (session_id, tool_name, call_count)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(session_id, tool_name) DO UPDATE SET
            call_count = session_tool_totals.call_count + excluded.call_count
        "#,
        params![&row.session_id, &row.tool_name, row.call_count],
    )?;

    Ok(())
}

pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionUsageRecord>> {
    let record = conn
        .query_row(
            &format!("{SELECT_SESSION} WHERE session_id = ?1"),
            [session_id],
            row_to_session,
        )
        .optional()?;

    Ok(record)
}

/// Distinct session ids touching any daily bucket inside the day range.
pub fn session_ids_with_daily_in_range(
    conn: &Connection,
    from_day_ms: i64,
    to_day_ms: i64,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT session_id
        FROM session_daily_usage
        WHERE day_start_ms >= ?1 AND day_start_ms <= ?2
        ORDER BY session_id
        "#,
    )?;

    let ids = stmt
        .query_map(params![from_day_ms, to_day_ms], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, rusqlite::Error>>()?;

    Ok(ids)
}

pub fn get_sessions_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<SessionUsageRecord>> {
    for_id_chunks(ids, |chunk| {
        let sql = format!("{SELECT_SESSION} WHERE session_id IN ({})", placeholders(chunk.len()));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(id_params(chunk).as_slice(), row_to_session)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(rows)
    })
}

pub fn daily_rows_for_sessions(
    conn: &Connection,
    ids: &[String],
    from_day_ms: i64,
    to_day_ms: i64,
) -> Result<Vec<DailyUsageRecord>> {
    for_id_chunks(ids, |chunk| {
        let sql = format!(
            r#"
            SELECT session_id, day_start_ms, model_key, input_tokens, output_tokens,
                   cache_read_tokens, cache_write_tokens, total_tokens, tool_calls, cost_micros
            FROM session_daily_usage
            WHERE day_start_ms >= ? AND day_start_ms <= ? AND session_id IN ({})
            ORDER BY session_id, day_start_ms, model_key
            "#,
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&from_day_ms, &to_day_ms];
        bind.extend(id_params(chunk));

        let rows = stmt
            .query_map(bind.as_slice(), |row| {
                Ok(DailyUsageRecord {
                    session_id: row.get(0)?,
                    day_start_ms: row.get(1)?,
                    model_key: row.get(2)?,
                    counters: row_counters(row, 3)?,
                    cost_micros: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(rows)
    })
}

pub fn hourly_rows_for_sessions(
    conn: &Connection,
    ids: &[String],
    from_ms: i64,
    to_ms: i64,
) -> Result<Vec<HourlyUsageRecord>> {
    for_id_chunks(ids, |chunk| {
        let sql = format!(
            r#"
            SELECT session_id, hour_start_ms, model_key, input_tokens, output_tokens,
                   cache_read_tokens, cache_write_tokens, total_tokens, tool_calls, cost_micros
            FROM session_hourly_usage
            WHERE hour_start_ms >= ? AND hour_start_ms <= ? AND session_id IN ({})
            ORDER BY session_id, hour_start_ms, model_key
            "#,
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&from_ms, &to_ms];
        bind.extend(id_params(chunk));

        let rows = stmt
            .query_map(bind.as_slice(), |row| {
                Ok(HourlyUsageRecord {
                    session_id: row.get(0)?,
                    hour_start_ms: row.get(1)?,
                    model_key: row.get(2)?,
                    counters: row_counters(row, 3)?,
                    cost_micros: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(rows)
    })
}

pub fn tool_daily_rows_for_sessions(
    conn: &Connection,
    ids: &[String],
    from_day_ms: i64,
    to_day_ms: i64,
) -> Result<Vec<ToolDailyRecord>> {
    for_id_chunks(ids, |chunk| {
        let sql = format!(
            r#"
            SELECT session_id, day_start_ms, tool_name, call_count
            FROM session_tool_daily
            WHERE day_start_ms >= ? AND day_start_ms <= ? AND session_id IN ({})
            ORDER BY session_id, day_start_ms, tool_name
            "#,
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&from_day_ms, &to_day_ms];
        bind.extend(id_params(chunk));

        let rows = stmt
            .query_map(bind.as_slice(), |row| {
                Ok(ToolDailyRecord {
                    session_id: row.get(0)?,
                    day_start_ms: row.get(1)?,
                    tool_name: row.get(2)?,
                    call_count: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(rows)
    })
}

const SELECT_SESSION: &str = r#"
    SELECT session_id, agent_id, session_key, source, channel, session_kind,
           session_class, provider_key, operation_id, work_order_id, model,
           input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
           total_tokens, tool_calls, cost_micros, has_errors,
           first_seen_at_ms, last_seen_at_ms
    FROM session_usage
"#;

fn row_counters(row: &rusqlite::Row<'_>, base: usize) -> std::result::Result<TokenCounters, rusqlite::Error> {
    Ok(TokenCounters {
        input_tokens: row.get(base)?,
        output_tokens: row.get(base + 1)?,
        cache_read_tokens: row.get(base + 2)?,
        cache_write_tokens: row.get(base + 3)?,
        total_tokens: row.get(base + 4)?,
        tool_calls: row.get(base + 5)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> std::result::Result<SessionUsageRecord, rusqlite::Error> {
    Ok(SessionUsageRecord {
        session_id: row.get(0)?,
        agent_id: row.get(1)?,
        identity: SessionIdentity {
            session_key: row.get(2)?,
            source: row.get(3)?,
            channel: row.get(4)?,
            session_kind: row.get(5)?,
            operation_id: row.get(8)?,
            work_order_id: row.get(9)?,
        },
        session_class: SessionClass::from_str_lossy(&row.get::<_, String>(6)?),
        provider_key: row.get(7)?,
        model: row.get(10)?,
        counters: row_counters(row, 11)?,
        cost_micros: row.get(17)?,
        has_errors: row.get::<_, i64>(18)? != 0,
        first_seen_at_ms: row.get(19)?,
        last_seen_at_ms: row.get(20)?,
    })
}
