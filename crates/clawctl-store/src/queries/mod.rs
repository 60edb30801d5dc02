pub mod agent_session;
pub mod cursor;
pub mod governance;
pub mod lease;
pub mod ops_event;
pub mod usage;
pub mod work_order;

use crate::Result;

/// Upper bound for one SQL `IN (...)` list, for portability across
/// SQLite-like stores.
pub const SQL_IN_CHUNK: usize = 900;

/// Run `fetch` over `ids` in chunks of at most [`SQL_IN_CHUNK`] and
/// concatenate the results.
pub(crate) fn for_id_chunks<T>(
    ids: &[String],
    mut fetch: impl FnMut(&[String]) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for chunk in ids.chunks(SQL_IN_CHUNK) {
        out.extend(fetch(chunk)?);
    }
    Ok(out)
}

/// `?,?,?` placeholder list for an `IN` clause.
pub(crate) fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

/// Bindable refs for a chunk of string ids.
pub(crate) fn id_params(ids: &[String]) -> Vec<&dyn rusqlite::ToSql> {
    ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect()
}
