use chrono::Utc;

use clawctl_store::{Database, queries::lease};

use crate::Result;

/// Run `f` under a named store lease.
///
/// Returns `Ok(None)` when another live owner holds the lease; callers
/// skip the work instead of blocking. The lease is released even when `f`
/// fails.
pub fn with_lease<T>(
    db: &Database,
    name: &str,
    ttl_ms: i64,
    f: impl FnOnce() -> Result<T>,
) -> Result<Option<T>> {
    let now_ms = Utc::now().timestamp_millis();
    let Some(owner) = lease::acquire(db.conn(), name, ttl_ms, now_ms)? else {
        return Ok(None);
    };

    let outcome = f();
    let released = lease::release(db.conn(), name, &owner);

    let value = outcome?;
    released?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_with_lease_runs_and_releases() {
        let db = Database::open_in_memory().unwrap();

        let ran = with_lease(&db, "job", 60_000, || Ok(42)).unwrap();
        assert_eq!(ran, Some(42));

        // released: a second call acquires again
        let again = with_lease(&db, "job", 60_000, || Ok(43)).unwrap();
        assert_eq!(again, Some(43));
    }

    #[test]
    fn test_with_lease_skips_when_held() {
        let db = Database::open_in_memory().unwrap();

        let nested = with_lease(&db, "job", 60_000, || {
            with_lease(&db, "job", 60_000, || Ok(1))
        })
        .unwrap();
        assert_eq!(nested, Some(None));
    }

    #[test]
    fn test_failure_still_releases() {
        let db = Database::open_in_memory().unwrap();

        let failed: Result<Option<()>> = with_lease(&db, "job", 60_000, || {
            Err(Error::Validation("boom".to_string()))
        });
        assert!(failed.is_err());

        let after = with_lease(&db, "job", 60_000, || Ok(7)).unwrap();
        assert_eq!(after, Some(7));
    }
}
