use chrono::DateTime;

const DAY_MS: i64 = 86_400_000;
const HOUR_MS: i64 = 3_600_000;
const MINUTE_MS: i64 = 60_000;

/// UTC midnight of the day containing `ts_ms`
pub fn day_start_ms(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(DAY_MS) * DAY_MS
}

/// UTC hour start containing `ts_ms`
pub fn hour_start_ms(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(HOUR_MS) * HOUR_MS
}

/// Floor to the start of the current minute
pub fn minute_floor_ms(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(MINUTE_MS) * MINUTE_MS
}

/// Parse a log timestamp into epoch milliseconds.
///
/// Accepts RFC 3339 strings and raw epoch values (seconds or milliseconds;
/// anything >= 10^12 is treated as milliseconds).
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }

    if let Ok(n) = raw.parse::<i64>() {
        if n >= 1_000_000_000_000 {
            return Some(n);
        }
        return Some(n * 1000);
    }

    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() && f > 0.0 {
            if f >= 1e12 {
                return Some(f as i64);
            }
            return Some((f * 1000.0) as i64);
        }
    }

    None
}
