use serde_json::Value;

/// Coerce a JSON value into a non-negative token count.
///
/// Accepts numbers, numeric strings, and bigint-like strings (trailing
/// `n` from JS BigInt serialization). Anything else coerces to 0.
pub fn as_count(value: &Value) -> i64 {
    let n = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(f) = n.as_f64() {
                round_to_i64(f)
            } else {
                0
            }
        }
        Value::String(s) => parse_numeric_str(s),
        _ => 0,
    };
    n.max(0)
}

/// Coerce a JSON value into a USD amount, in micro-USD.
pub fn as_usd_micros(value: &Value) -> i64 {
    let usd = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    };
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    round_to_i64(usd * 1_000_000.0)
}

fn parse_numeric_str(s: &str) -> i64 {
    let s = s.trim();
    let s = s.strip_suffix('n').unwrap_or(s);
    if let Ok(i) = s.parse::<i64>() {
        return i;
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return round_to_i64(f);
        }
    }
    0
}

fn round_to_i64(f: f64) -> i64 {
    let r = f.round();
    if r >= i64::MAX as f64 {
        i64::MAX
    } else if r <= i64::MIN as f64 {
        i64::MIN
    } else {
        r as i64
    }
}

/// Look up a non-empty string at any of the candidate dotted paths.
pub fn first_string<'a>(obj: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    for path in paths {
        let mut cur = obj;
        let mut ok = true;
        for seg in *path {
            match cur.get(seg) {
                Some(next) => cur = next,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            continue;
        }
        if let Some(s) = cur.as_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    None
}

/// First present value among a list of sibling keys on one object.
pub fn first_key<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}
