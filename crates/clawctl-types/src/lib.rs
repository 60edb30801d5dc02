// Core domain types for the ClawControl usage/dispatch core.
// Schemas and pure classification rules only; no I/O.

mod classify;
mod error;
mod event;
mod time;
mod util;

pub use classify::{
    SessionClass, SessionState, Severity, extract_operation_id, extract_work_order_id, model_key,
    normalize_source_label, provider_key, source_from_session_key,
};
pub use error::{Error, Result};
pub use event::{SessionIdentity, TokenCounters, UsageEvent};
pub use time::{day_start_ms, hour_start_ms, minute_floor_ms, parse_timestamp_ms};
pub use util::{i64_string, truncate};
