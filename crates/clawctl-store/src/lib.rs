// SQLite aggregate store for the usage core.
// Composite-key rows with increment upserts; raw session logs stay the
// source of truth and can always be re-ingested from byte zero.

mod db;
mod error;
pub mod queries;
mod records;
mod schema;

pub use db::{Database, SessionDeltaRows};
pub use error::{Error, Result};
pub use records::{
    AgentSessionRecord, DailyUsageRecord, HourlyUsageRecord, LeaseRecord,
    OpsActionableEventRecord, SessionUsageRecord, TeamGovernanceRecord, ToolDailyRecord,
    ToolTotalRecord, UsageCursorRecord, WorkOrderRecord,
};
pub use schema::SCHEMA_VERSION;
