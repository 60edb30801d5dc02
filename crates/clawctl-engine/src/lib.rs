// Ingestion and query engine: folds append-only session logs into the
// aggregate store and answers range/filter/group queries over it.

pub mod cache;
pub mod cursor;
pub mod delta;
mod error;
pub mod explore;
pub mod ingest;
pub mod lease;
pub mod parity;

pub use cache::TtlCache;
pub use cursor::{CursorDecision, resolve_start_offset};
pub use delta::SessionDelta;
pub use error::{Error, Result};
pub use explore::{
    ActivityResult, BreakdownResult, ExploreParams, ExploreRequest, ExploreService, ExploreSort,
    GroupBy, OptionsResult, SessionsPage, SummaryResult, normalize,
};
pub use ingest::{SyncBudget, SyncStats, USAGE_SYNC_LEASE, UsageSyncEngine};
pub use lease::with_lease;
pub use parity::{ParityScope, ParityScopeResolver};
