// Live-runtime integration: spawning sessions on the external runtime,
// reconciling its status telemetry, and de-duplicating cron actionables.

pub mod client;
pub mod config;
pub mod dispatch;
mod error;
pub mod intake;
pub mod models;
pub mod telemetry;

pub use client::{CommandOutput, OpenclawClient, STATUS_TIMEOUT};
pub use config::{DispatchMode, RuntimeConfig};
pub use dispatch::{
    DEFAULT_SPAWN_TIMEOUT_SECONDS, Dispatcher, SpawnRequest, SpawnResult, deterministic_session_id,
};
pub use error::{Error, Result};
pub use intake::{IntakeOutcome, IntakePayload, MAX_POLL_ITEMS, OpsIntake};
pub use models::{ModelCatalog, ModelInfo, ProviderAuth};
pub use telemetry::{AgentOverlay, TelemetryStats, TelemetrySync, compute_overlay, parse_status_entry};
