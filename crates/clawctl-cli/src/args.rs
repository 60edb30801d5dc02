// NOTE: Command Organization
//
// Namespaced subcommands (usage, explore, session, agent, ops, models, db)
// keep the surface discoverable; flat structures stop scaling past ~10
// commands.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Plain,
    /// Pretty-printed JSON
    Json,
}

#[derive(Parser)]
#[command(name = "clawctl")]
#[command(about = "Usage analytics and dispatch for the agent runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Runtime home containing agents/<id>/sessions (default: OPENCLAW_HOME or ~/.openclaw)
    #[arg(long, global = true)]
    pub home: Option<String>,

    /// Database path (default: platform data dir)
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[arg(long, value_enum, default_value = "json", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest session logs into usage aggregates
    Usage {
        #[command(subcommand)]
        command: UsageCommand,
    },
    /// Query usage aggregates
    Explore {
        #[command(subcommand)]
        command: ExploreCommand,
    },
    /// Live session telemetry
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Dispatch agent sessions
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Ops actionable events
    Ops {
        #[command(subcommand)]
        command: OpsCommand,
    },
    /// Runtime model catalog
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand)]
pub enum UsageCommand {
    /// Run one budget-bounded ingestion pass
    Sync {
        /// Wall-clock budget in milliseconds
        #[arg(long, default_value_t = 15_000)]
        max_ms: u64,
        /// File-count budget
        #[arg(long, default_value_t = 500)]
        max_files: usize,
    },
    /// Resolve the parity scope for a time window
    Parity {
        /// Range start (RFC 3339 or epoch ms)
        #[arg(long)]
        from: String,
        /// Range end (RFC 3339 or epoch ms)
        #[arg(long)]
        to: String,
        /// Sample size (default 1000, capped at 5000)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args, Default)]
pub struct ExploreArgs {
    /// Range start (RFC 3339 or epoch ms); default: 30 days ago
    #[arg(long)]
    pub from: Option<String>,
    /// Range end (RFC 3339 or epoch ms); default: now
    #[arg(long)]
    pub to: Option<String>,
    /// IANA zone for activity bucketing
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(long = "agent")]
    pub agents: Vec<String>,
    #[arg(long = "model")]
    pub models: Vec<String>,
    #[arg(long = "provider")]
    pub providers: Vec<String>,
    #[arg(long = "source")]
    pub sources: Vec<String>,
    #[arg(long = "channel")]
    pub channels: Vec<String>,
    #[arg(long = "class")]
    pub session_classes: Vec<String>,
    /// Case-insensitive substring over session identity fields
    #[arg(long)]
    pub q: Option<String>,
    #[arg(long)]
    pub min_cost_micros: Option<String>,
    #[arg(long)]
    pub page: Option<usize>,
    #[arg(long)]
    pub page_size: Option<usize>,
    /// cost_desc | tokens_desc | recent_desc
    #[arg(long)]
    pub sort: Option<String>,
}

#[derive(Subcommand)]
pub enum ExploreCommand {
    /// Range totals plus a dense daily series
    Summary(ExploreArgs),
    /// Grouped totals (agent, model, provider, source, sessionClass, tool)
    Breakdown {
        #[arg(long)]
        group_by: String,
        #[command(flatten)]
        args: ExploreArgs,
    },
    /// Weekday/hour activity buckets in the requested zone
    Activity(ExploreArgs),
    /// Paged per-session totals
    Sessions(ExploreArgs),
    /// Distinct filter values in the current result set
    Options(ExploreArgs),
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Poll runtime status and reconcile session rows
    Sync,
    /// List persisted session rows with the live-state overlay
    List,
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Spawn a session on the external runtime
    Spawn {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        label: String,
        #[arg(long)]
        task: String,
        /// Extra context JSON passed through to the session
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = clawctl_runtime::DEFAULT_SPAWN_TIMEOUT_SECONDS)]
        timeout_seconds: u64,
    },
}

#[derive(Subcommand)]
pub enum OpsCommand {
    /// Ingest one actionable-event payload (JSON)
    Ingest {
        /// Payload JSON, or @path to read it from a file
        #[arg(long)]
        payload: String,
    },
    /// Poll and mark unrelayed events
    Poll {
        #[arg(long, default_value_t = clawctl_runtime::MAX_POLL_ITEMS)]
        max_items: usize,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        relay: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ModelsCommand {
    /// All models known to the runtime
    List,
    /// Provider auth/oauth status
    Status,
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Reclaim unused database space
    Vacuum,
}
