mod args;
mod handlers;
mod output;

pub use args::{
    AgentCommand, Cli, Commands, DbCommand, ExploreArgs, ExploreCommand, ModelsCommand,
    OpsCommand, OutputFormat, SessionCommand, UsageCommand,
};

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use clawctl_runtime::RuntimeConfig;
use clawctl_store::Database;

/// Full binary entry: signal setup, argument parsing, dispatch, and
/// error reporting, returned as a process exit code.
pub fn main_entry() -> ExitCode {
    // Broken pipes (`clawctl ... | head`) should end the process quietly
    // instead of panicking on a failed write.
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = RuntimeConfig::from_env().context("resolving runtime configuration")?;
    if let Some(home) = &cli.home {
        config.home = PathBuf::from(home);
    }

    let db_path = resolve_db_path(cli.db.as_deref())?;
    let db = Database::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;
    let format = cli.format;

    match cli.command {
        Commands::Usage { command } => handlers::usage(&db, &config, format, command),
        Commands::Explore { command } => handlers::explore(&db, format, command),
        Commands::Session { command } => handlers::session(&db, &config, format, command),
        Commands::Agent { command } => handlers::agent(&db, &config, format, command),
        Commands::Ops { command } => handlers::ops(&db, format, command),
        Commands::Models { command } => handlers::models(&config, format, command),
        Commands::Db { command } => handlers::db_maintenance(&db, format, command),
    }
}

/// Database location: explicit flag, `CLAWCTL_PATH`, XDG data dir, then
/// `~/.clawctl`.
fn resolve_db_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }
    if let Ok(base) = std::env::var("CLAWCTL_PATH") {
        return Ok(PathBuf::from(base).join("clawctl.db"));
    }
    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("clawctl").join("clawctl.db"));
    }
    let home = dirs::home_dir().context("no home directory for database path")?;
    Ok(home.join(".clawctl").join("clawctl.db"))
}
