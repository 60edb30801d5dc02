use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;

use clawctl_engine::{
    ExploreParams, ExploreService, GroupBy, ParityScopeResolver, SyncBudget, UsageSyncEngine,
    normalize,
};
use clawctl_runtime::{
    Dispatcher, ModelCatalog, OpenclawClient, OpsIntake, RuntimeConfig, SpawnRequest,
    TelemetrySync, compute_overlay,
};
use clawctl_store::{Database, queries::agent_session};
use clawctl_types::parse_timestamp_ms;

use crate::args::{
    AgentCommand, DbCommand, ExploreArgs, ExploreCommand, ModelsCommand, OpsCommand, OutputFormat,
    SessionCommand, UsageCommand,
};
use crate::output;

pub fn usage(
    db: &Database,
    config: &RuntimeConfig,
    format: OutputFormat,
    command: UsageCommand,
) -> Result<()> {
    match command {
        UsageCommand::Sync { max_ms, max_files } => {
            let engine = UsageSyncEngine::new(db, config.home.clone());
            let stats = engine.sync_usage(SyncBudget { max_ms, max_files })?;
            emit(format, &stats, output::sync_stats)
        }
        UsageCommand::Parity { from, to, limit } => {
            let from_ms = parse_instant(&from).context("parsing --from")?;
            let to_ms = parse_instant(&to).context("parsing --to")?;
            let resolver = ParityScopeResolver::new(db, config.home.clone());
            let scope = resolver.resolve(from_ms, to_ms, limit)?;
            emit(format, &scope, output::parity_scope)
        }
    }
}

pub fn explore(db: &Database, format: OutputFormat, command: ExploreCommand) -> Result<()> {
    let service = ExploreService::new(db);
    let now_ms = Utc::now().timestamp_millis();

    match command {
        ExploreCommand::Summary(args) => {
            let request = normalize(to_params(args)?, now_ms)?;
            emit(format, &service.get_summary(&request)?, output::summary)
        }
        ExploreCommand::Breakdown { group_by, args } => {
            let group_by = GroupBy::parse(&group_by)?;
            let request = normalize(to_params(args)?, now_ms)?;
            emit(
                format,
                &service.get_breakdown(&request, group_by)?,
                output::breakdown,
            )
        }
        ExploreCommand::Activity(args) => {
            let request = normalize(to_params(args)?, now_ms)?;
            emit(format, &service.get_activity(&request)?, output::activity)
        }
        ExploreCommand::Sessions(args) => {
            let request = normalize(to_params(args)?, now_ms)?;
            emit(format, &service.get_sessions(&request)?, output::sessions_page)
        }
        ExploreCommand::Options(args) => {
            let request = normalize(to_params(args)?, now_ms)?;
            emit(format, &service.get_options(&request)?, output::options)
        }
    }
}

pub fn session(
    db: &Database,
    config: &RuntimeConfig,
    format: OutputFormat,
    command: SessionCommand,
) -> Result<()> {
    match command {
        SessionCommand::Sync => {
            let sync = TelemetrySync::new(db, OpenclawClient::new(config.bin.clone()));
            let stats = runtime()?.block_on(sync.sync_agent_sessions())?;
            emit(format, &stats, output::telemetry)
        }
        SessionCommand::List => {
            let rows = agent_session::list_all(db.conn())?;
            let overlay = compute_overlay(&rows);

            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct SessionList {
                sessions: Vec<clawctl_store::AgentSessionRecord>,
                overlay: std::collections::HashMap<String, clawctl_runtime::AgentOverlay>,
            }

            emit(
                format,
                &SessionList {
                    sessions: rows,
                    overlay,
                },
                |list| output::session_list(&list.sessions, &list.overlay),
            )
        }
    }
}

pub fn agent(
    db: &Database,
    config: &RuntimeConfig,
    format: OutputFormat,
    command: AgentCommand,
) -> Result<()> {
    match command {
        AgentCommand::Spawn {
            agent,
            label,
            task,
            context,
            model,
            timeout_seconds,
        } => {
            let context = match context {
                Some(raw) => serde_json::from_str(&raw).context("parsing --context JSON")?,
                None => serde_json::Value::Null,
            };

            let request = SpawnRequest {
                agent_id: agent,
                label,
                task,
                context,
                model,
                timeout_seconds,
            };

            let dispatcher = Dispatcher::new(db, config.clone());
            let result = runtime()?.block_on(dispatcher.spawn(request))?;
            emit(format, &result, output::spawn_result)
        }
    }
}

pub fn ops(db: &Database, format: OutputFormat, command: OpsCommand) -> Result<()> {
    let intake = OpsIntake::new(db);
    match command {
        OpsCommand::Ingest { payload } => {
            let raw = match payload.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("reading payload file {path}"))?,
                None => payload,
            };
            let payload = serde_json::from_str(&raw).context("parsing payload JSON")?;
            emit(format, &intake.ingest(payload)?, output::intake_outcome)
        }
        OpsCommand::Poll {
            max_items,
            team,
            relay,
        } => {
            let items = intake.poll(max_items, team.as_deref(), relay.as_deref())?;
            emit(format, &items, |items| output::actionable_events(items))
        }
    }
}

pub fn models(config: &RuntimeConfig, format: OutputFormat, command: ModelsCommand) -> Result<()> {
    let client = OpenclawClient::new(config.bin.clone());
    let catalog = ModelCatalog::new(&client);
    match command {
        ModelsCommand::List => {
            let models = runtime()?.block_on(catalog.list())?;
            emit(format, &models, |models| output::model_list(models))
        }
        ModelsCommand::Status => {
            let status = runtime()?.block_on(catalog.status())?;
            emit(format, &status, |status| output::provider_auth(status))
        }
    }
}

pub fn db_maintenance(db: &Database, format: OutputFormat, command: DbCommand) -> Result<()> {
    match command {
        DbCommand::Vacuum => {
            db.vacuum()?;
            emit(format, &serde_json::json!({"vacuumed": true}), |_| {
                "database vacuumed".to_string()
            })
        }
    }
}

fn to_params(args: ExploreArgs) -> Result<ExploreParams> {
    let from_ms = args
        .from
        .as_deref()
        .map(|raw| parse_instant(raw).context("parsing --from"))
        .transpose()?;
    let to_ms = args
        .to
        .as_deref()
        .map(|raw| parse_instant(raw).context("parsing --to"))
        .transpose()?;

    Ok(ExploreParams {
        from_ms,
        to_ms,
        timezone: args.timezone,
        agents: args.agents,
        models: args.models,
        providers: args.providers,
        sources: args.sources,
        channels: args.channels,
        session_classes: args.session_classes,
        q: args.q,
        min_cost_micros: args.min_cost_micros.map(serde_json::Value::String),
        page: args.page,
        page_size: args.page_size,
        sort: args.sort,
    })
}

fn parse_instant(raw: &str) -> Result<i64> {
    match parse_timestamp_ms(raw) {
        Some(ms) => Ok(ms),
        None => bail!("not a timestamp (RFC 3339 or epoch ms): {raw:?}"),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("starting async runtime")
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    plain: impl FnOnce(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Plain => println!("{}", plain(value)),
    }
    Ok(())
}
