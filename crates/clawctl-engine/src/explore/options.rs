use std::collections::BTreeSet;

use serde::Serialize;

use clawctl_store::{Database, queries::usage};
use clawctl_types::day_start_ms;

use crate::Result;

use super::{BaseData, ExploreRequest};

/// Distinct non-empty values observed in the filtered result set, one
/// list per filter dimension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsResult {
    pub agents: Vec<String>,
    pub models: Vec<String>,
    pub providers: Vec<String>,
    pub sources: Vec<String>,
    pub channels: Vec<String>,
    pub session_classes: Vec<String>,
    pub tools: Vec<String>,
}

pub(crate) fn compute(
    db: &Database,
    request: &ExploreRequest,
    base: &BaseData,
) -> Result<OptionsResult> {
    let mut agents = BTreeSet::new();
    let mut providers = BTreeSet::new();
    let mut sources = BTreeSet::new();
    let mut channels = BTreeSet::new();
    let mut session_classes = BTreeSet::new();

    for session in base.sessions.values() {
        insert_non_empty(&mut agents, Some(&session.agent_id));
        insert_non_empty(&mut providers, Some(&session.provider_key));
        insert_non_empty(&mut sources, session.identity.source.as_deref());
        insert_non_empty(&mut channels, session.identity.channel.as_deref());
        insert_non_empty(&mut session_classes, Some(session.session_class.as_str()));
    }

    let models: BTreeSet<String> = base.daily.iter().map(|r| r.model_key.clone()).collect();

    let tool_rows = usage::tool_daily_rows_for_sessions(
        db.conn(),
        &base.session_ids,
        day_start_ms(request.from_ms),
        day_start_ms(request.to_ms),
    )?;
    let tools: BTreeSet<String> = tool_rows.into_iter().map(|r| r.tool_name).collect();

    Ok(OptionsResult {
        agents: agents.into_iter().collect(),
        models: models.into_iter().collect(),
        providers: providers.into_iter().collect(),
        sources: sources.into_iter().collect(),
        channels: channels.into_iter().collect(),
        session_classes: session_classes.into_iter().collect(),
        tools: tools.into_iter().collect(),
    })
}

fn insert_non_empty(set: &mut BTreeSet<String>, value: Option<&str>) {
    if let Some(v) = value {
        let v = v.trim();
        if !v.is_empty() {
            set.insert(v.to_string());
        }
    }
}
