use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use clawctl_types::{SessionIdentity, TokenCounters, i64_string, model_key};

use super::{BaseData, ExploreRequest, ExploreSort};

const TOP_MODELS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsPageItem {
    pub session_id: String,
    pub agent_id: String,
    pub identity: SessionIdentity,
    pub session_class: String,
    pub provider_key: String,
    /// Range-scoped totals (not lifetime).
    pub counters: TokenCounters,
    #[serde(with = "i64_string")]
    pub cost_micros: i64,
    pub first_seen_at_ms: Option<i64>,
    pub last_seen_at_ms: Option<i64>,
    /// Top model labels by range cost, at most five.
    pub models: Vec<String>,
    pub model_count: usize,
    pub has_errors: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsPage {
    pub page: usize,
    pub page_size: usize,
    pub total_sessions: usize,
    pub items: Vec<SessionsPageItem>,
}

#[derive(Default)]
struct Collapsed {
    counters: TokenCounters,
    cost_micros: i64,
    // per model_key: (cost, tokens) for ranking the label list
    models: BTreeMap<String, (i64, i64)>,
}

pub(crate) fn compute(request: &ExploreRequest, base: &BaseData) -> SessionsPage {
    let mut collapsed: HashMap<&str, Collapsed> = HashMap::new();
    for row in &base.daily {
        let slot = collapsed.entry(row.session_id.as_str()).or_default();
        slot.counters.add(&row.counters);
        slot.cost_micros = slot.cost_micros.saturating_add(row.cost_micros);

        let model = slot.models.entry(row.model_key.clone()).or_default();
        model.0 = model.0.saturating_add(row.cost_micros);
        model.1 = model.1.saturating_add(row.counters.total_tokens);
    }

    let mut items: Vec<SessionsPageItem> = collapsed
        .into_iter()
        .filter_map(|(session_id, agg)| {
            let session = base.sessions.get(session_id)?;

            let mut ranked: Vec<(&String, &(i64, i64))> = agg.models.iter().collect();
            ranked.sort_by(|a, b| {
                let (cost_a, tokens_a) = *a.1;
                let (cost_b, tokens_b) = *b.1;
                cost_b
                    .cmp(&cost_a)
                    .then_with(|| tokens_b.cmp(&tokens_a))
                    .then_with(|| a.0.cmp(b.0))
            });

            let session_model_key = model_key(session.model.as_deref());
            let models: Vec<String> = ranked
                .iter()
                .take(TOP_MODELS)
                .map(|(key, _)| {
                    // the original-cased label survives only on the aggregate
                    match session.model.as_deref() {
                        Some(label) if session_model_key == **key => label.to_string(),
                        _ => (*key).clone(),
                    }
                })
                .collect();

            Some(SessionsPageItem {
                session_id: session.session_id.clone(),
                agent_id: session.agent_id.clone(),
                identity: session.identity.clone(),
                session_class: session.session_class.as_str().to_string(),
                provider_key: session.provider_key.clone(),
                counters: agg.counters,
                cost_micros: agg.cost_micros,
                first_seen_at_ms: session.first_seen_at_ms,
                last_seen_at_ms: session.last_seen_at_ms,
                model_count: agg.models.len(),
                models,
                has_errors: session.has_errors,
            })
        })
        .collect();

    match request.sort {
        ExploreSort::CostDesc => items.sort_by(|a, b| {
            b.cost_micros
                .cmp(&a.cost_micros)
                .then_with(|| a.session_id.cmp(&b.session_id))
        }),
        ExploreSort::TokensDesc => items.sort_by(|a, b| {
            b.counters
                .total_tokens
                .cmp(&a.counters.total_tokens)
                .then_with(|| a.session_id.cmp(&b.session_id))
        }),
        ExploreSort::RecentDesc => items.sort_by(|a, b| {
            b.last_seen_at_ms
                .cmp(&a.last_seen_at_ms)
                .then_with(|| a.session_id.cmp(&b.session_id))
        }),
    }

    let total_sessions = items.len();
    let start = (request.page - 1).saturating_mul(request.page_size);
    let items: Vec<SessionsPageItem> = items
        .into_iter()
        .skip(start)
        .take(request.page_size)
        .collect();

    SessionsPage {
        page: request.page,
        page_size: request.page_size,
        total_sessions,
        items,
    }
}
