use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use clawctl_store::{Database, queries::usage};
use clawctl_types::{TokenCounters, day_start_ms, i64_string, provider_key};

use crate::{Error, Result};

use super::{BaseData, ExploreRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Agent,
    Model,
    Provider,
    Source,
    SessionClass,
    Tool,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Agent => "agent",
            GroupBy::Model => "model",
            GroupBy::Provider => "provider",
            GroupBy::Source => "source",
            GroupBy::SessionClass => "sessionClass",
            GroupBy::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Result<GroupBy> {
        match s {
            "agent" => Ok(GroupBy::Agent),
            "model" => Ok(GroupBy::Model),
            "provider" => Ok(GroupBy::Provider),
            "source" => Ok(GroupBy::Source),
            "sessionClass" | "session_class" => Ok(GroupBy::SessionClass),
            "tool" => Ok(GroupBy::Tool),
            other => Err(Error::Validation(format!("unknown groupBy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownGroup {
    pub key: String,
    pub counters: TokenCounters,
    #[serde(with = "i64_string")]
    pub cost_micros: i64,
    pub session_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownResult {
    pub group_by: String,
    pub groups: Vec<BreakdownGroup>,
}

pub(crate) fn compute(
    db: &Database,
    request: &ExploreRequest,
    base: &BaseData,
    group_by: GroupBy,
) -> Result<BreakdownResult> {
    let mut acc: BTreeMap<String, (TokenCounters, i64, HashSet<String>)> = BTreeMap::new();

    let mut bump =
        |key: String, counters: &TokenCounters, cost: i64, session_id: &str| {
            let slot = acc.entry(key).or_default();
            slot.0.add(counters);
            slot.1 = slot.1.saturating_add(cost);
            slot.2.insert(session_id.to_string());
        };

    match group_by {
        GroupBy::Tool => {
            let tool_rows = usage::tool_daily_rows_for_sessions(
                db.conn(),
                &base.session_ids,
                day_start_ms(request.from_ms),
                day_start_ms(request.to_ms),
            )?;

            // tool weights per (session, day); insertion order is the
            // deterministic tie-break for the integer remainder
            let mut weights: HashMap<(&str, i64), Vec<(&str, i64)>> = HashMap::new();
            for row in &tool_rows {
                weights
                    .entry((row.session_id.as_str(), row.day_start_ms))
                    .or_default()
                    .push((row.tool_name.as_str(), row.call_count));
            }

            for row in &base.daily {
                match weights.get(&(row.session_id.as_str(), row.day_start_ms)) {
                    Some(tools) if !tools.is_empty() => {
                        let tool_weights: Vec<i64> = tools.iter().map(|(_, w)| *w).collect();
                        let shares = attribute_counters(&row.counters, row.cost_micros, &tool_weights);
                        for ((tool, _), (counters, cost)) in tools.iter().zip(shares) {
                            bump(tool.to_string(), &counters, cost, &row.session_id);
                        }
                    }
                    _ => bump("unknown".to_string(), &row.counters, row.cost_micros, &row.session_id),
                }
            }
        }
        _ => {
            for row in &base.daily {
                let session = base.sessions.get(&row.session_id);
                let key = match group_by {
                    GroupBy::Agent => session
                        .map(|s| s.agent_id.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                    GroupBy::Model => row.model_key.clone(),
                    GroupBy::Provider => provider_key(&row.model_key),
                    GroupBy::Source => session
                        .and_then(|s| s.identity.source.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                    GroupBy::SessionClass => session
                        .map(|s| s.session_class.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    GroupBy::Tool => unreachable!(),
                };
                bump(key, &row.counters, row.cost_micros, &row.session_id);
            }
        }
    }

    let mut groups: Vec<BreakdownGroup> = acc
        .into_iter()
        .map(|(key, (counters, cost_micros, sessions))| BreakdownGroup {
            key,
            counters,
            cost_micros,
            session_count: sessions.len(),
        })
        .collect();

    groups.sort_by(|a, b| b.cost_micros.cmp(&a.cost_micros).then_with(|| a.key.cmp(&b.key)));

    Ok(BreakdownResult {
        group_by: group_by.as_str().to_string(),
        groups,
    })
}

/// Split every counter of one daily row across tool weights.
fn attribute_counters(
    counters: &TokenCounters,
    cost_micros: i64,
    weights: &[i64],
) -> Vec<(TokenCounters, i64)> {
    let input = distribute(counters.input_tokens, weights);
    let output = distribute(counters.output_tokens, weights);
    let cache_read = distribute(counters.cache_read_tokens, weights);
    let cache_write = distribute(counters.cache_write_tokens, weights);
    let total = distribute(counters.total_tokens, weights);
    let tool_calls = distribute(counters.tool_calls, weights);
    let cost = distribute(cost_micros, weights);

    (0..weights.len())
        .map(|i| {
            (
                TokenCounters {
                    input_tokens: input[i],
                    output_tokens: output[i],
                    cache_read_tokens: cache_read[i],
                    cache_write_tokens: cache_write[i],
                    total_tokens: total[i],
                    tool_calls: tool_calls[i],
                },
                cost[i],
            )
        })
        .collect()
}

/// Proportional integer split. The remainder after floor division goes to
/// the heaviest weight (first occurrence on ties) so the shares always
/// sum back to `value`.
fn distribute(value: i64, weights: &[i64]) -> Vec<i64> {
    let total: i64 = weights.iter().sum();
    if total <= 0 || weights.is_empty() {
        return vec![0; weights.len()];
    }

    let mut shares: Vec<i64> = weights
        .iter()
        .map(|w| ((value as i128 * *w as i128) / total as i128) as i64)
        .collect();

    let remainder = value - shares.iter().sum::<i64>();
    if remainder != 0 {
        let heaviest = weights
            .iter()
            .enumerate()
            .max_by(|(ia, wa), (ib, wb)| wa.cmp(wb).then(ib.cmp(ia)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        shares[heaviest] += remainder;
    }

    shares
}
