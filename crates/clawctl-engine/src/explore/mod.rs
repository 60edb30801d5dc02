mod activity;
mod breakdown;
mod options;
mod sessions;
mod summary;

pub use activity::{ActivityResult, HourBucket, WeekdayBucket};
pub use breakdown::{BreakdownGroup, BreakdownResult, GroupBy};
pub use options::OptionsResult;
pub use sessions::{SessionsPage, SessionsPageItem};
pub use summary::{DailyPoint, SummaryResult, SummaryTotals};

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use clawctl_store::{Database, DailyUsageRecord, SessionUsageRecord, queries::usage};
use clawctl_types::{day_start_ms, minute_floor_ms, model_key};

use crate::{Error, Result, cache::TtlCache};

const CACHE_TTL: Duration = Duration::from_secs(15);
const DAY_MS: i64 = 86_400_000;
const DEFAULT_RANGE_DAYS: i64 = 30;
pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploreSort {
    CostDesc,
    TokensDesc,
    RecentDesc,
}

/// Raw caller input; everything optional, everything validated during
/// normalization. Other queries keep working when one request is bad.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExploreParams {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub timezone: Option<String>,
    pub agents: Vec<String>,
    pub models: Vec<String>,
    pub providers: Vec<String>,
    pub sources: Vec<String>,
    pub channels: Vec<String>,
    pub session_classes: Vec<String>,
    pub q: Option<String>,
    pub min_cost_micros: Option<serde_json::Value>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExploreFilters {
    pub agents: Vec<String>,
    pub models: Vec<String>,
    pub providers: Vec<String>,
    pub sources: Vec<String>,
    pub channels: Vec<String>,
    pub session_classes: Vec<String>,
    pub q: Option<String>,
    pub min_cost_micros: Option<i64>,
}

/// Normalized query. Serializes canonically, which doubles as the cache
/// key.
#[derive(Debug, Clone, Serialize)]
pub struct ExploreRequest {
    pub from_ms: i64,
    pub to_ms: i64,
    pub timezone: String,
    pub filters: ExploreFilters,
    pub page: usize,
    pub page_size: usize,
    pub sort: ExploreSort,
}

/// Validate and default a raw query.
///
/// Reversed ranges swap; the default range is the last 30 days ending at
/// the current minute floor.
pub fn normalize(params: ExploreParams, now_ms: i64) -> Result<ExploreRequest> {
    let default_to = minute_floor_ms(now_ms);
    let mut from_ms = params.from_ms.unwrap_or(default_to - DEFAULT_RANGE_DAYS * DAY_MS);
    let mut to_ms = params.to_ms.unwrap_or(default_to);
    if from_ms > to_ms {
        std::mem::swap(&mut from_ms, &mut to_ms);
    }

    let timezone = params.timezone.unwrap_or_else(|| "UTC".to_string());
    if timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(Error::Validation(format!("unknown timezone: {timezone}")));
    }

    let sort = match params.sort.as_deref() {
        None | Some("cost_desc") => ExploreSort::CostDesc,
        Some("tokens_desc") => ExploreSort::TokensDesc,
        Some("recent_desc") => ExploreSort::RecentDesc,
        Some(other) => {
            return Err(Error::Validation(format!("unknown sort: {other}")));
        }
    };

    let min_cost_micros = match params.min_cost_micros {
        None => None,
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(v) => Some(v),
            None => {
                return Err(Error::Validation(format!(
                    "minCostMicros must be an integer, got {n}"
                )));
            }
        },
        Some(serde_json::Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(v) => Some(v),
            Err(_) => {
                return Err(Error::Validation(format!(
                    "minCostMicros must be an integer, got {s:?}"
                )));
            }
        },
        Some(other) => {
            return Err(Error::Validation(format!(
                "minCostMicros must be an integer, got {other}"
            )));
        }
    };

    let norm_list = |mut values: Vec<String>, lowercase: bool| {
        values.retain(|v| !v.trim().is_empty());
        for v in &mut values {
            *v = v.trim().to_string();
            if lowercase {
                *v = v.to_ascii_lowercase();
            }
        }
        values.sort();
        values.dedup();
        values
    };

    Ok(ExploreRequest {
        from_ms,
        to_ms,
        timezone,
        filters: ExploreFilters {
            agents: norm_list(params.agents, false),
            models: norm_list(params.models, true),
            providers: norm_list(params.providers, true),
            sources: norm_list(params.sources, false),
            channels: norm_list(params.channels, false),
            session_classes: norm_list(params.session_classes, true),
            q: params
                .q
                .map(|q| q.trim().to_ascii_lowercase())
                .filter(|q| !q.is_empty()),
            min_cost_micros,
        },
        page: params.page.unwrap_or(1).max(1),
        page_size: params
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
        sort,
    })
}

/// Filtered working set every explore query derives from.
pub(crate) struct BaseData {
    /// Retained sessions, by id.
    pub sessions: HashMap<String, SessionUsageRecord>,
    /// Daily rows of retained sessions inside the range (model-filtered).
    pub daily: Vec<DailyUsageRecord>,
    /// Retained ids, sorted (stable chunked SQL downstream).
    pub session_ids: Vec<String>,
}

/// Range/filter/group/search queries over the usage aggregates.
pub struct ExploreService<'a> {
    db: &'a Database,
    summary_cache: TtlCache<String, SummaryResult>,
    breakdown_cache: TtlCache<String, BreakdownResult>,
    activity_cache: TtlCache<String, ActivityResult>,
    sessions_cache: TtlCache<String, SessionsPage>,
    options_cache: TtlCache<String, OptionsResult>,
}

impl<'a> ExploreService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            summary_cache: TtlCache::new(CACHE_TTL),
            breakdown_cache: TtlCache::new(CACHE_TTL),
            activity_cache: TtlCache::new(CACHE_TTL),
            sessions_cache: TtlCache::new(CACHE_TTL),
            options_cache: TtlCache::new(CACHE_TTL),
        }
    }

    pub fn get_summary(&self, request: &ExploreRequest) -> Result<SummaryResult> {
        self.summary_cache
            .load_or_compute(cache_key("summary", request), || {
                let base = self.load_base(request)?;
                Ok(summary::compute(request, &base))
            })
    }

    pub fn get_breakdown(
        &self,
        request: &ExploreRequest,
        group_by: GroupBy,
    ) -> Result<BreakdownResult> {
        let key = format!("{}:{}", cache_key("breakdown", request), group_by.as_str());
        self.breakdown_cache.load_or_compute(key, || {
            let base = self.load_base(request)?;
            breakdown::compute(self.db, request, &base, group_by)
        })
    }

    pub fn get_activity(&self, request: &ExploreRequest) -> Result<ActivityResult> {
        self.activity_cache
            .load_or_compute(cache_key("activity", request), || {
                let base = self.load_base(request)?;
                activity::compute(self.db, request, &base)
            })
    }

    pub fn get_sessions(&self, request: &ExploreRequest) -> Result<SessionsPage> {
        self.sessions_cache
            .load_or_compute(cache_key("sessions", request), || {
                let base = self.load_base(request)?;
                Ok(sessions::compute(request, &base))
            })
    }

    pub fn get_options(&self, request: &ExploreRequest) -> Result<OptionsResult> {
        self.options_cache
            .load_or_compute(cache_key("options", request), || {
                let base = self.load_base(request)?;
                options::compute(self.db, request, &base)
            })
    }

    /// Join daily aggregates against session dimensions and apply every
    /// filter once; the per-query modules aggregate from here.
    pub(crate) fn load_base(&self, request: &ExploreRequest) -> Result<BaseData> {
        let from_day = day_start_ms(request.from_ms);
        let to_day = day_start_ms(request.to_ms);

        let candidate_ids =
            usage::session_ids_with_daily_in_range(self.db.conn(), from_day, to_day)?;
        let mut sessions: Vec<SessionUsageRecord> =
            usage::get_sessions_by_ids(self.db.conn(), &candidate_ids)?;

        sessions.retain(|s| matches_session(s, &request.filters));

        let mut ids: Vec<String> = sessions.iter().map(|s| s.session_id.clone()).collect();
        ids.sort();

        let mut daily = usage::daily_rows_for_sessions(self.db.conn(), &ids, from_day, to_day)?;
        if !request.filters.models.is_empty() {
            let models: HashSet<&str> =
                request.filters.models.iter().map(String::as_str).collect();
            daily.retain(|row| models.contains(row.model_key.as_str()));

            // a model filter also drops sessions without a matching row
            let with_rows: HashSet<&str> =
                daily.iter().map(|r| r.session_id.as_str()).collect();
            sessions.retain(|s| with_rows.contains(s.session_id.as_str()));
            ids.retain(|id| with_rows.contains(id.as_str()));
        }

        Ok(BaseData {
            sessions: sessions
                .into_iter()
                .map(|s| (s.session_id.clone(), s))
                .collect(),
            daily,
            session_ids: ids,
        })
    }
}

fn cache_key(op: &str, request: &ExploreRequest) -> String {
    let body = serde_json::to_string(request).unwrap_or_default();
    format!("{op}:{body}")
}

fn matches_session(session: &SessionUsageRecord, filters: &ExploreFilters) -> bool {
    let in_list = |list: &[String], value: &str| list.is_empty() || list.iter().any(|v| v == value);

    if !in_list(&filters.agents, &session.agent_id) {
        return false;
    }
    if !in_list(&filters.providers, &session.provider_key) {
        return false;
    }
    if !in_list(&filters.sources, session.identity.source.as_deref().unwrap_or("")) {
        return false;
    }
    if !in_list(&filters.channels, session.identity.channel.as_deref().unwrap_or("")) {
        return false;
    }
    if !in_list(&filters.session_classes, session.session_class.as_str()) {
        return false;
    }
    if let Some(min) = filters.min_cost_micros {
        if session.cost_micros < min {
            return false;
        }
    }
    if let Some(ref q) = filters.q {
        if !search_haystack(session).contains(q.as_str()) {
            return false;
        }
    }
    true
}

/// Concatenated identity fields the free-text `q` filter matches against.
fn search_haystack(session: &SessionUsageRecord) -> String {
    let identity = &session.identity;
    let key = model_key(session.model.as_deref());
    [
        session.session_id.as_str(),
        session.agent_id.as_str(),
        identity.session_key.as_deref().unwrap_or(""),
        identity.source.as_deref().unwrap_or(""),
        identity.channel.as_deref().unwrap_or(""),
        identity.session_kind.as_deref().unwrap_or(""),
        session.session_class.as_str(),
        session.provider_key.as_str(),
        identity.operation_id.as_deref().unwrap_or(""),
        identity.work_order_id.as_deref().unwrap_or(""),
        session.model.as_deref().unwrap_or(""),
        key.as_str(),
    ]
    .join("\n")
    .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        let now = 1_769_945_400_123;
        let req = normalize(ExploreParams::default(), now).unwrap();
        assert_eq!(req.to_ms, minute_floor_ms(now));
        assert_eq!(req.to_ms - req.from_ms, DEFAULT_RANGE_DAYS * DAY_MS);
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(req.sort, ExploreSort::CostDesc);
        assert_eq!(req.timezone, "UTC");
    }

    #[test]
    fn test_normalize_swaps_reversed_range() {
        let params = ExploreParams {
            from_ms: Some(2_000),
            to_ms: Some(1_000),
            ..Default::default()
        };
        let req = normalize(params, 10_000).unwrap();
        assert_eq!((req.from_ms, req.to_ms), (1_000, 2_000));
    }

    #[test]
    fn test_normalize_rejects_bad_inputs() {
        let bad_tz = ExploreParams {
            timezone: Some("Mars/Olympus".to_string()),
            ..Default::default()
        };
        assert!(matches!(normalize(bad_tz, 0), Err(Error::Validation(_))));

        let bad_sort = ExploreParams {
            sort: Some("alphabetical".to_string()),
            ..Default::default()
        };
        assert!(matches!(normalize(bad_sort, 0), Err(Error::Validation(_))));

        let bad_cost = ExploreParams {
            min_cost_micros: Some(serde_json::json!("lots")),
            ..Default::default()
        };
        assert!(matches!(normalize(bad_cost, 0), Err(Error::Validation(_))));
    }

    #[test]
    fn test_normalize_accepts_integer_string_cost() {
        let params = ExploreParams {
            min_cost_micros: Some(serde_json::json!("1500")),
            ..Default::default()
        };
        let req = normalize(params, 0).unwrap();
        assert_eq!(req.filters.min_cost_micros, Some(1500));
    }

    #[test]
    fn test_page_size_clamped() {
        let params = ExploreParams {
            page_size: Some(10_000),
            ..Default::default()
        };
        assert_eq!(normalize(params, 0).unwrap().page_size, MAX_PAGE_SIZE);

        let params = ExploreParams {
            page_size: Some(0),
            ..Default::default()
        };
        assert_eq!(normalize(params, 0).unwrap().page_size, 1);
    }
}
