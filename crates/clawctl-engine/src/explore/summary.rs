use std::collections::BTreeMap;

use serde::Serialize;

use clawctl_types::{TokenCounters, day_start_ms, i64_string};

use super::{BaseData, ExploreRequest};

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub counters: TokenCounters,
    #[serde(with = "i64_string")]
    pub cost_micros: i64,
    /// `cacheRead / (cacheRead + input)` as a percentage.
    pub cache_efficiency_pct: f64,
    pub session_count: usize,
    #[serde(with = "i64_string")]
    pub avg_tokens_per_day: i64,
    #[serde(with = "i64_string")]
    pub avg_cost_micros_per_day: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub day_start_ms: i64,
    pub counters: TokenCounters,
    #[serde(with = "i64_string")]
    pub cost_micros: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub totals: SummaryTotals,
    /// Dense series: one point per day in the range, zero-filled.
    pub series: Vec<DailyPoint>,
}

pub(crate) fn compute(request: &ExploreRequest, base: &BaseData) -> SummaryResult {
    let from_day = day_start_ms(request.from_ms);
    let to_day = day_start_ms(request.to_ms);
    let day_count = ((to_day - from_day) / DAY_MS + 1).max(1);

    let mut totals = TokenCounters::default();
    let mut cost_micros = 0i64;
    let mut per_day: BTreeMap<i64, (TokenCounters, i64)> = BTreeMap::new();

    for row in &base.daily {
        totals.add(&row.counters);
        cost_micros = cost_micros.saturating_add(row.cost_micros);

        let slot = per_day.entry(row.day_start_ms).or_default();
        slot.0.add(&row.counters);
        slot.1 = slot.1.saturating_add(row.cost_micros);
    }

    let mut series = Vec::with_capacity(day_count as usize);
    let mut day = from_day;
    while day <= to_day {
        let (counters, cost) = per_day.get(&day).copied().unwrap_or_default();
        series.push(DailyPoint {
            day_start_ms: day,
            counters,
            cost_micros: cost,
        });
        day += DAY_MS;
    }

    let cache_denominator = totals.cache_read_tokens + totals.input_tokens;
    let cache_efficiency_pct = if cache_denominator > 0 {
        totals.cache_read_tokens as f64 / cache_denominator as f64 * 100.0
    } else {
        0.0
    };

    SummaryResult {
        totals: SummaryTotals {
            cache_efficiency_pct,
            session_count: base.sessions.len(),
            avg_tokens_per_day: totals.total_tokens / day_count,
            avg_cost_micros_per_day: cost_micros / day_count,
            counters: totals,
            cost_micros,
        },
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explore::{ExploreFilters, ExploreSort};
    use clawctl_store::DailyUsageRecord;
    use std::collections::HashMap;

    fn request(from_ms: i64, to_ms: i64) -> ExploreRequest {
        ExploreRequest {
            from_ms,
            to_ms,
            timezone: "UTC".to_string(),
            filters: ExploreFilters::default(),
            page: 1,
            page_size: 50,
            sort: ExploreSort::CostDesc,
        }
    }

    fn daily(session: &str, day: i64, total: i64, cost: i64) -> DailyUsageRecord {
        DailyUsageRecord {
            session_id: session.to_string(),
            day_start_ms: day,
            model_key: "unknown".to_string(),
            counters: TokenCounters {
                total_tokens: total,
                ..Default::default()
            },
            cost_micros: cost,
        }
    }

    #[test]
    fn test_series_is_dense_and_totals_match() {
        // three-day range with data on the first and last day only
        let base = BaseData {
            sessions: HashMap::new(),
            daily: vec![daily("s1", 0, 100, 10), daily("s2", 2 * DAY_MS, 50, 5)],
            session_ids: vec![],
        };
        let result = compute(&request(0, 2 * DAY_MS + 3_600_000), &base);

        assert_eq!(result.series.len(), 3);
        assert_eq!(result.series[0].counters.total_tokens, 100);
        assert_eq!(result.series[1].counters.total_tokens, 0);
        assert_eq!(result.series[2].counters.total_tokens, 50);

        // summing the series equals the reported range total
        let series_sum: i64 = result.series.iter().map(|p| p.counters.total_tokens).sum();
        assert_eq!(series_sum, result.totals.counters.total_tokens);
        assert_eq!(result.totals.cost_micros, 15);
        assert_eq!(result.totals.avg_tokens_per_day, 50);
    }

    #[test]
    fn test_cache_efficiency() {
        let mut row = daily("s1", 0, 0, 0);
        row.counters.cache_read_tokens = 300;
        row.counters.input_tokens = 100;
        let base = BaseData {
            sessions: HashMap::new(),
            daily: vec![row],
            session_ids: vec![],
        };

        let result = compute(&request(0, 0), &base);
        assert!((result.totals.cache_efficiency_pct - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_range_is_all_zeroes() {
        let base = BaseData {
            sessions: HashMap::new(),
            daily: vec![],
            session_ids: vec![],
        };
        let result = compute(&request(0, DAY_MS), &base);
        assert_eq!(result.series.len(), 2);
        assert_eq!(result.totals.counters, TokenCounters::default());
        assert_eq!(result.totals.cache_efficiency_pct, 0.0);
    }
}
