use chrono::{Datelike, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::Serialize;

use clawctl_store::{Database, queries::usage};
use clawctl_types::{TokenCounters, i64_string};

use crate::{Error, Result};

use super::{BaseData, ExploreRequest};

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayBucket {
    pub weekday: String,
    pub counters: TokenCounters,
    #[serde(with = "i64_string")]
    pub cost_micros: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    pub hour: u32,
    pub counters: TokenCounters,
    #[serde(with = "i64_string")]
    pub cost_micros: i64,
}

/// Weekday/hour heatmap input in the caller's zone. All 7 weekday and 24
/// hour buckets are always present, zeroes included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResult {
    pub timezone: String,
    pub weekdays: Vec<WeekdayBucket>,
    pub hours: Vec<HourBucket>,
}

pub(crate) fn compute(
    db: &Database,
    request: &ExploreRequest,
    base: &BaseData,
) -> Result<ActivityResult> {
    let tz: Tz = request
        .timezone
        .parse()
        .map_err(|_| Error::Validation(format!("unknown timezone: {}", request.timezone)))?;

    let mut hourly = usage::hourly_rows_for_sessions(
        db.conn(),
        &base.session_ids,
        clawctl_types::hour_start_ms(request.from_ms),
        request.to_ms,
    )?;
    if !request.filters.models.is_empty() {
        hourly.retain(|row| request.filters.models.iter().any(|m| *m == row.model_key));
    }

    let mut weekday_acc = [(TokenCounters::default(), 0i64); 7];
    let mut hour_acc = [(TokenCounters::default(), 0i64); 24];

    for row in &hourly {
        let Some(local) = tz.timestamp_millis_opt(row.hour_start_ms).single() else {
            continue;
        };
        let weekday = local.weekday().num_days_from_monday() as usize;
        let hour = local.hour() as usize;

        weekday_acc[weekday].0.add(&row.counters);
        weekday_acc[weekday].1 = weekday_acc[weekday].1.saturating_add(row.cost_micros);
        hour_acc[hour].0.add(&row.counters);
        hour_acc[hour].1 = hour_acc[hour].1.saturating_add(row.cost_micros);
    }

    Ok(ActivityResult {
        timezone: request.timezone.clone(),
        weekdays: WEEKDAYS
            .iter()
            .zip(weekday_acc)
            .map(|(name, (counters, cost_micros))| WeekdayBucket {
                weekday: name.to_string(),
                counters,
                cost_micros,
            })
            .collect(),
        hours: hour_acc
            .into_iter()
            .enumerate()
            .map(|(hour, (counters, cost_micros))| HourBucket {
                hour: hour as u32,
                counters,
                cost_micros,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explore::{ExploreFilters, ExploreSort};
    use clawctl_store::{HourlyUsageRecord, queries::usage as usage_q};
    use std::collections::HashMap;

    fn request(timezone: &str) -> ExploreRequest {
        ExploreRequest {
            from_ms: 0,
            to_ms: 10 * 86_400_000,
            timezone: timezone.to_string(),
            filters: ExploreFilters::default(),
            page: 1,
            page_size: 50,
            sort: ExploreSort::CostDesc,
        }
    }

    fn base_for(ids: &[&str]) -> BaseData {
        BaseData {
            sessions: HashMap::new(),
            daily: vec![],
            session_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn insert_hour(db: &Database, session: &str, hour_start_ms: i64, total: i64) {
        usage_q::increment_hourly(
            db.conn(),
            &HourlyUsageRecord {
                session_id: session.to_string(),
                hour_start_ms,
                model_key: "unknown".to_string(),
                counters: TokenCounters {
                    total_tokens: total,
                    ..Default::default()
                },
                cost_micros: 0,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_all_buckets_present_even_when_empty() {
        let db = Database::open_in_memory().unwrap();
        let result = compute(&db, &request("UTC"), &base_for(&[])).unwrap();
        assert_eq!(result.weekdays.len(), 7);
        assert_eq!(result.hours.len(), 24);
        assert!(result.hours.iter().all(|h| h.counters.total_tokens == 0));
    }

    #[test]
    fn test_utc_bucketing() {
        let db = Database::open_in_memory().unwrap();
        // 1970-01-01 was a Thursday; hour 10 UTC
        insert_hour(&db, "s1", 10 * 3_600_000, 42);

        let result = compute(&db, &request("UTC"), &base_for(&["s1"])).unwrap();
        assert_eq!(result.weekdays[3].weekday, "thursday");
        assert_eq!(result.weekdays[3].counters.total_tokens, 42);
        assert_eq!(result.hours[10].counters.total_tokens, 42);
    }

    #[test]
    fn test_zone_shifts_buckets() {
        let db = Database::open_in_memory().unwrap();
        // 23:00 UTC Thursday = 08:00 Friday in Tokyo (+9, no DST)
        insert_hour(&db, "s1", 23 * 3_600_000, 7);

        let result = compute(&db, &request("Asia/Tokyo"), &base_for(&["s1"])).unwrap();
        assert_eq!(result.weekdays[4].weekday, "friday");
        assert_eq!(result.weekdays[4].counters.total_tokens, 7);
        assert_eq!(result.hours[8].counters.total_tokens, 7);
    }
}
