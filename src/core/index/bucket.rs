// src/core/index/bucket.rs

//! Calendar bucketing for time-sliced partitions.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The granularity at which partitions are cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl BucketType {
    /// Formats the bucket label containing `ts` (epoch millis):
    /// `2023-10-10`, `2023-W41`, or `2023-10`.
    pub fn label_for(&self, ts: i64) -> String {
        let dt = datetime(ts);
        match self {
            BucketType::Daily => dt.format("%Y-%m-%d").to_string(),
            BucketType::Weekly => {
                let iso = dt.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            BucketType::Monthly => dt.format("%Y-%m").to_string(),
        }
    }

    /// Half-open `[start, end)` epoch-millis range of the bucket containing `ts`.
    pub fn range_for(&self, ts: i64) -> (i64, i64) {
        let dt = datetime(ts);
        match self {
            BucketType::Daily => {
                let start = dt.date_naive().and_hms_opt(0, 0, 0).expect("midnight");
                let end = start + Duration::days(1);
                (to_millis(start), to_millis(end))
            }
            BucketType::Weekly => {
                let days_from_monday = dt.weekday().num_days_from_monday() as i64;
                let start = (dt.date_naive() - Duration::days(days_from_monday))
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight");
                let end = start + Duration::days(7);
                (to_millis(start), to_millis(end))
            }
            BucketType::Monthly => {
                let start = NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)
                    .expect("first of month")
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight");
                let (next_year, next_month) = if dt.month() == 12 {
                    (dt.year() + 1, 1)
                } else {
                    (dt.year(), dt.month() + 1)
                };
                let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
                    .expect("first of month")
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight");
                (to_millis(start), to_millis(end))
            }
        }
    }

    /// True when `ts` falls inside the bucket labeled `label`.
    pub fn contains(&self, label: &str, ts: i64) -> bool {
        self.label_for(ts) == label
    }
}

fn datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts).unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

fn to_millis(naive: chrono::NaiveDateTime) -> i64 {
    Utc.from_utc_datetime(&naive).timestamp_millis()
}
