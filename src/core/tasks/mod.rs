// src/core/tasks/mod.rs

//! This module contains the long-running background tasks that support the
//! server's core functionality: buffer flushing, cache maintenance, and the
//! daily retention and archive schedules.

pub mod archive_cleanup;
pub mod buffer_flusher;
pub mod cache_sweeper;
pub mod retention_enforcer;

use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use std::time::Duration;

/// Time until the next wall-clock occurrence of `time` (UTC). Used by the
/// daily schedules (retention at 00:00, archive cleanup at 02:00).
pub(crate) fn until_next(time: NaiveTime) -> Duration {
    let now = Utc::now();
    let today = now.date_naive().and_time(time).and_utc();
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_occurrence_is_within_a_day() {
        let wait = until_next(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert!(wait <= Duration::from_secs(86_400));
        let wait = until_next(NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(86_400));
    }
}
