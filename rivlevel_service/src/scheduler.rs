/// Timing decisions for the service loop.
///
/// Everything here is a pure function of an injected `now`; the binary owns
/// the actual sleeping.

use chrono::{DateTime, Duration, Utc};

use crate::publish::PublishState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    PublishNow,
    Wait(Duration),
}

/// Time left until `interval` has elapsed since `last`. Zero when due, and
/// when there is no previous event.
pub fn time_until_due(now: DateTime<Utc>, last: Option<DateTime<Utc>>, interval: Duration) -> Duration {
    match last {
        Some(last) => (last + interval - now).max(Duration::zero()),
        None => Duration::zero(),
    }
}

pub fn publish_decision(now: DateTime<Utc>, state: &PublishState, interval: Duration) -> Decision {
    let wait = time_until_due(now, state.last_published, interval);
    if wait <= Duration::zero() {
        Decision::PublishNow
    } else {
        Decision::Wait(wait)
    }
}

pub fn next_scrape_in(
    now: DateTime<Utc>,
    last_scrape: Option<DateTime<Utc>>,
    scrape_interval: Duration,
) -> Duration {
    time_until_due(now, last_scrape, scrape_interval)
}

/// Short wait used when there was nothing worth publishing.
pub fn retry_window(retry_secs: u64) -> Duration {
    Duration::seconds(i64::try_from(retry_secs).unwrap_or(i64::MAX / 1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 12, 4, h, m, 0).unwrap()
    }

    #[test]
    fn test_first_publication_is_immediate() {
        let state = PublishState::default();
        assert_eq!(
            publish_decision(at(22, 0), &state, Duration::seconds(4000)),
            Decision::PublishNow
        );
    }

    #[test]
    fn test_waits_for_remaining_interval() {
        let state = PublishState {
            last_published: Some(at(22, 0)),
            ..PublishState::default()
        };
        assert_eq!(
            publish_decision(at(22, 30), &state, Duration::seconds(4000)),
            Decision::Wait(Duration::seconds(4000 - 1800))
        );
    }

    #[test]
    fn test_publishes_once_interval_elapsed() {
        let state = PublishState {
            last_published: Some(at(20, 0)),
            ..PublishState::default()
        };
        assert_eq!(
            publish_decision(at(22, 0), &state, Duration::seconds(4000)),
            Decision::PublishNow
        );
    }

    #[test]
    fn test_next_scrape_in() {
        let interval = Duration::minutes(360);
        assert_eq!(next_scrape_in(at(12, 0), None, interval), Duration::zero());
        assert_eq!(next_scrape_in(at(13, 0), Some(at(12, 0)), interval), Duration::minutes(300));
        assert_eq!(next_scrape_in(at(19, 0), Some(at(12, 0)), interval), Duration::zero());
    }

    #[test]
    fn test_retry_window() {
        assert_eq!(retry_window(300), Duration::seconds(300));
    }
}
