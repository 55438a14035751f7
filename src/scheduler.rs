//! The one-shot/cron/interval trigger. Sleeps until the next scheduled run
//! using `tokio::time::sleep_until` plus a `CancellationToken` so a
//! shutdown signal interrupts the wait immediately instead of up to 1s
//! late.

use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("SCHEDULE_CRON and SCHEDULE_EVERY are mutually exclusive")]
    MutuallyExclusive,
    #[error("invalid cron expression `{0}`: {1}")]
    InvalidCron(String, String),
    #[error("SCHEDULE_EVERY must match ^\\d+[smh]$, got `{0}`")]
    InvalidEvery(String),
    #[error("cron expression `{0}` has no upcoming occurrence")]
    NoUpcomingOccurrence(String),
}

#[derive(Debug, Clone)]
pub enum Schedule {
    /// Run exactly once and exit.
    Once,
    /// `SCHEDULE_CRON`: a 5-field cron expression, evaluated in UTC.
    Cron(String),
    /// `SCHEDULE_EVERY`: run immediately then every interval.
    Every(Duration),
}

impl Schedule {
    pub fn from_env_values(cron: Option<String>, every: Option<String>) -> Result<Self, ScheduleError> {
        match (cron, every) {
            (Some(_), Some(_)) => Err(ScheduleError::MutuallyExclusive),
            (Some(expr), None) => {
                Cron::new(&expr)
                    .parse()
                    .map_err(|e| ScheduleError::InvalidCron(expr.clone(), e.to_string()))?;
                Ok(Schedule::Cron(expr))
            }
            (None, Some(every)) => Ok(Schedule::Every(parse_every(&every)?)),
            (None, None) => Ok(Schedule::Once),
        }
    }
}

fn parse_every(spec: &str) -> Result<Duration, ScheduleError> {
    let re = regex::Regex::new(r"^(\d+)([smh])$").unwrap();
    let caps = re
        .captures(spec)
        .ok_or_else(|| ScheduleError::InvalidEvery(spec.to_string()))?;
    let value: u64 = caps[1].parse().map_err(|_| ScheduleError::InvalidEvery(spec.to_string()))?;
    let seconds = match &caps[2] {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => unreachable!(),
    };
    Ok(Duration::from_secs(seconds))
}

fn next_cron_occurrence(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let cron = Cron::new(expr)
        .parse()
        .map_err(|e| ScheduleError::InvalidCron(expr.to_string(), e.to_string()))?;
    cron.find_next_occurrence(&after, false)
        .map_err(|_| ScheduleError::NoUpcomingOccurrence(expr.to_string()))
}

/// Run `tick` once per trigger of `schedule`, starting immediately for
/// `Once`/`Every` and at the first upcoming occurrence for `Cron`. Returns
/// once `Once` has fired, or when `cancel` fires during a wait.
pub async fn drive<F, Fut>(schedule: &Schedule, cancel: &CancellationToken, mut tick: F) -> Result<(), ScheduleError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    match schedule {
        Schedule::Once => {
            tick().await;
            Ok(())
        }
        Schedule::Every(interval) => {
            loop {
                tick().await;
                if !sleep_cancellable(*interval, cancel).await {
                    return Ok(());
                }
            }
        }
        Schedule::Cron(expr) => {
            loop {
                let now = Utc::now();
                let next = next_cron_occurrence(expr, now)?;
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                if !sleep_cancellable(wait, cancel).await {
                    return Ok(());
                }
                tick().await;
            }
        }
    }
}

/// Sleep for `duration`, waking early on cancellation. Returns `false` if
/// cancelled, `true` if the full duration elapsed.
async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn rejects_both_cron_and_every() {
        let err = Schedule::from_env_values(Some("* * * * *".to_string()), Some("30s".to_string())).unwrap_err();
        assert!(matches!(err, ScheduleError::MutuallyExclusive));
    }

    #[test]
    fn neither_set_means_once() {
        let schedule = Schedule::from_env_values(None, None).unwrap();
        assert!(matches!(schedule, Schedule::Once));
    }

    #[test]
    fn every_parses_suffix_units() {
        assert_eq!(parse_every("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_every("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_every("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn every_rejects_bad_shape() {
        assert!(parse_every("soon").is_err());
        assert!(parse_every("10").is_err());
    }

    #[test]
    fn invalid_cron_expression_is_rejected_at_load() {
        let err = Schedule::from_env_values(Some("not a cron".to_string()), None).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron(_, _)));
    }

    #[tokio::test]
    async fn once_runs_tick_exactly_one_time() {
        let count = Arc::new(AtomicUsize::new(0));
        let schedule = Schedule::Once;
        let cancel = CancellationToken::new();
        let counter = count.clone();
        drive(&schedule, &cancel, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_an_interval_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let schedule = Schedule::Every(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let counter = count.clone();
        let handle = tokio::spawn(async move {
            drive(&schedule, &cancel_clone, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
