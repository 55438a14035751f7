//! Environment-variable configuration: loaded once at startup via
//! `Config::from_env()`, failing fast on anything unparseable.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::{Schedule, ScheduleError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}=`{value}`: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid webhook URL `{0}`: {1}")]
    InvalidWebhook(String, String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub compose_root: PathBuf,
    pub ignore_services: HashSet<String>,
    pub health_timeout: Duration,
    pub stable_window: Duration,
    pub verify_poll: Duration,
    pub dingtalk_webhook: Option<reqwest::Url>,
    pub report_dir: PathBuf,
    pub schedule: Schedule,
}

fn parse_seconds_env(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(Duration::from_secs(default)),
        Ok(value) => {
            let parsed: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                name,
                value: value.clone(),
                reason: "expected a non-negative integer number of seconds".to_string(),
            })?;
            Ok(Duration::from_secs(parsed))
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let compose_root = std::env::var("COMPOSE_ROOT")
            .unwrap_or_else(|_| "/compose/projects".to_string())
            .into();

        let ignore_services = std::env::var("IGNORE_SERVICES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let health_timeout = parse_seconds_env("HEALTH_TIMEOUT_SECONDS", 180)?;
        let stable_window = parse_seconds_env("STABLE_SECONDS", 30)?;
        let verify_poll = parse_seconds_env("VERIFY_POLL_SECONDS", 3)?;

        let dingtalk_webhook = match std::env::var("DINGTALK_WEBHOOK") {
            Ok(raw) if !raw.trim().is_empty() => {
                let trimmed = raw.trim();
                let url = reqwest::Url::parse(trimmed)
                    .map_err(|e| ConfigError::InvalidWebhook(trimmed.to_string(), e.to_string()))?;
                Some(url)
            }
            _ => None,
        };

        let report_dir = std::env::var("REPORT_DIR")
            .unwrap_or_else(|_| "/reports".to_string())
            .into();

        let schedule_cron = std::env::var("SCHEDULE_CRON").ok().filter(|s| !s.is_empty());
        let schedule_every = std::env::var("SCHEDULE_EVERY").ok().filter(|s| !s.is_empty());
        let schedule = Schedule::from_env_values(schedule_cron, schedule_every)?;

        Ok(Self {
            compose_root,
            ignore_services,
            health_timeout,
            stable_window,
            verify_poll,
            dingtalk_webhook,
            report_dir,
            schedule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_guardian_env() {
        for key in [
            "COMPOSE_ROOT",
            "IGNORE_SERVICES",
            "HEALTH_TIMEOUT_SECONDS",
            "STABLE_SECONDS",
            "VERIFY_POLL_SECONDS",
            "DINGTALK_WEBHOOK",
            "REPORT_DIR",
            "SCHEDULE_CRON",
            "SCHEDULE_EVERY",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_spec() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_guardian_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.compose_root, PathBuf::from("/compose/projects"));
        assert_eq!(config.health_timeout, Duration::from_secs(180));
        assert_eq!(config.stable_window, Duration::from_secs(30));
        assert_eq!(config.verify_poll, Duration::from_secs(3));
        assert!(config.dingtalk_webhook.is_none());
        assert!(matches!(config.schedule, Schedule::Once));
        clear_guardian_env();
    }

    #[test]
    fn ignore_services_parses_comma_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_guardian_env();
        std::env::set_var("IGNORE_SERVICES", "a, b ,c");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.ignore_services,
            HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        clear_guardian_env();
    }

    #[test]
    fn invalid_timeout_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_guardian_env();
        std::env::set_var("HEALTH_TIMEOUT_SECONDS", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        clear_guardian_env();
    }

    #[test]
    fn mutually_exclusive_schedule_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_guardian_env();
        std::env::set_var("SCHEDULE_CRON", "0 3 * * *");
        std::env::set_var("SCHEDULE_EVERY", "30s");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Schedule(ScheduleError::MutuallyExclusive)));
        clear_guardian_env();
    }
}
