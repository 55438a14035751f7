//! The Verifier: a bounded polling loop that declares a service set healthy
//! once every container is either engine-reported healthy, or — lacking a
//! healthcheck — has held a stable restart count for a configured window.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineAdapter, EngineResult, Service};
use crate::executor::CommandExecutor;
use std::path::Path;

pub struct VerifyOutcome {
    pub ok: bool,
    pub message: String,
}

impl VerifyOutcome {
    fn ok() -> Self {
        Self {
            ok: true,
            message: "ok".to_string(),
        }
    }

    fn cancelled() -> Self {
        Self {
            ok: false,
            message: "cancelled".to_string(),
        }
    }

    fn timeout(after: Duration) -> Self {
        Self {
            ok: false,
            message: format!("verify timeout after {}s", after.as_secs()),
        }
    }
}

pub struct VerifierConfig {
    pub health_timeout: Duration,
    pub stable_window: Duration,
    pub poll_interval: Duration,
}

/// Per-container bookkeeping for the no-healthcheck stability rule, local to
/// one `verify` invocation — never shared across services or runs.
struct Tracking {
    restart_baseline: HashMap<String, u32>,
    stable_since: HashMap<String, Instant>,
}

impl Tracking {
    fn new() -> Self {
        Self {
            restart_baseline: HashMap::new(),
            stable_since: HashMap::new(),
        }
    }

    /// Returns `Some(reason)` if this container is not yet stable.
    fn observe(&mut self, key: &str, restart_count: u32, stable_window: Duration, now: Instant) -> Option<String> {
        match self.restart_baseline.get(key) {
            None => {
                self.restart_baseline.insert(key.to_string(), restart_count);
                self.stable_since.insert(key.to_string(), now);
                Some(format!("container not yet stable: {key} (baseline seeded)"))
            }
            Some(&baseline) if baseline != restart_count => {
                self.restart_baseline.insert(key.to_string(), restart_count);
                self.stable_since.insert(key.to_string(), now);
                Some(format!("container not yet stable: {key} (restart count changed)"))
            }
            Some(_) => {
                let since = *self.stable_since.get(key).unwrap_or(&now);
                if now.duration_since(since) < stable_window {
                    Some(format!("container not yet stable: {key} (waiting out stable window)"))
                } else {
                    None
                }
            }
        }
    }
}

/// Poll until every container in `services` is healthy/stable or the
/// configured timeout elapses. `cancel` short-circuits the loop immediately.
pub async fn verify<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    file: &Path,
    services: &[Service],
    config: &VerifierConfig,
    cancel: &CancellationToken,
) -> EngineResult<VerifyOutcome> {
    let start = Instant::now();
    let mut tracking = Tracking::new();

    loop {
        if cancel.is_cancelled() {
            return Ok(VerifyOutcome::cancelled());
        }

        let mut failure: Option<String> = None;

        for svc in services {
            let containers = engine.compose_ps_service(file, &svc.name).await;
            if containers.is_empty() {
                failure.get_or_insert_with(|| format!("service {} has no containers", svc.name));
                continue;
            }

            for cid in &containers {
                let state = engine.inspect_container(cid).await?;
                let key = format!("{}:{}", svc.name, cid);

                if !state.is_running() {
                    failure.get_or_insert_with(|| {
                        format!("container not running: {key} status={}", state.runtime_status)
                    });
                    continue;
                }

                match &state.health_status {
                    Some(health) if health != "healthy" => {
                        failure.get_or_insert_with(|| format!("container not healthy: {key} health={health}"));
                    }
                    Some(_) => {}
                    None => {
                        if let Some(reason) =
                            tracking.observe(&key, state.restart_count, config.stable_window, Instant::now())
                        {
                            failure.get_or_insert(reason);
                        }
                    }
                }
            }
        }

        if failure.is_none() {
            tracing::debug!("verify: all services stable");
            return Ok(VerifyOutcome::ok());
        }

        tracing::debug!("verify: iteration not yet ok: {}", failure.unwrap());

        if start.elapsed() >= config.health_timeout {
            return Ok(VerifyOutcome::timeout(config.health_timeout));
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = cancel.cancelled() => return Ok(VerifyOutcome::cancelled()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockExecutor;

    fn svc(name: &str) -> Service {
        Service {
            name: name.to_string(),
            image: format!("{name}:latest"),
        }
    }

    fn fast_config() -> VerifierConfig {
        VerifierConfig {
            health_timeout: Duration::from_millis(200),
            stable_window: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn healthy_on_first_poll_succeeds_immediately() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q web",
            "c1\n",
        );
        mock.ok(
            "docker inspect c1",
            r#"[{"State":{"Status":"running","Health":{"Status":"healthy"}}}]"#,
        );
        let mut engine = EngineAdapter::new(mock);
        let outcome = verify(
            &mut engine,
            Path::new("/app/docker-compose.yml"),
            &[svc("web")],
            &fast_config(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.message, "ok");
    }

    #[tokio::test]
    async fn no_containers_times_out() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q web",
            "",
        );
        let mut engine = EngineAdapter::new(mock);
        let outcome = verify(
            &mut engine,
            Path::new("/app/docker-compose.yml"),
            &[svc("web")],
            &fast_config(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!outcome.ok);
        assert!(outcome.message.starts_with("verify timeout after"));
    }

    #[tokio::test]
    async fn no_healthcheck_becomes_stable_after_window() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q worker",
            "c1\n",
        );
        mock.ok(
            "docker inspect c1",
            r#"[{"State":{"Status":"running","RestartCount":0}}]"#,
        );
        let mut engine = EngineAdapter::new(mock);
        let config = VerifierConfig {
            health_timeout: Duration::from_millis(500),
            stable_window: Duration::from_millis(30),
            poll_interval: Duration::from_millis(10),
        };
        let outcome = verify(
            &mut engine,
            Path::new("/app/docker-compose.yml"),
            &[svc("worker")],
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn crashloop_never_stabilizes() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q worker",
            "c1\n",
        );
        mock.ok_sequence(
            "docker inspect c1",
            vec![
                r#"[{"State":{"Status":"running","RestartCount":0}}]"#.to_string(),
                r#"[{"State":{"Status":"running","RestartCount":1}}]"#.to_string(),
                r#"[{"State":{"Status":"running","RestartCount":2}}]"#.to_string(),
                r#"[{"State":{"Status":"running","RestartCount":3}}]"#.to_string(),
                r#"[{"State":{"Status":"running","RestartCount":4}}]"#.to_string(),
                r#"[{"State":{"Status":"running","RestartCount":5}}]"#.to_string(),
            ],
        );
        let mut engine = EngineAdapter::new(mock);
        let config = VerifierConfig {
            health_timeout: Duration::from_millis(60),
            stable_window: Duration::from_millis(30),
            poll_interval: Duration::from_millis(10),
        };
        let outcome = verify(
            &mut engine,
            Path::new("/app/docker-compose.yml"),
            &[svc("worker")],
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!outcome.ok);
        assert!(outcome.message.starts_with("verify timeout after"));
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q web",
            "",
        );
        let mut engine = EngineAdapter::new(mock);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = verify(
            &mut engine,
            Path::new("/app/docker-compose.yml"),
            &[svc("web")],
            &fast_config(),
            &token,
        )
        .await
        .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "cancelled");
    }
}
