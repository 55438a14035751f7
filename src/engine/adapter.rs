use std::path::Path;

use super::errors::{EngineError, EngineResult};
use super::types::{ComposeConfig, ContainerState, ImageId, InspectEntry};
use crate::executor::CommandExecutor;

/// The Engine Adapter: a thin, side-effecting capability boundary over the
/// container engine CLI. Every call is synchronous from the caller's point
/// of view and returns captured output; only calls marked *required*
/// propagate a non-zero exit as an error — best-effort calls absorb it.
///
/// Generic over `T: CommandExecutor` so tests substitute an in-memory fake
/// instead of spawning real `docker`/`docker compose` processes.
pub struct EngineAdapter<T: CommandExecutor> {
    executor: T,
}

impl<T: CommandExecutor> EngineAdapter<T> {
    pub fn new(executor: T) -> Self {
        Self { executor }
    }

    /// Unwrap back to the underlying executor, for tests that want to
    /// inspect the call log after a run.
    pub fn into_executor(self) -> T {
        self.executor
    }

    fn compose_base(file: &Path) -> String {
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        format!(
            "docker compose --project-directory {} -f {}",
            dir.display(),
            file.display()
        )
    }

    /// `composeConfig(file)` — required.
    pub async fn compose_config(&mut self, file: &Path) -> EngineResult<ComposeConfig> {
        let cmd = format!("{} config --format json", Self::compose_base(file));
        let result = self.executor.execute_command(&cmd).await?;
        if !result.is_success() {
            return Err(EngineError::RequiredCallFailed {
                cmd,
                message: result.output.to_stderr_string().unwrap_or_default(),
            });
        }
        let stdout = result.output.to_stdout_string()?;
        serde_json::from_str(&stdout).map_err(|e| EngineError::ParseFailed {
            cmd,
            source: e.into(),
        })
    }

    /// `composePsRunning(file)` — best-effort.
    pub async fn compose_ps_running(&mut self, file: &Path) -> Vec<String> {
        let cmd = format!("{} ps -q --status running", Self::compose_base(file));
        self.best_effort_lines(&cmd).await
    }

    /// `composePsService(file, svc)` — best-effort.
    pub async fn compose_ps_service(&mut self, file: &Path, service: &str) -> Vec<String> {
        let cmd = format!("{} ps -q {}", Self::compose_base(file), service);
        self.best_effort_lines(&cmd).await
    }

    /// `composePull(file)` — best-effort.
    pub async fn compose_pull(&mut self, file: &Path) {
        let cmd = format!("{} pull", Self::compose_base(file));
        self.best_effort(&cmd).await;
    }

    /// `composeUp(file, svcs)` — best-effort. Uses force-recreate, no-deps.
    pub async fn compose_up(&mut self, file: &Path, services: &[String]) {
        let cmd = format!(
            "{} up -d --force-recreate --no-deps {}",
            Self::compose_base(file),
            services.join(" ")
        );
        self.best_effort(&cmd).await;
    }

    /// `inspectImage(ref)` — best-effort; empty id if absent.
    pub async fn inspect_image(&mut self, image_ref: &str) -> ImageId {
        let cmd = format!("docker image inspect -f {{{{.Id}}}} {image_ref}");
        match self.executor.execute_command(&cmd).await {
            Ok(result) if result.is_success() => ImageId(
                result
                    .output
                    .to_stdout_string()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            ),
            _ => ImageId::empty(),
        }
    }

    /// `inspectContainer(cid)` — required.
    pub async fn inspect_container(&mut self, container_id: &str) -> EngineResult<ContainerState> {
        let cmd = format!("docker inspect {container_id}");
        let result = self.executor.execute_command(&cmd).await?;
        if !result.is_success() {
            return Err(EngineError::RequiredCallFailed {
                cmd,
                message: result.output.to_stderr_string().unwrap_or_default(),
            });
        }
        let stdout = result.output.to_stdout_string()?;
        let entries: Vec<InspectEntry> =
            serde_json::from_str(&stdout).map_err(|e| EngineError::ParseFailed {
                cmd: cmd.clone(),
                source: e.into(),
            })?;
        let entry = entries.into_iter().next().ok_or_else(|| EngineError::ParseFailed {
            cmd,
            source: serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "docker inspect returned an empty array",
            ))
            .into(),
        })?;
        Ok(ContainerState {
            runtime_status: entry.state.status,
            health_status: entry.state.health.map(|h| h.status),
            restart_count: entry.state.restart_count,
        })
    }

    /// `tag(id, newRef)` — best-effort.
    pub async fn tag_image(&mut self, id: &ImageId, new_ref: &str) {
        let cmd = format!("docker tag {id} {new_ref}");
        self.best_effort(&cmd).await;
    }

    /// `remove(ref)` — best-effort.
    pub async fn remove_image(&mut self, image_ref: &str) {
        let cmd = format!("docker image rm {image_ref}");
        self.best_effort(&cmd).await;
    }

    /// `psByAncestor(id)` — best-effort.
    pub async fn ps_by_ancestor(&mut self, id: &ImageId) -> Vec<String> {
        let cmd = format!("docker ps -a --filter ancestor={id} -q");
        self.best_effort_lines(&cmd).await
    }

    async fn best_effort(&mut self, cmd: &str) {
        match self.executor.execute_command(cmd).await {
            Ok(result) if !result.is_success() => {
                tracing::debug!(
                    "best-effort command failed, continuing: {} ({})",
                    cmd,
                    result.output.to_stderr_string().unwrap_or_default()
                );
            }
            Err(e) => {
                tracing::debug!("best-effort command errored, continuing: {} ({})", cmd, e);
            }
            _ => {}
        }
    }

    async fn best_effort_lines(&mut self, cmd: &str) -> Vec<String> {
        match self.executor.execute_command(cmd).await {
            Ok(result) if result.is_success() => result
                .output
                .stdout_lines()
                .unwrap_or_default()
                .into_iter()
                .collect(),
            Ok(result) => {
                tracing::debug!(
                    "best-effort command failed, treating as empty: {} ({})",
                    cmd,
                    result.output.to_stderr_string().unwrap_or_default()
                );
                Vec::new()
            }
            Err(e) => {
                tracing::debug!("best-effort command errored, treating as empty: {} ({})", cmd, e);
                Vec::new()
            }
        }
    }
}

/// Extract `services[name].image` pairs from a parsed compose config,
/// preserving the declared order from `docker compose config --format
/// json` (the `ComposeConfig::services` map is an `IndexMap`, so iteration
/// order matches insertion order rather than hash order).
pub fn image_refs(config: &ComposeConfig) -> Vec<(String, Option<String>)> {
    config
        .services
        .iter()
        .map(|(name, svc)| (name.clone(), svc.image.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockExecutor;

    fn adapter_with(mock: MockExecutor) -> EngineAdapter<MockExecutor> {
        EngineAdapter::new(mock)
    }

    #[tokio::test]
    async fn compose_config_parses_services() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml config --format json",
            r#"{"services":{"web":{"image":"nginx:1.25"}}}"#,
        );
        let mut adapter = adapter_with(mock);
        let cfg = adapter
            .compose_config(Path::new("/app/docker-compose.yml"))
            .await
            .unwrap();
        assert_eq!(cfg.services["web"].image.as_deref(), Some("nginx:1.25"));
    }

    #[tokio::test]
    async fn compose_config_required_failure_is_an_error() {
        let mut mock = MockExecutor::new();
        mock.fail(
            "docker compose --project-directory /app -f /app/docker-compose.yml config --format json",
            "boom",
        );
        let mut adapter = adapter_with(mock);
        let err = adapter
            .compose_config(Path::new("/app/docker-compose.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RequiredCallFailed { .. }));
    }

    #[tokio::test]
    async fn inspect_image_absent_returns_empty_id() {
        let mut mock = MockExecutor::new();
        mock.fail("docker image inspect -f {{.Id}} myorg/api:v2", "no such image");
        let mut adapter = adapter_with(mock);
        let id = adapter.inspect_image("myorg/api:v2").await;
        assert!(id.is_empty());
    }

    #[tokio::test]
    async fn inspect_image_present_returns_id() {
        let mut mock = MockExecutor::new();
        mock.ok("docker image inspect -f {{.Id}} myorg/api:v2", "sha256:b2\n");
        let mut adapter = adapter_with(mock);
        let id = adapter.inspect_image("myorg/api:v2").await;
        assert_eq!(id, ImageId("sha256:b2".to_string()));
    }

    #[tokio::test]
    async fn inspect_container_defaults_missing_fields() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker inspect abc123",
            r#"[{"State":{"Status":"running"}}]"#,
        );
        let mut adapter = adapter_with(mock);
        let state = adapter.inspect_container("abc123").await.unwrap();
        assert_eq!(state.runtime_status, "running");
        assert_eq!(state.health_status, None);
        assert_eq!(state.restart_count, 0);
    }

    #[tokio::test]
    async fn inspect_container_reads_health_and_restarts() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker inspect abc123",
            r#"[{"State":{"Status":"running","Health":{"Status":"healthy"},"RestartCount":3}}]"#,
        );
        let mut adapter = adapter_with(mock);
        let state = adapter.inspect_container("abc123").await.unwrap();
        assert_eq!(state.health_status.as_deref(), Some("healthy"));
        assert_eq!(state.restart_count, 3);
    }

    #[tokio::test]
    async fn compose_pull_failure_is_absorbed() {
        let mut mock = MockExecutor::new();
        mock.fail(
            "docker compose --project-directory /app -f /app/docker-compose.yml pull",
            "registry unreachable",
        );
        let mut adapter = adapter_with(mock);
        // Must not panic or error; best-effort calls swallow failures.
        adapter.compose_pull(Path::new("/app/docker-compose.yml")).await;
    }

    #[tokio::test]
    async fn ps_by_ancestor_empty_on_failure() {
        let mut mock = MockExecutor::new();
        mock.fail("docker ps -a --filter ancestor=sha256:aaa -q", "daemon down");
        let mut adapter = adapter_with(mock);
        let ids = adapter.ps_by_ancestor(&ImageId("sha256:aaa".to_string())).await;
        assert!(ids.is_empty());
    }
}
