//! The Stack Planner: turns a parsed compose config into the ordered
//! service map the rest of the pipeline works from, or a skip decision.

use std::collections::HashSet;
use std::path::Path;

use crate::engine::{image_refs, ComposeConfig, EngineAdapter, EngineResult, Service};
use crate::executor::CommandExecutor;

/// Outcome of planning one stack.
pub enum PlanOutcome {
    /// At least one non-ignored service has an image; proceed with the run.
    /// Order matches the compose config's own service order.
    Plan {
        services: Vec<Service>,
        ignored_services: Vec<String>,
    },
    /// Nothing to do; carries the reason for the Report's message field.
    Skip { reason: String },
}

/// Plan one compose file: fetch its config, exclude ignored services, check
/// that the stack has running containers and at least one image-bearing
/// service, in that order.
pub async fn plan<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    file: &Path,
    ignore: &HashSet<String>,
) -> EngineResult<PlanOutcome> {
    let running = engine.compose_ps_running(file).await;
    if running.is_empty() {
        return Ok(PlanOutcome::Skip {
            reason: "no running containers for stack".to_string(),
        });
    }

    let config = engine.compose_config(file).await?;
    let (services, ignored_services) = ordered_services(&config, ignore);

    if services.is_empty() {
        return Ok(PlanOutcome::Skip {
            reason: "no service has an image field after ignore filter".to_string(),
        });
    }

    Ok(PlanOutcome::Plan {
        services,
        ignored_services,
    })
}

/// Extract `{name -> image}` pairs from the compose config, preserving the
/// order `docker compose config --format json` declared them in.
fn ordered_services(
    config: &ComposeConfig,
    ignore: &HashSet<String>,
) -> (Vec<Service>, Vec<String>) {
    let mut services = Vec::new();
    let mut ignored_services = Vec::new();

    for (name, image) in image_refs(config) {
        if ignore.contains(&name) {
            ignored_services.push(name);
            continue;
        }
        if let Some(image) = image {
            services.push(Service { name, image });
        }
    }

    (services, ignored_services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockExecutor;

    fn config_json(services: &str) -> String {
        format!(r#"{{"services":{services}}}"#)
    }

    #[tokio::test]
    async fn skips_when_no_running_containers() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q --status running",
            "",
        );
        let mut engine = EngineAdapter::new(mock);
        let outcome = plan(&mut engine, Path::new("/app/docker-compose.yml"), &HashSet::new())
            .await
            .unwrap();
        assert!(matches!(outcome, PlanOutcome::Skip { .. }));
    }

    #[tokio::test]
    async fn skips_when_no_service_has_image_after_ignore() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q --status running",
            "c1\n",
        );
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml config --format json",
            config_json(r#"{"web":{"image":"nginx:1.25"},"init":{}}"#),
        );
        let mut ignore = HashSet::new();
        ignore.insert("web".to_string());
        let mut engine = EngineAdapter::new(mock);
        let outcome = plan(&mut engine, Path::new("/app/docker-compose.yml"), &ignore)
            .await
            .unwrap();
        assert!(matches!(outcome, PlanOutcome::Skip { .. }));
    }

    #[tokio::test]
    async fn plans_non_ignored_image_bearing_services_in_config_order() {
        let mut mock = MockExecutor::new();
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml ps -q --status running",
            "c1\n",
        );
        mock.ok(
            "docker compose --project-directory /app -f /app/docker-compose.yml config --format json",
            config_json(r#"{"web":{"image":"nginx:1.25"},"api":{"image":"myorg/api:v2"},"sidecar":{}}"#),
        );
        let mut engine = EngineAdapter::new(mock);
        let outcome = plan(&mut engine, Path::new("/app/docker-compose.yml"), &HashSet::new())
            .await
            .unwrap();
        match outcome {
            PlanOutcome::Plan {
                services,
                ignored_services,
            } => {
                assert_eq!(services.len(), 2);
                assert!(ignored_services.is_empty());
                assert_eq!(services[0].name, "web");
                assert_eq!(services[1].name, "api");
            }
            _ => panic!("expected a plan"),
        }
    }
}
