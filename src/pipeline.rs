//! Per-stack Update/Rollback state machine: drives a single compose file
//! from plan through pull/diff, update, verification, and — on
//! verification failure — rollback, producing a sealed `Report`.

use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::diffbackup::{diff_and_backup, DiffResult};
use crate::engine::{EngineAdapter, EngineError, Service};
use crate::executor::CommandExecutor;
use crate::planner::{plan, PlanOutcome};
use crate::report::{Report, Status};
use crate::verifier::{verify, VerifierConfig};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct PipelineConfig {
    pub ignore_services: std::collections::HashSet<String>,
    pub verifier: VerifierConfig,
}

/// Run the full per-stack pipeline, from planning through to a sealed
/// Report. Never returns `Err` for operational failures — those are caught
/// and folded into `Report::failed`; `Err` here can only come from a bug in
/// the pipeline itself propagating past the catch points below, which
/// should not happen in practice.
pub async fn run_stack<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    file: &Path,
    run_timestamp: &str,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Report {
    match run_stack_inner(engine, file, run_timestamp, config, cancel).await {
        Ok(report) => report,
        Err(e) => Report::failed(file, run_timestamp, &format!("exception: {}: {e}", error_kind(&e))),
    }
}

fn error_kind(e: &PipelineError) -> &'static str {
    match e {
        PipelineError::Engine(EngineError::RequiredCallFailed { .. }) => "RequiredCallFailed",
        PipelineError::Engine(EngineError::ParseFailed { .. }) => "ParseFailed",
        PipelineError::Engine(EngineError::Execution(_)) => "ExecutorError",
        PipelineError::Engine(EngineError::Output(_)) => "OutputError",
    }
}

async fn run_stack_inner<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    file: &Path,
    run_timestamp: &str,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<Report, PipelineError> {
    let outcome = plan(engine, file, &config.ignore_services).await?;

    let (services, ignored_services) = match outcome {
        PlanOutcome::Skip { reason } => {
            tracing::info!("stack {}: skipped: {reason}", file.display());
            return Ok(Report::skipped(file, run_timestamp, &reason));
        }
        PlanOutcome::Plan {
            services,
            ignored_services,
        } => (services, ignored_services),
    };

    tracing::info!(
        "stack {}: planned {} service(s)",
        file.display(),
        services.len()
    );

    let diff = diff_and_backup(engine, file, &services, run_timestamp).await?;

    let mut report = Report::pending(file, run_timestamp, &services, &ignored_services, &diff);

    if !diff.has_changes() {
        tracing::info!("stack {}: {}", file.display(), diff.no_change_message());
        report.seal(Status::Skipped, diff.no_change_message());
        return Ok(report);
    }

    let changed: Vec<Service> = services
        .iter()
        .filter(|s| diff.changed_services.contains(&s.name))
        .cloned()
        .collect();
    let changed_names: Vec<String> = changed.iter().map(|s| s.name.clone()).collect();

    tracing::info!(
        "stack {}: updating changed service(s): {}",
        file.display(),
        changed_names.join(", ")
    );
    engine.compose_up(file, &changed_names).await;

    tracing::info!("stack {}: verifying", file.display());
    let verify_outcome = verify(engine, file, &changed, &config.verifier, cancel).await?;

    if verify_outcome.ok {
        tracing::info!("stack {}: verify ok", file.display());
        cleanup_on_success(engine, &diff).await;
        report.seal_verified(Status::Success, verify_outcome.message, None, None);
        return Ok(report);
    }

    tracing::info!(
        "stack {}: verify failed ({}), rolling back",
        file.display(),
        verify_outcome.message
    );

    rollback(engine, file, &changed, &diff).await;

    tracing::info!("stack {}: re-verifying after rollback", file.display());
    let rollback_verify = verify(engine, file, &changed, &config.verifier, cancel).await?;

    let status = if rollback_verify.ok {
        tracing::info!("stack {}: rollback verified", file.display());
        Status::Rollback
    } else {
        tracing::warn!(
            "stack {}: rollback verify also failed ({})",
            file.display(),
            rollback_verify.message
        );
        Status::Failed
    };

    report.seal_verified(
        status,
        verify_outcome.message,
        Some(rollback_verify.ok),
        Some(rollback_verify.message),
    );
    Ok(report)
}

/// Retag each changed service's backup image back over its original
/// reference and re-recreate the changed set.
async fn rollback<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    file: &Path,
    changed: &[Service],
    diff: &DiffResult,
) {
    for svc in changed {
        let Some(tag) = diff.backup_tags.get(&svc.name) else {
            tracing::warn!("stack {}: no backup tag for {}, cannot rollback it", file.display(), svc.name);
            continue;
        };
        let backup_id = engine.inspect_image(&tag.to_string()).await;
        if backup_id.is_empty() {
            tracing::warn!(
                "stack {}: backup tag {} no longer resolves to an image",
                file.display(),
                tag
            );
            continue;
        }
        engine.tag_image(&backup_id, &svc.image).await;
    }

    let names: Vec<String> = changed.iter().map(|s| s.name.clone()).collect();
    engine.compose_up(file, &names).await;
}

/// Best-effort cleanup after a successful update: drop the backup tags and
/// any before-image that no container still references. Never changes the
/// report's status.
async fn cleanup_on_success<T: CommandExecutor>(engine: &mut EngineAdapter<T>, diff: &DiffResult) {
    for tag in diff.backup_tags.values() {
        engine.remove_image(&tag.to_string()).await;
    }

    for (svc, before_id) in &diff.before_ids {
        if before_id.is_empty() || !diff.changed_services.contains(svc) {
            continue;
        }
        let in_use = engine.ps_by_ancestor(before_id).await;
        if in_use.is_empty() {
            engine.remove_image(&before_id.to_string()).await;
        }
    }
}
