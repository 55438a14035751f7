//! Run Orchestrator: discovers compose files under a root, invokes the
//! per-stack pipeline for each sequentially, and classifies the overall run
//! for the summary notification.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::engine::EngineAdapter;
use crate::executor::CommandExecutor;
use crate::pipeline::{run_stack, PipelineConfig};
use crate::report::{Report, Status};

const RECOGNISED_FILENAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Find the first recognised compose filename directly inside `dir`.
fn first_compose_file(dir: &Path) -> Option<PathBuf> {
    RECOGNISED_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Root itself, then each immediate subdirectory in lexicographic order,
/// each contributing at most one compose file (first recognised name wins).
pub fn discover_compose_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    if let Some(path) = first_compose_file(root) {
        found.push(path);
        return Ok(found);
    }

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    for dir in subdirs {
        if let Some(path) = first_compose_file(&dir) {
            found.push(path);
        }
    }

    Ok(found)
}

pub struct RunResult {
    pub reports: Vec<Report>,
    pub overall: Status,
}

impl RunResult {
    fn classify(reports: &[Report]) -> Status {
        if reports.iter().any(|r| r.status == Status::Failed) {
            Status::Failed
        } else if reports.iter().any(|r| r.status == Status::Rollback) {
            Status::Rollback
        } else if reports.iter().any(|r| r.status == Status::Success) {
            Status::Success
        } else {
            Status::Skipped
        }
    }
}

/// Run one full sweep: discover, run each stack sequentially, classify.
/// A missing root yields a single SKIPPED report naming the root.
pub async fn run_once<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    root: &Path,
    run_timestamp: &str,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> RunResult {
    if !root.exists() {
        let report = Report::skipped(root, run_timestamp, &format!("compose root not found: {}", root.display()));
        return RunResult {
            overall: report.status,
            reports: vec![report],
        };
    }

    let files = match discover_compose_files(root) {
        Ok(files) => files,
        Err(e) => {
            let report = Report::skipped(root, run_timestamp, &format!("failed to scan compose root: {e}"));
            return RunResult {
                overall: report.status,
                reports: vec![report],
            };
        }
    };

    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        tracing::info!("run: starting stack {}", file.display());
        let report = run_stack(engine, &file, run_timestamp, config, cancel).await;
        tracing::info!("run: stack {} finished with status {:?}", file.display(), report.status);
        reports.push(report);
    }

    let overall = RunResult::classify(&reports);
    RunResult { reports, overall }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_root_level_file_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("docker-compose.yml"), "services: {}").unwrap();
        fs::create_dir(dir.path().join("app")).unwrap();
        fs::write(dir.path().join("app").join("compose.yaml"), "services: {}").unwrap();

        let found = discover_compose_files(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("docker-compose.yml")]);
    }

    #[test]
    fn discovers_subdirectories_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            let sub = dir.path().join(name);
            fs::create_dir(&sub).unwrap();
            fs::write(sub.join("docker-compose.yml"), "services: {}").unwrap();
        }

        let found = discover_compose_files(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.parent().unwrap().file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn subdirectory_with_no_compose_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::create_dir(dir.path().join("app")).unwrap();
        fs::write(dir.path().join("app").join("compose.yml"), "services: {}").unwrap();

        let found = discover_compose_files(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("app").join("compose.yml")]);
    }

    #[test]
    fn classify_prefers_failed_over_everything() {
        let mut reports = Vec::new();
        reports.push(Report::skipped(Path::new("a"), "t", "skip"));
        reports.push(Report::failed(Path::new("b"), "t", "boom"));
        assert_eq!(RunResult::classify(&reports), Status::Failed);
    }

    #[test]
    fn classify_is_skipped_when_all_skipped() {
        let reports = vec![Report::skipped(Path::new("a"), "t", "skip")];
        assert_eq!(RunResult::classify(&reports), Status::Skipped);
    }
}
