//! Diff & Backup Manager: resolves before/after image ids around a pull,
//! decides the changed set, and tags backups for it.

use std::collections::HashMap;

use crate::engine::{BackupTag, EngineAdapter, EngineResult, ImageId, Service};
use crate::executor::CommandExecutor;
use std::path::Path;

pub struct DiffResult {
    pub before_ids: HashMap<String, ImageId>,
    pub after_ids: HashMap<String, ImageId>,
    pub changed_services: Vec<String>,
    pub backup_tags: HashMap<String, BackupTag>,
    pub skipped_no_id: Vec<String>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.changed_services.is_empty()
    }

    /// Message for a Report when nothing changed, noting any services whose
    /// image id could not be resolved either before or after the pull.
    pub fn no_change_message(&self) -> String {
        if self.skipped_no_id.is_empty() {
            "no image updates detected".to_string()
        } else {
            format!(
                "no image updates detected (unresolved image id for: {})",
                self.skipped_no_id.join(", ")
            )
        }
    }
}

/// Run the before/pull/after/diff/backup-tag algorithm for one stack's
/// planned services.
pub async fn diff_and_backup<T: CommandExecutor>(
    engine: &mut EngineAdapter<T>,
    file: &Path,
    services: &[Service],
    run_timestamp: &str,
) -> EngineResult<DiffResult> {
    let mut before_ids = HashMap::new();
    for svc in services {
        let id = engine.inspect_image(&svc.image).await;
        before_ids.insert(svc.name.clone(), id);
    }

    engine.compose_pull(file).await;

    let mut after_ids = HashMap::new();
    for svc in services {
        let id = engine.inspect_image(&svc.image).await;
        after_ids.insert(svc.name.clone(), id);
    }

    let mut changed_services = Vec::new();
    let mut skipped_no_id = Vec::new();

    for svc in services {
        let before = &before_ids[&svc.name];
        let after = &after_ids[&svc.name];
        if before.is_empty() || after.is_empty() {
            skipped_no_id.push(svc.name.clone());
            continue;
        }
        if before != after {
            changed_services.push(svc.name.clone());
        }
    }

    let mut backup_tags = HashMap::new();
    for svc in services {
        if !changed_services.contains(&svc.name) {
            continue;
        }
        let tag = BackupTag::new(&svc.image, run_timestamp);
        let before_id = &before_ids[&svc.name];
        engine.tag_image(before_id, &tag.to_string()).await;
        backup_tags.insert(svc.name.clone(), tag);
    }

    Ok(DiffResult {
        before_ids,
        after_ids,
        changed_services,
        backup_tags,
        skipped_no_id,
    })
}
