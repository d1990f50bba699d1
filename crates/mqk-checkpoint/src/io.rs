use std::fs;
use std::path::Path;

use crate::types::{CheckpointError, CheckpointSnapshot};

/// Writes `snapshot` to `path` atomically: serialize to a sibling `.tmp`
/// file, demote the existing primary (if any) to `.backup`, then rename
/// `.tmp` onto the primary path. Mirrors the idempotency tracker's
/// write idiom so a crash mid-write never leaves a corrupt primary file.
pub fn save_atomic(path: &Path, snapshot: &CheckpointSnapshot) -> Result<(), CheckpointError> {
    let tmp_path = path.with_extension("tmp");
    let backup_path = path.with_extension("backup");

    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(&tmp_path, json)?;

    if path.exists() {
        fs::rename(path, &backup_path)?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Loads a checkpoint from `path`, falling back to the `.backup` sibling if
/// the primary is missing or fails to parse (e.g. truncated by a crash
/// between the two renames in `save_atomic`).
pub fn load_with_backup(path: &Path) -> Result<Option<CheckpointSnapshot>, CheckpointError> {
    if let Some(snapshot) = try_load(path)? {
        return Ok(Some(snapshot));
    }
    let backup_path = path.with_extension("backup");
    try_load(&backup_path)
}

fn try_load(path: &Path) -> Result<Option<CheckpointSnapshot>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    match serde_json::from_str(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(_) => Ok(None),
    }
}
