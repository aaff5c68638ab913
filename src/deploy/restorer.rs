use crate::deploy::copy_preserving_mtime;
use crate::error::{ModStageError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Result of one restore pass.
#[derive(Debug, Default, Clone)]
pub struct RestoreOutcome {
    pub restored: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Overwrite every original under `vehicles_root` with its backup's bytes.
///
/// Backups are never deleted, so a restore can be repeated at will. An
/// original that has gone missing counts as a failure and the pass moves on.
pub fn restore_backups(
    vehicles_root: &Path,
    backup_suffix: &str,
    mut progress: Option<&mut dyn FnMut(usize, &str)>,
) -> Result<RestoreOutcome> {
    if !vehicles_root.is_dir() {
        return Err(ModStageError::VehiclesRootMissing {
            path: vehicles_root.display().to_string(),
        });
    }

    let dotted_suffix = format!(".{}", backup_suffix.trim_start_matches('.'));
    let mut outcome = RestoreOutcome::default();

    let walker = WalkDir::new(vehicles_root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker.into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }

        let backup = entry.path();
        let Some(original) = original_for_backup(backup, &dotted_suffix) else {
            continue;
        };

        if let Some(ref mut callback) = progress {
            callback(outcome.restored, &original.display().to_string());
        }

        if !original.exists() {
            outcome.failed += 1;
            outcome.errors.push(format!(
                "{}: original no longer exists",
                backup.display()
            ));
            continue;
        }

        match copy_preserving_mtime(backup, &original) {
            Ok(_) => outcome.restored += 1,
            Err(e) => {
                outcome.failed += 1;
                outcome
                    .errors
                    .push(format!("{}: {}", backup.display(), e));
            }
        }
    }

    Ok(outcome)
}

fn original_for_backup(backup: &Path, dotted_suffix: &str) -> Option<PathBuf> {
    let name = backup.file_name()?.to_str()?;
    let original_name = name.strip_suffix(dotted_suffix)?;
    if original_name.is_empty() {
        return None;
    }
    Some(backup.with_file_name(original_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_restore_round_trip_keeps_backup() {
        let temp = TempDir::new().unwrap();
        let vehicle_dir = temp.path().join("01_land").join("Falcon");
        fs::create_dir_all(&vehicle_dir).unwrap();
        let original = vehicle_dir.join("Falcon.ee");
        let backup = vehicle_dir.join("Falcon.ee.backup");
        fs::write(&original, b"modified").unwrap();
        fs::write(&backup, b"pristine").unwrap();

        let outcome = restore_backups(temp.path(), "backup", None).unwrap();

        assert_eq!(outcome.restored, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(fs::read(&original).unwrap(), b"pristine");
        // Restore never consumes the backup.
        assert_eq!(fs::read(&backup).unwrap(), b"pristine");

        // Repeatable: a second pass restores the same file again.
        let outcome = restore_backups(temp.path(), "backup", None).unwrap();
        assert_eq!(outcome.restored, 1);
    }

    #[test]
    fn test_missing_original_counts_as_failure_and_continues() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("01_land").join("Alpha");
        let b = temp.path().join("01_land").join("Bravo");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("Alpha.ee.backup"), b"pristine").unwrap();
        fs::write(b.join("Bravo.ee"), b"modified").unwrap();
        fs::write(b.join("Bravo.ee.backup"), b"pristine").unwrap();

        let outcome = restore_backups(temp.path(), "backup", None).unwrap();

        assert_eq!(outcome.restored, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(fs::read(b.join("Bravo.ee")).unwrap(), b"pristine");
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let result = restore_backups(&temp.path().join("nope"), "backup", None);
        assert!(matches!(
            result,
            Err(ModStageError::VehiclesRootMissing { .. })
        ));
    }

    #[test]
    fn test_bare_suffix_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".backup"), b"junk").unwrap();

        let outcome = restore_backups(temp.path(), "backup", None).unwrap();

        assert_eq!(outcome.restored, 0);
        assert_eq!(outcome.failed, 0);
    }
}
