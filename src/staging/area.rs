use crate::config::Config;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// The three working folders the converter operates on.
///
/// They are cleared and recreated before every conversion and left populated
/// with output until the next clear. Only one operation may use them at a
/// time; the invocation gate in [`crate::invoker`] enforces that.
#[derive(Debug, Clone)]
pub struct StagingArea {
    converter_dir: PathBuf,
    to_edit: PathBuf,
    packed_files: PathBuf,
    unpacked_files: PathBuf,
}

impl StagingArea {
    pub fn from_config(config: &Config) -> Self {
        Self {
            converter_dir: config.converter_dir().to_path_buf(),
            to_edit: config.to_edit_dir(),
            packed_files: config.packed_files_dir(),
            unpacked_files: config.unpacked_files_dir(),
        }
    }

    pub fn converter_dir(&self) -> &Path {
        &self.converter_dir
    }

    pub fn to_edit(&self) -> &Path {
        &self.to_edit
    }

    pub fn packed_files(&self) -> &Path {
        &self.packed_files
    }

    pub fn unpacked_files(&self) -> &Path {
        &self.unpacked_files
    }

    /// Create all three folders if they are missing.
    pub fn ensure_exists(&self) -> Result<()> {
        for dir in [&self.to_edit, &self.packed_files, &self.unpacked_files] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Clear the folders a packed->fragment conversion writes into.
    /// Returns per-item warnings; the operation proceeds best-effort.
    pub fn prepare_unpack(&self) -> Vec<String> {
        let mut warnings = clear_directory(&self.to_edit);
        warnings.extend(clear_directory(&self.unpacked_files));
        warnings
    }

    /// Clear the folder a fragment->packed conversion writes into.
    pub fn prepare_repack(&self) -> Vec<String> {
        clear_directory(&self.packed_files)
    }

    /// Direct subdirectories of `To Edit` containing at least one fragment
    /// file, sorted by name.
    pub fn fragment_vehicle_dirs(&self, fragment_extension: &str) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let entries = match fs::read_dir(&self.to_edit) {
            Ok(entries) => entries,
            Err(_) => return dirs,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if dir_has_extension(&path, fragment_extension) {
                dirs.push(path);
            }
        }

        dirs.sort();
        dirs
    }
}

fn dir_has_extension(dir: &Path, extension: &str) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
    })
}

/// Remove every file and subdirectory under `dir`, creating `dir` if absent.
///
/// Never fails as a whole: a missing directory is created, and per-item
/// removal failures are returned as warnings so a single locked file does
/// not abort the clear.
pub fn clear_directory(dir: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            if let Err(e) = fs::create_dir_all(dir) {
                warnings.push(format!("Failed to create {}: {}", dir.display(), e));
            }
            return warnings;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(format!("Failed to read entry in {}: {}", dir.display(), e));
                continue;
            }
        };

        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        if let Err(e) = removed {
            warnings.push(format!("Failed to remove {}: {}", path.display(), e));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clear_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("fresh");

        let warnings = clear_directory(&dir);

        assert!(warnings.is_empty());
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_removes_files_and_nested_directories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("stage");
        fs::create_dir_all(dir.join("vehicle/modules")).unwrap();
        fs::write(dir.join("stale.xml"), "old").unwrap();
        fs::write(dir.join("vehicle/modules/part.xml"), "old").unwrap();

        let warnings = clear_directory(&dir);

        assert!(warnings.is_empty());
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("stage");
        fs::write(temp.path().join("untouched.txt"), "keep").unwrap();

        for _ in 0..3 {
            let warnings = clear_directory(&dir);
            assert!(warnings.is_empty());
            assert!(dir.is_dir());
            assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        }

        // Siblings outside the cleared directory are untouched.
        assert!(temp.path().join("untouched.txt").exists());
    }

    #[test]
    fn test_staging_area_layout_follows_converter_dir() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.converter_path = temp.path().join("converter").join("easiedit.exe");

        let area = StagingArea::from_config(&config);

        assert_eq!(area.converter_dir(), temp.path().join("converter"));
        assert_eq!(
            area.to_edit(),
            temp.path().join("converter").join(super::super::TO_EDIT_DIR_NAME)
        );
        assert_eq!(
            area.packed_files(),
            temp.path()
                .join("converter")
                .join(super::super::PACKED_FILES_DIR_NAME)
        );

        area.ensure_exists().unwrap();
        assert!(area.to_edit().is_dir());
        assert!(area.packed_files().is_dir());
        assert!(area.unpacked_files().is_dir());
    }

    #[test]
    fn test_fragment_vehicle_dirs_only_lists_dirs_with_fragments() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.converter_path = temp.path().join("tool.exe");
        let area = StagingArea::from_config(&config);
        area.ensure_exists().unwrap();

        let falcon = area.to_edit().join("Falcon");
        let empty = area.to_edit().join("Empty");
        fs::create_dir_all(&falcon).unwrap();
        fs::create_dir_all(&empty).unwrap();
        fs::write(falcon.join("Falcon_vehicle_misc_esi.xml"), "<esi_edit/>").unwrap();
        fs::write(area.to_edit().join("loose.xml"), "<esi_edit/>").unwrap();

        let dirs = area.fragment_vehicle_dirs("xml");

        assert_eq!(dirs, vec![falcon]);
    }
}
