use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file produced by the converter in a staging folder.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size: u64,
}

impl StagedFile {
    pub fn new(path: PathBuf, relative_path: PathBuf, size: u64) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        Self {
            path,
            relative_path,
            filename,
            extension,
            size,
        }
    }

    /// Name of the vehicle this file belongs to, by the parent-directory
    /// convention. `None` when the file sits directly in the scan root.
    pub fn vehicle_name(&self) -> Option<String> {
        if self.relative_path.parent().map_or(true, |p| p.as_os_str().is_empty()) {
            return None;
        }
        self.path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
    }

    pub fn display_path(&self) -> String {
        self.relative_path.display().to_string()
    }
}

/// Walks a staging folder for converter output with a given extension.
///
/// The walk is depth-first with siblings in name order, so results are
/// deterministic document order. A missing folder or one without matches
/// yields an empty list, never an error.
pub struct OutputScanner {
    extension: String,
}

impl OutputScanner {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
        }
    }

    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Vec<StagedFile> {
        let root = root.as_ref();
        let mut outputs = Vec::new();

        if !root.is_dir() {
            return outputs;
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker.into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
            if !matches {
                continue;
            }

            let relative_path = path
                .strip_prefix(root)
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|_| path.to_path_buf());
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            outputs.push(StagedFile::new(path.to_path_buf(), relative_path, size));
        }

        outputs
    }
}
