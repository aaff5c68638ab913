use crate::deploy::MatchMode;
use crate::error::{ModStageError, Result};
use crate::staging::{PACKED_FILES_DIR_NAME, TO_EDIT_DIR_NAME, UNPACKED_FILES_DIR_NAME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file looked up in the working directory when no
/// explicit `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "modstage.json";

/// Persisted tool configuration, stored as a flat JSON object.
///
/// Missing keys are backfilled from defaults on load; keys this version does
/// not know about are carried in `extra` and written back on save, never
/// removed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Path to the external converter executable.
    #[serde(default = "defaults::converter_path")]
    pub converter_path: PathBuf,

    /// Root of the mod source tree holding the original vehicle directories.
    #[serde(default = "defaults::vehicles_path")]
    pub vehicles_path: PathBuf,

    /// Staging folder overrides. When absent, the well-known folder names
    /// are resolved relative to the converter's own directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_edit_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packed_files_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpacked_files_path: Option<PathBuf>,

    /// Wall-clock bound on one converter invocation. Expiry is a normal
    /// completion signal, not an error.
    #[serde(default = "defaults::tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "defaults::packed_extension")]
    pub packed_extension: String,

    #[serde(default = "defaults::fragment_extension")]
    pub fragment_extension: String,

    /// Appended (dot-separated) to an original's file name to form its
    /// one-time backup.
    #[serde(default = "defaults::backup_suffix")]
    pub backup_suffix: String,

    /// How produced outputs are matched back to original directories/files.
    #[serde(default)]
    pub match_mode: MatchMode,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

mod defaults {
    use std::path::PathBuf;

    pub fn converter_path() -> PathBuf {
        PathBuf::from("converter").join("EasiEdit.exe")
    }

    pub fn vehicles_path() -> PathBuf {
        PathBuf::from("dropzone")
            .join("editor")
            .join("entities")
            .join("vehicles")
    }

    pub fn tool_timeout_secs() -> u64 {
        30
    }

    pub fn packed_extension() -> String {
        "ee".to_string()
    }

    pub fn fragment_extension() -> String {
        "xml".to_string()
    }

    pub fn backup_suffix() -> String {
        "backup".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            converter_path: defaults::converter_path(),
            vehicles_path: defaults::vehicles_path(),
            to_edit_path: None,
            packed_files_path: None,
            unpacked_files_path: None,
            tool_timeout_secs: defaults::tool_timeout_secs(),
            packed_extension: defaults::packed_extension(),
            fragment_extension: defaults::fragment_extension(),
            backup_suffix: defaults::backup_suffix(),
            match_mode: MatchMode::default(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| ModStageError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config =
            serde_json::from_str(&content).map_err(|e| ModStageError::Config {
                message: format!("Failed to parse config file {}: {}", path.display(), e),
            })?;

        Ok(config)
    }

    /// Load `path`, or persist and return the defaults when it does not
    /// exist yet (first run).
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            return Self::load_from_file(path);
        }

        let mut config = Self::default();
        config.fill_staging_paths();
        config.save_to_file(path)?;
        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_or_init(path),
            None => Self::load_or_init(DEFAULT_CONFIG_FILE),
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ModStageError::Config {
                message: format!("Failed to serialize config: {}", e),
            })?;

        std::fs::write(path, content).map_err(|e| ModStageError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    /// Pin the staging folders to their converter-relative defaults so the
    /// persisted first-run file spells them out.
    pub fn fill_staging_paths(&mut self) {
        let dir = self.converter_dir().to_path_buf();
        self.to_edit_path.get_or_insert_with(|| dir.join(TO_EDIT_DIR_NAME));
        self.packed_files_path
            .get_or_insert_with(|| dir.join(PACKED_FILES_DIR_NAME));
        self.unpacked_files_path
            .get_or_insert_with(|| dir.join(UNPACKED_FILES_DIR_NAME));
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref converter) = cli_args.converter_path {
            self.converter_path = converter.clone();
        }

        if let Some(ref vehicles) = cli_args.vehicles_path {
            self.vehicles_path = vehicles.clone();
        }

        if let Some(timeout) = cli_args.timeout {
            self.tool_timeout_secs = timeout;
        }

        if let Some(match_mode) = cli_args.match_mode {
            self.match_mode = match_mode;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.converter_path.as_os_str().is_empty() {
            return Err(ModStageError::Config {
                message: "Converter path must not be empty".to_string(),
            });
        }

        if self.vehicles_path.as_os_str().is_empty() {
            return Err(ModStageError::Config {
                message: "Vehicles root path must not be empty".to_string(),
            });
        }

        if self.tool_timeout_secs == 0 {
            return Err(ModStageError::Config {
                message: "Converter timeout must be greater than 0".to_string(),
            });
        }

        if self.packed_ext().is_empty() || self.fragment_ext().is_empty() {
            return Err(ModStageError::Config {
                message: "File extensions must not be empty".to_string(),
            });
        }

        if self.backup_suffix.is_empty() {
            return Err(ModStageError::Config {
                message: "Backup suffix must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Directory the converter executable lives in. All staging folders and
    /// input copies are resolved against it.
    pub fn converter_dir(&self) -> &Path {
        match self.converter_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub fn to_edit_dir(&self) -> PathBuf {
        self.to_edit_path
            .clone()
            .unwrap_or_else(|| self.converter_dir().join(TO_EDIT_DIR_NAME))
    }

    pub fn packed_files_dir(&self) -> PathBuf {
        self.packed_files_path
            .clone()
            .unwrap_or_else(|| self.converter_dir().join(PACKED_FILES_DIR_NAME))
    }

    pub fn unpacked_files_dir(&self) -> PathBuf {
        self.unpacked_files_path
            .clone()
            .unwrap_or_else(|| self.converter_dir().join(UNPACKED_FILES_DIR_NAME))
    }

    /// Extensions are stored with or without a leading dot; comparisons
    /// always use the bare form.
    pub fn packed_ext(&self) -> &str {
        self.packed_extension.trim_start_matches('.')
    }

    pub fn fragment_ext(&self) -> &str {
        self.fragment_extension.trim_start_matches('.')
    }

    pub fn create_sample_config() -> String {
        let mut sample = Self::default();
        sample.fill_staging_paths();
        serde_json::to_string_pretty(&sample).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub converter_path: Option<PathBuf>,
    pub vehicles_path: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub match_mode: Option<MatchMode>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_converter_path(mut self, converter_path: Option<PathBuf>) -> Self {
        self.converter_path = converter_path;
        self
    }

    pub fn with_vehicles_path(mut self, vehicles_path: Option<PathBuf>) -> Self {
        self.vehicles_path = vehicles_path;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_match_mode(mut self, match_mode: Option<MatchMode>) -> Self {
        self.match_mode = match_mode;
        self
    }
}
