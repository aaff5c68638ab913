use crate::config::Config;
use crate::deploy::copy_preserving_mtime;
use crate::error::{ModStageError, Result};
use crate::scanner::StagedFile;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// How a produced output's vehicle name is matched against original
/// directory and file names.
///
/// `Substring` (match in either direction, first hit wins) reproduces the
/// historically observed behavior and its known ambiguity between
/// similarly-named vehicles; `Prefix` and `Exact` tighten it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Substring,
    Prefix,
    Exact,
}

impl MatchMode {
    pub fn matches(&self, candidate: &str, vehicle: &str) -> bool {
        match self {
            MatchMode::Substring => candidate.contains(vehicle) || vehicle.contains(candidate),
            MatchMode::Prefix => {
                candidate.starts_with(vehicle) || vehicle.starts_with(candidate)
            }
            MatchMode::Exact => candidate == vehicle,
        }
    }
}

/// Vehicles copied back over their originals during this process's lifetime.
///
/// Deliberately not persisted; it exists so callers can highlight or report
/// what the session touched, and it empties on restart, explicit clear, or a
/// full restore.
#[derive(Debug, Default, Clone)]
pub struct DeployedSet {
    names: BTreeSet<String>,
}

impl DeployedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<S: Into<String>>(&mut self, name: S) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| n.as_str())
    }
}

/// Result of one deployment batch.
#[derive(Debug, Default, Clone)]
pub struct DeployOutcome {
    /// Vehicles deployed by this batch, in processing order.
    pub deployed: Vec<String>,
    /// Per-vehicle failures that were skipped; they never abort the batch.
    pub errors: Vec<String>,
}

/// Copies produced packed files over their originals in the mod source
/// tree, taking a one-time backup of each original first.
pub struct Deployer {
    packed_extension: String,
    backup_suffix: String,
    match_mode: MatchMode,
}

impl Deployer {
    pub fn new(config: &Config) -> Self {
        Self {
            packed_extension: config.packed_ext().to_lowercase(),
            backup_suffix: config.backup_suffix.clone(),
            match_mode: config.match_mode,
        }
    }

    /// Deploy each staged output. A vehicle that cannot be matched or
    /// copied is logged into the outcome and skipped; a missing
    /// `vehicles_root` is a configuration error and aborts up front.
    pub fn deploy(
        &self,
        staged: &[StagedFile],
        vehicles_root: &Path,
        session: &mut DeployedSet,
        mut progress: Option<&mut dyn FnMut(usize, usize, &str)>,
    ) -> Result<DeployOutcome> {
        if !vehicles_root.is_dir() {
            return Err(ModStageError::VehiclesRootMissing {
                path: vehicles_root.display().to_string(),
            });
        }

        let mut outcome = DeployOutcome::default();
        let total = staged.len();

        for (index, output) in staged.iter().enumerate() {
            if let Some(ref mut callback) = progress {
                callback(index, total, &output.filename);
            }

            let Some(vehicle) = output.vehicle_name() else {
                outcome.errors.push(format!(
                    "{}: no vehicle directory above the output",
                    output.display_path()
                ));
                continue;
            };

            match self.deploy_one(&vehicle, output, vehicles_root) {
                Ok(()) => {
                    session.record(vehicle.clone());
                    outcome.deployed.push(vehicle);
                }
                Err(e) => {
                    outcome.errors.push(format!("{}: {}", vehicle, e));
                }
            }
        }

        Ok(outcome)
    }

    fn deploy_one(&self, vehicle: &str, output: &StagedFile, root: &Path) -> Result<()> {
        let vehicle_dir =
            self.find_vehicle_dir(root, vehicle)
                .ok_or_else(|| ModStageError::NoMatch {
                    vehicle: vehicle.to_string(),
                })?;

        let original = self
            .find_packed_file(&vehicle_dir, vehicle)
            .ok_or_else(|| ModStageError::NoMatch {
                vehicle: vehicle.to_string(),
            })?;

        // Only the first deployment writes the backup; later ones must not
        // refresh it, so it always holds the pristine bytes.
        let backup = self.backup_path(&original);
        if !backup.exists() {
            copy_preserving_mtime(&original, &backup)?;
        }

        copy_preserving_mtime(&output.path, &original)?;
        Ok(())
    }

    /// Search one level of category directories, then one level of vehicle
    /// directories, for a name match. First match in name order wins.
    fn find_vehicle_dir(&self, root: &Path, vehicle: &str) -> Option<PathBuf> {
        for category in sorted_subdirs(root) {
            for candidate in sorted_subdirs(&category) {
                let Some(name) = candidate.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if self.match_mode.matches(name, vehicle) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn find_packed_file(&self, dir: &Path, vehicle: &str) -> Option<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        files.into_iter().find(|path| {
            let has_extension = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.packed_extension));
            let stem_matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| self.match_mode.matches(stem, vehicle));
            has_extension && stem_matches
        })
    }

    fn backup_path(&self, original: &Path) -> PathBuf {
        let mut name = original.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.backup_suffix);
        PathBuf::from(name)
    }
}

/// Distinct vehicle names among staged outputs, first-seen order.
pub fn deployable_vehicles(staged: &[StagedFile]) -> Vec<String> {
    let mut vehicles = Vec::new();
    for output in staged {
        if let Some(name) = output.vehicle_name() {
            if !vehicles.contains(&name) {
                vehicles.push(name);
            }
        }
    }
    vehicles
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    subdirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::OutputScanner;
    use tempfile::TempDir;

    fn stage_output(staging: &Path, vehicle: &str, bytes: &[u8]) -> Vec<StagedFile> {
        let dir = staging.join(vehicle);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.ee", vehicle)), bytes).unwrap();
        OutputScanner::new("ee").scan(staging)
    }

    fn make_original(root: &Path, category: &str, dir: &str, file: &str, bytes: &[u8]) -> PathBuf {
        let vehicle_dir = root.join(category).join(dir);
        fs::create_dir_all(&vehicle_dir).unwrap();
        let original = vehicle_dir.join(file);
        fs::write(&original, bytes).unwrap();
        original
    }

    #[test]
    fn test_deploy_matches_backs_up_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("Packed Files");
        let root = temp.path().join("vehicles");
        let original = make_original(&root, "01_land", "Falcon_amphibious", "Falcon.ee", b"pristine");
        let staged = stage_output(&staging, "Falcon", b"modified");

        let deployer = Deployer::new(&Config::default());
        let mut session = DeployedSet::new();
        let outcome = deployer.deploy(&staged, &root, &mut session, None).unwrap();

        assert_eq!(outcome.deployed, vec!["Falcon".to_string()]);
        assert!(outcome.errors.is_empty());
        assert!(session.contains("Falcon"));
        assert_eq!(fs::read(&original).unwrap(), b"modified");

        let backup = original.with_file_name("Falcon.ee.backup");
        assert_eq!(fs::read(&backup).unwrap(), b"pristine");
    }

    #[test]
    fn test_second_deploy_does_not_refresh_backup() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("Packed Files");
        let root = temp.path().join("vehicles");
        let original = make_original(&root, "01_land", "Falcon", "Falcon.ee", b"pristine");

        let deployer = Deployer::new(&Config::default());
        let mut session = DeployedSet::new();

        let staged = stage_output(&staging, "Falcon", b"first");
        deployer.deploy(&staged, &root, &mut session, None).unwrap();
        let staged = stage_output(&staging, "Falcon", b"second");
        deployer.deploy(&staged, &root, &mut session, None).unwrap();

        assert_eq!(fs::read(&original).unwrap(), b"second");
        let backup = original.with_file_name("Falcon.ee.backup");
        assert_eq!(fs::read(&backup).unwrap(), b"pristine");
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_unmatched_vehicle_is_skipped_not_fatal() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("Packed Files");
        let root = temp.path().join("vehicles");
        make_original(&root, "01_land", "Falcon", "Falcon.ee", b"pristine");

        stage_output(&staging, "Falcon", b"modified");
        let staged = stage_output(&staging, "Ghost", b"unmatched");

        let deployer = Deployer::new(&Config::default());
        let mut session = DeployedSet::new();
        let outcome = deployer.deploy(&staged, &root, &mut session, None).unwrap();

        assert!(outcome.deployed.contains(&"Falcon".to_string()));
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("Ghost"));
    }

    #[test]
    fn test_missing_vehicles_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let deployer = Deployer::new(&Config::default());
        let mut session = DeployedSet::new();

        let result = deployer.deploy(&[], &temp.path().join("nope"), &mut session, None);

        assert!(matches!(
            result,
            Err(ModStageError::VehiclesRootMissing { .. })
        ));
    }

    #[test]
    fn test_match_modes() {
        assert!(MatchMode::Substring.matches("Falcon_amphibious", "Falcon"));
        assert!(MatchMode::Substring.matches("Falcon", "Falcon_amphibious"));
        assert!(MatchMode::Prefix.matches("Falcon_amphibious", "Falcon"));
        assert!(!MatchMode::Prefix.matches("amphibious_Falcon", "Falcon"));
        assert!(MatchMode::Exact.matches("Falcon", "Falcon"));
        assert!(!MatchMode::Exact.matches("Falcon_amphibious", "Falcon"));
    }

    #[test]
    fn test_exact_mode_rejects_loose_directory_match() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("Packed Files");
        let root = temp.path().join("vehicles");
        make_original(&root, "01_land", "Falcon_amphibious", "Falcon.ee", b"pristine");
        let staged = stage_output(&staging, "Falcon", b"modified");

        let mut config = Config::default();
        config.match_mode = MatchMode::Exact;
        let deployer = Deployer::new(&config);
        let mut session = DeployedSet::new();
        let outcome = deployer.deploy(&staged, &root, &mut session, None).unwrap();

        assert!(outcome.deployed.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_deployable_vehicles_dedups_in_first_seen_order() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path();
        for vehicle in ["Bravo", "Alpha"] {
            let dir = staging.join(vehicle);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{}.ee", vehicle)), b"x").unwrap();
            fs::write(dir.join(format!("{}_extra.ee", vehicle)), b"x").unwrap();
        }

        let staged = OutputScanner::new("ee").scan(staging);
        let vehicles = deployable_vehicles(&staged);

        // Scanner order is name-sorted, so Alpha is seen first.
        assert_eq!(vehicles, vec!["Alpha".to_string(), "Bravo".to_string()]);
    }
}
