pub mod deployer;
pub mod restorer;

pub use deployer::{deployable_vehicles, DeployOutcome, DeployedSet, Deployer, MatchMode};
pub use restorer::{restore_backups, RestoreOutcome};

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::Path;

/// Byte copy that carries the source's modification time over to the
/// destination.
pub(crate) fn copy_preserving_mtime(source: &Path, dest: &Path) -> io::Result<u64> {
    let bytes = fs::copy(source, dest)?;

    if let Ok(metadata) = fs::metadata(source) {
        if let Ok(modified) = metadata.modified() {
            let _ = filetime::set_file_mtime(dest, FileTime::from_system_time(modified));
        }
    }

    Ok(bytes)
}
