pub mod area;

pub use area::{clear_directory, StagingArea};

/// Well-known folder names the converter reads from and writes to,
/// fixed relative to its own directory. Case-sensitive.
pub const TO_EDIT_DIR_NAME: &str = "To Edit";
pub const PACKED_FILES_DIR_NAME: &str = "Packed Files";
pub const UNPACKED_FILES_DIR_NAME: &str = "Unpacked Files";
