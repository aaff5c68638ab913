pub mod output_scanner;

pub use output_scanner::{OutputScanner, StagedFile};
