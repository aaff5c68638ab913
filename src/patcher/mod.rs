pub mod esi_patcher;

pub use esi_patcher::{
    patch_file, patch_fragment, patch_staged, PatchSummary, PatchedFragment,
    FRAGMENT_OF_INTEREST,
};
