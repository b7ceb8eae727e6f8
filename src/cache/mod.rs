//! Cache Inspector and Purger (spec.md §4.1, §4.5).

pub mod inspector;
pub mod purger;

pub use inspector::find_missing;
pub use purger::{purge, PurgeStats};
