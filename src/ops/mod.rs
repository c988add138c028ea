//! high-level operations on archives and the resources inside them

mod fsck;
mod rewrite;
mod stats;

pub use fsck::{fsck, CorruptEntry, FsckReport};
pub use rewrite::{rewrite_entry, RewriteStats};
pub use stats::{stats, ArchiveStats, EntryStats, ResourceStats};
