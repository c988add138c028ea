//! pfsgraph - in-place editor for PFS archives and WLD fragment graphs
//!
//! a PFS archive is a flat set of named, DEFLATE-compressed entries. some of
//! those entries are WLD resources: an obfuscated string pool plus a list of
//! typed fragments that reference each other by position or by name. this
//! crate opens an archive, rebuilds one resource's fragment graph under a
//! caller-supplied traversal (reorder, drop, duplicate, add) while keeping
//! every reference valid, and saves the archive back.
//!
//! # Core concepts
//!
//! - **Archive**: in-memory view of a PFS file, entries decompressed on demand
//! - **Wld**: a parsed resource, indexed by position and by name
//! - **Fragment**: one typed record; its layout says where references live
//! - **Rebuilder**: a session that emits fragments into a new numbering
//! - **Traversal**: the policy choosing what to emit and in which order
//!
//! # Reference format
//!
//! `0` is null, `n > 0` is the 1-based position of a fragment, `n < 0` is
//! `-offset` into the string pool.
//!
//! # Example usage
//!
//! ```no_run
//! use pfsgraph::{ops, Archive, Identity};
//! use std::path::Path;
//!
//! let mut archive = Archive::open(Path::new("/path/to/zone.s3d")).unwrap();
//!
//! // rebuild one resource and write the archive back
//! ops::rewrite_entry(&mut archive, "zone.wld", &mut Identity).unwrap();
//! archive.save().unwrap();
//! ```

mod config;
mod error;
mod hash;

pub mod archive;
pub mod ops;
pub mod wld;

pub use archive::{Archive, EntryInfo};
pub use config::{Config, MAX_COMPRESSION_LEVEL};
pub use error::{Error, ErrorKind, IoResultExt, Result};
pub use hash::{checksum, Digest};
pub use wld::{rebuild, Decision, Fragment, Identity, Layout, Rebuilder, RefMap, StringPool, Traversal, Wld};
