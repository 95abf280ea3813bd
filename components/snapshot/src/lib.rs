//! Whole-state serialization for the City VM.
//!
//! A snapshot is a UTF-8 text file: a JSON list with one record per line.
//! The first record is a header (format version, native-function tag
//! table, interpreter-global singletons); every following record is one
//! syntax-tree node, scope, object or stack frame, emitted exactly once in
//! arena order. All references between records are arena indices, so
//! cycles cost nothing and the loader is a single pass.
//!
//! Files are written as `<name>.partial` and renamed into place, so any
//! `.city` file in the database directory is complete.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod record;
mod retention;
mod store;

pub use error::SnapshotError;
pub use record::{Globals, Header, Record, FORMAT_VERSION};
pub use retention::{enforce_retention, select_victim, RETENTION_DECAY};
pub use store::{
    decode, encode, latest_snapshot, list_snapshots, parse_snapshot_name, read_snapshot, restore,
    serialize, snapshot_filename, write_snapshot, SnapshotFile,
};
