//! Store snapshot persistence.
//!
//! A snapshot is the serialized [`Store`](crate::store::Store) of one
//! backend, keyed by a hash of its base URL. Snapshots let a later run start
//! from what an earlier one already fetched; in-flight state is never
//! persisted.

mod storage;

pub use storage::{snapshot_key, NoopStorage, Snapshot, SnapshotStorage, SqliteStorage};
