//! Snapshot export/restore of the metadata store and every index partition.

pub mod blob;
pub mod coordinator;
