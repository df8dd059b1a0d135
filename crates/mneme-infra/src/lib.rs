//! Infrastructure layer for mneme.
//!
//! Contains implementations of the ports defined in `mneme-core`: SQLite
//! metadata and conversation stores, the Arrow IPC codec used for snapshot
//! artifacts, the flat vector index, the local-filesystem blob store, and the
//! embedding backends.

pub mod blob;
pub mod columnar;
pub mod config;
pub mod embedding;
pub mod sqlite;
pub mod vector;

mod timestamp;

#[cfg(test)]
mod scenarios;
