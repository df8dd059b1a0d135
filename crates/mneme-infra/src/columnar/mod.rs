//! Arrow IPC encoding for snapshot artifacts.
//!
//! Metadata tables and index partitions are written as Arrow IPC files so a
//! bundle can be inspected with any Arrow reader.

pub mod codec;
pub mod schema;
