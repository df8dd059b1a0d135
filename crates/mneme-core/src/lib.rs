//! Memory engine logic and port (trait) definitions for mneme.
//!
//! This crate defines the ports that the infrastructure layer implements
//! (embedder, metadata store, vector index, blob store) and the logic built
//! on them: the per-conversation index registry, the semantic memory engine,
//! and the snapshot coordinator. It depends only on `mneme-types` -- never
//! on `mneme-infra` or any database/IO crate.

pub mod memory;
pub mod service;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;
