//! Semantic memory: ports, the index registry, and the engine.
//!
//! Store path: embed -> metadata insert -> index add.
//! Retrieve path: embed -> index search -> metadata fetch -> re-rank.

pub mod box_embedder;
pub mod embedder;
pub mod engine;
pub mod gate;
pub mod index;
pub mod registry;
pub mod store;
