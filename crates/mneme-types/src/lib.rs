//! Shared domain types for mneme.
//!
//! This crate contains the core domain types used across the memory engine:
//! Conversation, Memory, Embedding, snapshot manifests, configuration, and
//! the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod snapshot;
