//! Blob storage implementations.

pub mod local;
