//! Embedding backends.
//!
//! `FastEmbedder` runs a local ONNX model; `HashingEmbedder` is a
//! dependency-free fallback for offline use and tests.

pub mod fastembed;
pub mod hashing;
