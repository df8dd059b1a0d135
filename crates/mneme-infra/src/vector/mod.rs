//! Vector index implementations.

pub mod flat;
