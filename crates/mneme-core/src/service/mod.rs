//! Service layer consumed by the CLI.

pub mod memory;
