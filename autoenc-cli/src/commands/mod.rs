//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// Module containing the implementation of the `encode` command.
/// This command runs files through the autoenc pipeline.
pub mod encode;
