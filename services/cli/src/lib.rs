//! SkillPath Command-Line Library Crate
//!
//! Environment configuration, text rendering and the terminal flows behind
//! each subcommand. The `skillpath` binary is a thin wrapper around this
//! library.

pub mod commands;
pub mod config;
pub mod render;
