//! CLI subcommands

pub mod config;
pub mod mirror;
pub mod order;
