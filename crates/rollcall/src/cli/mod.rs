//! CLI commands for the rollcall station.

pub mod config;
pub mod error;
pub mod output;
pub mod queue;
pub mod roster;
pub mod scan;
pub mod station;
pub mod sync;
