//! Fleethub operator: wiring for the manager and agent binaries

pub mod config;
pub mod controller_runner;
pub mod runtime;
