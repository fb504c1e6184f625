//! Pinger agent
//!
//! Periodically measures reachability of a target set with fping and
//! delivers the resulting report to stdout, a local file and a webhook.

pub mod cli;
pub mod config;
pub mod http;
pub mod instance;
pub mod output;
pub mod probe;
pub mod scheduler;
pub mod sources;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use config::{Config, Settings};
pub use scheduler::{CycleOutcome, Scheduler};
