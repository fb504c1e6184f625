//! Pinger protocol library
//!
//! Format contracts shared by the agent and anything consuming its reports:
//! the target address grammar, the measurement diagnostic-line format, and
//! the JSON report schema.

pub mod address;
pub mod error;
pub mod parser;
pub mod report;

pub use address::{AddressKind, Target};
pub use error::AddressError;
pub use parser::{parse_diagnostics, LatencyUnit};
pub use report::{CycleEvent, HostResult, HostStatus, ProbeSettings, Report, Summary};

/// Process name used for single-instance checks and the HTTP user agent
pub const AGENT_NAME: &str = "pinger-agent";

/// Inclusive range of HTTP status codes treated as success
pub const HTTP_SUCCESS: std::ops::RangeInclusive<u16> = 200..=205;
