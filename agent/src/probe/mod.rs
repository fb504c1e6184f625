//! Reachability measurement
//!
//! A [`ProbeExecutor`] runs one batch measurement over every target of the
//! cycle and hands back the raw process output; [`measure`] turns that into
//! per-host results.

mod fping;

pub use fping::{build_args, FpingExecutor};

use async_trait::async_trait;
use protocol::{parse_diagnostics, HostResult, LatencyUnit, ProbeSettings, Target};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to start measurement command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of one measurement run
#[derive(Debug, Clone, Default)]
pub struct ProbeOutput {
    pub stdout: String,
    /// Diagnostic stream carrying the per-host lines
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// Run one measurement over the whole batch
    ///
    /// The exit status is reported but not judged; only a failure to start
    /// the measurement is an error.
    async fn execute(&self, targets: &[Target], settings: &ProbeSettings) -> Result<ProbeOutput, ProbeError>;

    /// Unit of the latency tokens this backend prints
    fn latency_unit(&self) -> LatencyUnit {
        LatencyUnit::Seconds
    }
}

/// Execute and parse one batch; every target gets exactly one result
pub async fn measure(
    executor: &dyn ProbeExecutor,
    targets: &[Target],
    settings: &ProbeSettings,
) -> Result<Vec<HostResult>, ProbeError> {
    let output = executor.execute(targets, settings).await?;
    debug!(
        "Measurement finished (exit code {:?}, {} bytes of diagnostics)",
        output.exit_code,
        output.stderr.len()
    );

    let results = parse_diagnostics(&output.stderr, targets, executor.latency_unit());
    if results.iter().all(|r| r.sent == 0) {
        warn!(
            "Measurement produced no parseable host lines (exit code {:?}): {}",
            output.exit_code,
            output.stderr.trim()
        );
    }

    Ok(results)
}
