//! fping backend
//!
//! All targets go to a single `fping -C` invocation; fping does its own
//! parallelism and timeout handling and prints one `addr : t1 t2 ...` line
//! per target on stderr, latencies in milliseconds.

use super::{ProbeError, ProbeExecutor, ProbeOutput};
use async_trait::async_trait;
use protocol::{LatencyUnit, ProbeSettings, Target};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub struct FpingExecutor {
    binary: String,
}

impl FpingExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Command-line arguments for one batch
pub fn build_args(targets: &[Target], settings: &ProbeSettings) -> Vec<String> {
    let mut args = Vec::with_capacity(16 + targets.len());

    if !settings.fragment {
        args.push("--dontfrag".to_string());
    }
    args.extend([
        "-C".to_string(),
        settings.count.to_string(),
        "-b".to_string(),
        settings.size.to_string(),
        "--ttl".to_string(),
        settings.ttl.to_string(),
        "-q".to_string(),
        "-B1".to_string(),
        "-r".to_string(),
        settings.retries.to_string(),
        "-i".to_string(),
        settings.interval.to_string(),
        format!("--timeout={}", settings.timeout),
    ]);
    if let Some(src) = &settings.source_address {
        args.push(format!("--src={}", src));
    }
    args.extend(targets.iter().map(|t| t.address().to_string()));

    args
}

#[async_trait]
impl ProbeExecutor for FpingExecutor {
    async fn execute(&self, targets: &[Target], settings: &ProbeSettings) -> Result<ProbeOutput, ProbeError> {
        let args = build_args(targets, settings);
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                command: self.binary.clone(),
                source,
            })?;

        Ok(ProbeOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn latency_unit(&self) -> LatencyUnit {
        LatencyUnit::Milliseconds
    }
}
