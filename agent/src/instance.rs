//! Advisory single-instance marker for continuous mode
//!
//! The marker file holds the pid of the running agent. On startup a live
//! process with our name is killed and replaced; a live process with some
//! other name is left alone. Nothing here ever blocks startup.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("marker file {path:?}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot determine own process identity")]
    UnknownIdentity,

    #[error("failed to terminate process {pid}: {reason}")]
    Terminate { pid: u32, reason: String },
}

/// What the marker file says before we claim it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    NoMarker,
    /// Unreadable pid or a process that no longer exists
    MarkerStale,
    MarkerLiveSameIdentity(u32),
    MarkerLiveOtherIdentity(u32),
}

/// View of the running processes
pub trait ProcessTable {
    fn current_pid(&self) -> u32;

    /// Program name of the current process
    fn identity(&self) -> Option<String>;

    /// Argument vector of a live process, `None` if it does not exist
    fn command_line(&self, pid: u32) -> Option<Vec<String>>;

    fn terminate(&self, pid: u32) -> Result<(), InstanceError>;
}

/// `/proc` backed process table
pub struct LinuxProcessTable;

impl ProcessTable for LinuxProcessTable {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn identity(&self) -> Option<String> {
        let exe = std::env::current_exe().ok()?;
        exe.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    fn command_line(&self, pid: u32) -> Option<Vec<String>> {
        let raw = std::fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
        Some(split_cmdline(&raw))
    }

    fn terminate(&self, pid: u32) -> Result<(), InstanceError> {
        let status = Command::new("kill")
            .args(["-9", &pid.to_string()])
            .status()
            .map_err(|e| InstanceError::Terminate {
                pid,
                reason: e.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(InstanceError::Terminate {
                pid,
                reason: format!("kill exited with {}", status),
            })
        }
    }
}

pub struct InstanceMarker<T: ProcessTable> {
    path: PathBuf,
    table: T,
    identity: String,
    pid: u32,
}

impl<T: ProcessTable> InstanceMarker<T> {
    /// Fails when the current process cannot name itself
    pub fn new(path: impl Into<PathBuf>, table: T) -> Result<Self, InstanceError> {
        let identity = table
            .identity()
            .filter(|name| !name.trim().is_empty())
            .ok_or(InstanceError::UnknownIdentity)?;
        let pid = table.current_pid();
        Ok(Self {
            path: path.into(),
            table,
            identity,
            pid,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inspect(&self) -> Result<MarkerState, InstanceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MarkerState::NoMarker),
            Err(source) => {
                return Err(InstanceError::Marker {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let Ok(pid) = contents.trim().parse::<u32>() else {
            return Ok(MarkerState::MarkerStale);
        };
        let state = match self.table.command_line(pid) {
            None => MarkerState::MarkerStale,
            Some(argv) if self.same_identity(&argv) => MarkerState::MarkerLiveSameIdentity(pid),
            Some(_) => MarkerState::MarkerLiveOtherIdentity(pid),
        };
        Ok(state)
    }

    /// Resolve any previous instance, then write our pid
    pub fn claim(&self) -> Result<MarkerState, InstanceError> {
        let state = self.inspect()?;
        debug!("Marker {:?} state: {:?}", self.path, state);

        match state {
            MarkerState::MarkerLiveSameIdentity(pid) if pid != self.pid => {
                info!("Terminating previous instance (pid {})", pid);
                if let Err(e) = self.table.terminate(pid) {
                    warn!("{}", e);
                }
            }
            MarkerState::MarkerLiveOtherIdentity(pid) => {
                warn!("Marker names unrelated process {}, leaving it alone", pid);
            }
            _ => {}
        }

        std::fs::write(&self.path, format!("{}\n", self.pid)).map_err(|source| InstanceError::Marker {
            path: self.path.clone(),
            source,
        })?;
        Ok(state)
    }

    /// Remove the marker if it still names us
    pub fn release(&self) -> Result<(), InstanceError> {
        let owned = std::fs::read_to_string(&self.path)
            .map(|c| c.trim().parse::<u32>().ok() == Some(self.pid))
            .unwrap_or(false);
        if !owned {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(InstanceError::Marker {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn same_identity(&self, argv: &[String]) -> bool {
        argv.first()
            .and_then(|argv0| Path::new(argv0).file_name())
            .is_some_and(|name| name.to_string_lossy() == self.identity)
    }
}

/// `/proc/<pid>/cmdline` is NUL separated with a trailing NUL
fn split_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}
