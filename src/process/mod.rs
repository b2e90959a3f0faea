//! Child-process supervision: spawning behind a deny list, live tailing of the
//! combined output, foreground budgets, detaching into the background
//! registry, and process-tree termination.

pub mod deny_list;
pub mod log_tail;
pub mod registry;
pub mod supervisor;
pub mod tree;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::process::Child;

pub use deny_list::DenyList;
pub use log_tail::{read_tail, LogTail};
pub use registry::{BackgroundInfo, BackgroundRegistry};
pub use supervisor::{ProcessSupervisor, RunContext, SupervisorOptions};

/// Reported instead of empty output so the operator can tell a silent
/// command from one that never ran.
pub const NO_OUTPUT: &str = "(no output)";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("command blocked: matches dangerous pattern '{pattern}'")]
    BlockedCommand { pattern: String },
    #[error("failed to launch '{command}': {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no background process or log named '{0}'")]
    NotFound(String),
    #[error("process {0} is still running")]
    StillRunning(u32),
    #[error("failed to terminate process {pid}: {source}")]
    KillFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("lost track of process {pid}: {source}")]
    WaitFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        exit_code: Option<i32>,
        output: String,
    },
    /// The foreground budget ran out; the process keeps running in the
    /// background registry.
    Detached {
        pid: u32,
        log_ref: String,
        partial_output: String,
    },
    /// The operator pressed the cancel key; the whole process tree is gone.
    Cancelled { output: String },
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Text handed back to whoever asked for the run.
    pub fn report(&self) -> String {
        match self {
            Self::Completed { exit_code, output } => match exit_code {
                Some(code) => format!("exit code: {code}\n{output}"),
                None => format!("terminated by signal\n{output}"),
            },
            Self::Detached {
                pid,
                log_ref,
                partial_output,
            } => format!(
                "still running in the background (pid {pid}, log {log_ref})\n\
                 output so far:\n{partial_output}\n\
                 use view_log / kill_background to follow up"
            ),
            Self::Cancelled { output } => format!("cancelled by user\n{output}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    Running,
    Completed,
    Detached,
    Cancelled,
    Killed,
}

/// A log file the child writes into and readers only tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogArtifact {
    pub path: PathBuf,
    pub name: String,
}

impl LogArtifact {
    pub fn new(dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: dir.join(&name),
            name,
        }
    }

    /// Full decoded content; a missing artifact reads as empty.
    pub fn read_all(&self) -> String {
        match std::fs::read(&self.path) {
            Ok(bytes) => log_tail::decode_log_bytes(&bytes),
            Err(_) => String::new(),
        }
    }

    pub fn reclaim(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(artifact = %self.name, "log artifact reclaimed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(artifact = %self.name, error = %err, "failed to reclaim log artifact")
            }
        }
    }
}

#[derive(Debug)]
pub struct ManagedProcess {
    pub pid: u32,
    /// Process group recorded at spawn; outlives the leader's pid handle.
    pub pgid: u32,
    pub command: String,
    pub log: LogArtifact,
    pub started_at: Instant,
    pub started_wall: DateTime<Local>,
    pub phase: ProcessPhase,
    pub child: Child,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_missing_artifact_is_quiet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = LogArtifact::new(dir.path(), "run-x.log");
        artifact.reclaim();
        assert_eq!(artifact.read_all(), "");
    }

    #[test]
    fn test_report_mentions_background_pid() {
        let outcome = RunOutcome::Detached {
            pid: 42,
            log_ref: "run-a.log".to_string(),
            partial_output: "tick".to_string(),
        };
        let report = outcome.report();
        assert!(report.contains("pid 42"));
        assert!(report.contains("run-a.log"));
        assert!(!outcome.is_cancelled());
    }

    #[test]
    fn test_blocked_error_names_pattern() {
        let err = SupervisorError::BlockedCommand {
            pattern: "sudo".to_string(),
        };
        assert!(err.to_string().contains("sudo"));
    }
}
