use chrono::{DateTime, Local};
use std::time::Duration;

use super::tree::{force_kill_tree, terminate_tree, DEFAULT_KILL_GRACE};
use super::{ManagedProcess, ProcessPhase, SupervisorError};
use crate::util::shorten;

const COMMAND_DISPLAY_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundInfo {
    pub pid: u32,
    pub command: String,
    pub log_ref: String,
    pub running: bool,
    pub elapsed: Duration,
    pub started: DateTime<Local>,
    pub exit_code: Option<i32>,
}

impl BackgroundInfo {
    pub fn summary_line(&self) -> String {
        let state = if self.running {
            "running".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exited ({code})"),
                None => "exited".to_string(),
            }
        };
        format!(
            "pid {:<7} {:<12} {:>6}s  started {}  log {}  $ {}",
            self.pid,
            state,
            self.elapsed.as_secs(),
            self.started.format("%H:%M:%S"),
            self.log_ref,
            self.command
        )
    }
}

/// Processes that outlived their foreground budget.
///
/// Only the supervisor inserts (on detach); only `kill`, `reclaim` and
/// `shutdown` remove.
#[derive(Debug)]
pub struct BackgroundRegistry {
    entries: Vec<ManagedProcess>,
    kill_grace: Duration,
}

impl BackgroundRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(kill_grace: Duration) -> Self {
        Self {
            entries: Vec::new(),
            kill_grace,
        }
    }

    pub(crate) fn insert(&mut self, mut process: ManagedProcess) {
        process.phase = ProcessPhase::Detached;
        tracing::info!(pid = process.pid, command = %process.command, log = %process.log.name, "process detached to background");
        self.entries.push(process);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.entries.iter().any(|p| p.pid == pid)
    }

    pub fn log_ref_of(&self, pid: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|p| p.pid == pid)
            .map(|p| p.log.name.as_str())
    }

    /// Snapshot of every entry; liveness is re-probed on each call.
    pub fn list(&mut self) -> Vec<BackgroundInfo> {
        self.entries
            .iter_mut()
            .map(|process| {
                let (running, exit_code) = probe(process);
                BackgroundInfo {
                    pid: process.pid,
                    command: shorten(&process.command, COMMAND_DISPLAY_CHARS),
                    log_ref: process.log.name.clone(),
                    running,
                    elapsed: process.started_at.elapsed(),
                    started: process.started_wall,
                    exit_code,
                }
            })
            .collect()
    }

    pub async fn kill(&mut self, pid: u32) -> Result<(), SupervisorError> {
        let idx = self
            .position(pid)
            .ok_or_else(|| SupervisorError::NotFound(pid.to_string()))?;

        let process = &mut self.entries[idx];
        terminate_tree(&mut process.child, process.pgid, self.kill_grace)
            .await
            .map_err(|source| SupervisorError::KillFailed { pid, source })?;

        let mut process = self.entries.remove(idx);
        process.phase = ProcessPhase::Killed;
        process.log.reclaim();
        tracing::info!(pid, "background process killed");
        Ok(())
    }

    /// Drop a finished entry and delete its artifact.
    pub fn reclaim(&mut self, pid: u32) -> Result<(), SupervisorError> {
        let idx = self
            .position(pid)
            .ok_or_else(|| SupervisorError::NotFound(pid.to_string()))?;
        let (running, _) = probe(&mut self.entries[idx]);
        if running {
            return Err(SupervisorError::StillRunning(pid));
        }
        let process = self.entries.remove(idx);
        // Descendants of an exited leader would otherwise be left unmanaged.
        force_kill_tree(process.pgid);
        process.log.reclaim();
        tracing::info!(pid, "background entry reclaimed");
        Ok(())
    }

    /// Terminate every remaining entry. Failures are logged, never returned.
    pub async fn shutdown(&mut self) {
        for mut process in std::mem::take(&mut self.entries) {
            if let Err(err) = terminate_tree(&mut process.child, process.pgid, self.kill_grace).await {
                tracing::warn!(pid = process.pid, error = %err, "failed to terminate background process at shutdown");
            }
            process.log.reclaim();
        }
    }

    fn position(&self, pid: u32) -> Option<usize> {
        self.entries.iter().position(|p| p.pid == pid)
    }
}

impl Default for BackgroundRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundRegistry {
    fn drop(&mut self) {
        for process in &self.entries {
            force_kill_tree(process.pgid);
        }
    }
}

fn probe(process: &mut ManagedProcess) -> (bool, Option<i32>) {
    match process.child.try_wait() {
        Ok(None) => (true, None),
        Ok(Some(status)) => {
            process.phase = ProcessPhase::Completed;
            (false, status.code())
        }
        // Unknown state is reported as running so reclaim never drops a live tree.
        Err(err) => {
            tracing::debug!(pid = process.pid, error = %err, "liveness probe failed");
            (true, None)
        }
    }
}
