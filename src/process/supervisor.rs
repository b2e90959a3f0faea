use chrono::Local;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use super::deny_list::DenyList;
use super::log_tail::{read_tail, LogTail};
use super::registry::BackgroundRegistry;
use super::tree::{shell_command, terminate_tree, DEFAULT_KILL_GRACE};
use super::{LogArtifact, ManagedProcess, ProcessPhase, RunOutcome, SupervisorError, NO_OUTPUT};
use crate::config::{Config, LogMode};
use crate::keys::CancelSource;
use crate::ui::{RunObserver, StatusLine};
use crate::util::tail_chars;

pub const LATEST_LOG_NAME: &str = "latest.log";
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_OUTPUT_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub log_dir: PathBuf,
    pub working_dir: PathBuf,
    pub log_mode: LogMode,
    pub tail_lines: usize,
    pub tick: Duration,
    pub kill_grace: Duration,
    pub output_limit: usize,
}

impl SupervisorOptions {
    pub fn new(log_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            working_dir: working_dir.into(),
            log_mode: LogMode::PerInvocation,
            tail_lines: crate::config::DEFAULT_TAIL_LINES,
            tick: DEFAULT_TICK,
            kill_grace: DEFAULT_KILL_GRACE,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            log_mode: config.log_mode,
            tail_lines: config.tail_lines,
            ..Self::new(&config.log_dir, &config.working_dir)
        }
    }
}

/// Everything a run borrows from its caller.
pub struct RunContext<'a> {
    pub keys: &'a mut dyn CancelSource,
    /// Tripped when the operator cancels, so enclosing loops stop too.
    pub token: &'a CancellationToken,
    pub registry: &'a mut BackgroundRegistry,
}

/// One liveness check of a foreground child.
#[derive(Debug)]
enum Liveness {
    Running,
    Exited(Option<i32>),
    /// The OS could not say; the child may still be running.
    Unknown(io::Error),
}

impl From<io::Result<Option<ExitStatus>>> for Liveness {
    fn from(result: io::Result<Option<ExitStatus>>) -> Self {
        match result {
            Ok(None) => Self::Running,
            Ok(Some(status)) => Self::Exited(status.code()),
            Err(err) => Self::Unknown(err),
        }
    }
}

pub struct ProcessSupervisor {
    options: SupervisorOptions,
    deny: DenyList,
    /// Display lines of the last foreground run, kept after its artifact is
    /// reclaimed.
    last_run: Mutex<Option<Vec<String>>>,
}

impl ProcessSupervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            deny: DenyList::default(),
            last_run: Mutex::new(None),
        }
    }

    /// Reject `command` if it matches the deny list. Nothing is spawned.
    pub fn check_command(&self, command: &str) -> Result<(), SupervisorError> {
        self.deny.check(command)
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn log_dir(&self) -> &Path {
        &self.options.log_dir
    }

    /// Run `command` under supervision until it exits, is cancelled, or uses
    /// up `budget` (per-invocation mode only; it then keeps running in
    /// `ctx.registry`).
    pub async fn run_command(
        &self,
        command: &str,
        budget: Duration,
        ctx: RunContext<'_>,
        view: &mut dyn RunObserver,
    ) -> Result<RunOutcome, SupervisorError> {
        if let Err(err) = self.check_command(command) {
            tracing::warn!(command, error = %err, "command rejected by deny list");
            view.finished(&StatusLine::for_error(&err));
            return Err(err);
        }

        let (artifact, child) = match self.spawn(command) {
            Ok(spawned) => spawned,
            Err(err) => {
                view.finished(&StatusLine::for_error(&err));
                return Err(err);
            }
        };
        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, command, log = %artifact.name, "process spawned");

        let mut process = ManagedProcess {
            pid,
            pgid: pid,
            command: command.to_string(),
            log: artifact,
            started_at: Instant::now(),
            started_wall: Local::now(),
            phase: ProcessPhase::Running,
            child,
        };
        view.started(command, pid);

        let outcome = match self.drive(&mut process, budget, ctx.keys, ctx.token, view).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(pid, error = %err, "foreground process abandoned");
                view.finished(&StatusLine::for_error(&err));
                self.retire(&process.log);
                return Err(err);
            }
        };
        view.finished(&StatusLine::for_outcome(&outcome));

        match &outcome {
            RunOutcome::Detached { .. } => ctx.registry.insert(process),
            RunOutcome::Completed { exit_code, .. } => {
                tracing::info!(pid, exit_code = ?exit_code, "process completed");
                self.retire(&process.log);
            }
            RunOutcome::Cancelled { .. } => {
                tracing::info!(pid, "process cancelled by operator");
                self.retire(&process.log);
            }
        }
        Ok(outcome)
    }

    /// Keep the artifact's lines for `view_last_log`, then delete it.
    fn retire(&self, artifact: &LogArtifact) {
        let lines = read_tail(&artifact.path, usize::MAX);
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(lines);
        artifact.reclaim();
    }

    fn spawn(&self, command: &str) -> Result<(LogArtifact, Child), SupervisorError> {
        let launch_failed = |source: std::io::Error| SupervisorError::LaunchFailed {
            command: command.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.options.log_dir).map_err(launch_failed)?;
        let artifact = LogArtifact::new(&self.options.log_dir, self.next_artifact_name());
        let stdout = File::create(&artifact.path).map_err(launch_failed)?;
        let stderr = stdout.try_clone().map_err(launch_failed)?;

        let mut cmd = shell_command(command, &self.options.working_dir);
        cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));

        match tokio::process::Command::from(cmd).spawn() {
            Ok(child) => Ok((artifact, child)),
            Err(err) => {
                artifact.reclaim();
                Err(launch_failed(err))
            }
        }
    }

    async fn drive(
        &self,
        process: &mut ManagedProcess,
        budget: Duration,
        keys: &mut dyn CancelSource,
        token: &CancellationToken,
        view: &mut dyn RunObserver,
    ) -> Result<RunOutcome, SupervisorError> {
        let mut tail = LogTail::new(&process.log.path, self.options.tail_lines);
        let detachable = self.options.log_mode == LogMode::PerInvocation;

        loop {
            let liveness = Liveness::from(process.child.try_wait());

            if let Some(lines) = tail.poll() {
                view.tail(&lines);
            }

            match liveness {
                Liveness::Running => {}
                Liveness::Exited(exit_code) => {
                    process.phase = ProcessPhase::Completed;
                    return Ok(RunOutcome::Completed {
                        exit_code,
                        output: self.collect_output(&process.log),
                    });
                }
                Liveness::Unknown(source) => {
                    tracing::warn!(pid = process.pid, error = %source, "liveness check failed");
                    self.abandon(process).await;
                    return Err(SupervisorError::WaitFailed {
                        pid: process.pid,
                        source,
                    });
                }
            }

            if token.is_cancelled() || keys.poll() {
                if let Err(err) =
                    terminate_tree(&mut process.child, process.pgid, self.options.kill_grace).await
                {
                    tracing::warn!(pid = process.pid, error = %err, "process tree termination failed");
                    let _ = process.child.start_kill();
                }
                process.phase = ProcessPhase::Cancelled;
                token.cancel();
                if let Some(lines) = tail.poll() {
                    view.tail(&lines);
                }
                return Ok(RunOutcome::Cancelled {
                    output: self.collect_output(&process.log),
                });
            }

            if detachable && process.started_at.elapsed() >= budget {
                process.phase = ProcessPhase::Detached;
                return Ok(RunOutcome::Detached {
                    pid: process.pid,
                    log_ref: process.log.name.clone(),
                    partial_output: self.collect_output(&process.log),
                });
            }

            tokio::time::sleep(self.options.tick).await;
        }
    }

    /// Stop a child whose state can no longer be observed.
    async fn abandon(&self, process: &mut ManagedProcess) {
        if let Err(err) = terminate_tree(&mut process.child, process.pgid, self.options.kill_grace).await {
            tracing::warn!(pid = process.pid, error = %err, "process tree termination failed");
            let _ = process.child.start_kill();
        }
        process.phase = ProcessPhase::Killed;
    }

    fn collect_output(&self, artifact: &LogArtifact) -> String {
        let output = artifact.read_all();
        if output.trim().is_empty() {
            return NO_OUTPUT.to_string();
        }
        tail_chars(&output, self.options.output_limit)
    }

    fn next_artifact_name(&self) -> String {
        match self.options.log_mode {
            LogMode::Latest => LATEST_LOG_NAME.to_string(),
            LogMode::PerInvocation => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                format!(
                    "run-{}-{}.log",
                    Local::now().format("%Y%m%d-%H%M%S"),
                    &id[..8]
                )
            }
        }
    }

    /// The last `max_lines` lines of a log artifact in the log directory.
    pub fn view_log(&self, log_ref: &str, max_lines: usize) -> Result<String, SupervisorError> {
        let name = log_ref.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SupervisorError::NotFound(log_ref.to_string()));
        }
        let path = self.options.log_dir.join(name);
        if !path.is_file() {
            return Err(SupervisorError::NotFound(log_ref.to_string()));
        }

        Ok(format_tail(&read_tail(&path, usize::MAX), max_lines))
    }

    /// The last `max_lines` lines of the most recent foreground run. Its
    /// artifact is already gone, so this reads the copy kept at completion.
    pub fn view_last_log(&self, max_lines: usize) -> Result<String, SupervisorError> {
        let last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        match last_run.as_deref() {
            Some(lines) => Ok(format_tail(lines, max_lines)),
            None => Err(SupervisorError::NotFound(LATEST_LOG_NAME.to_string())),
        }
    }

    /// Delete every artifact this supervisor names (`run-*.log`, `latest.log`).
    pub fn cleanup_artifacts(&self) -> usize {
        let entries = match std::fs::read_dir(&self.options.log_dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let ours = name == LATEST_LOG_NAME || (name.starts_with("run-") && name.ends_with(".log"));
            if !ours {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => tracing::warn!(artifact = %name, error = %err, "failed to remove log artifact"),
            }
        }
        tracing::debug!(removed, "log artifacts cleaned up");
        removed
    }
}

fn format_tail(lines: &[String], max_lines: usize) -> String {
    if lines.is_empty() {
        return NO_OUTPUT.to_string();
    }
    let max_lines = max_lines.max(1);
    let total = lines.len();
    if total <= max_lines {
        return lines.join("\n");
    }
    let shown = &lines[total - max_lines..];
    format!(
        "...(last {max_lines} of {total} lines)\n{}",
        shown.join("\n")
    )
}
