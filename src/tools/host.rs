use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::edit_diff::format_edit_diff;
use super::files::FileTools;
use super::ToolCall;
use crate::approval::ApprovalGate;
use crate::config::Config;
use crate::keys::{CancelSource, KeyCancelSource};
use crate::process::{
    BackgroundRegistry, ProcessSupervisor, RunContext, SupervisorError, SupervisorOptions,
};
use crate::terminal::{terminal_width, RawModeGuard};
use crate::ui::{LiveView, RunObserver, StatusLine};
use crate::util::shorten;

const MAX_BUDGET_SECS: f64 = 600.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
    /// The operator cancelled; the enclosing operation should stop.
    pub cancelled: bool,
}

impl ToolResult {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
            cancelled: false,
        }
    }

    fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
            cancelled: false,
        }
    }

    fn cancelled(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
            cancelled: true,
        }
    }

    fn denied(tool: &str) -> Self {
        Self::error(format!("User denied {tool}"))
    }
}

/// Executes tool calls: approval first for anything mutating, then the file
/// tools or the process supervisor.
pub struct ToolHost {
    files: FileTools,
    supervisor: ProcessSupervisor,
    registry: BackgroundRegistry,
    approval: Arc<ApprovalGate>,
    keys: Box<dyn CancelSource>,
    display: Box<dyn Write + Send>,
    foreground_budget: Duration,
}

impl ToolHost {
    pub fn new(
        files: FileTools,
        supervisor: ProcessSupervisor,
        approval: Arc<ApprovalGate>,
        keys: Box<dyn CancelSource>,
        display: Box<dyn Write + Send>,
        foreground_budget: Duration,
    ) -> Self {
        Self {
            files,
            supervisor,
            registry: BackgroundRegistry::new(),
            approval,
            keys,
            display,
            foreground_budget,
        }
    }

    pub fn from_config(config: &Config, approval: Arc<ApprovalGate>) -> Self {
        Self::new(
            FileTools::new(config.working_dir.clone()),
            ProcessSupervisor::new(SupervisorOptions::from_config(config)),
            approval,
            Box::new(KeyCancelSource::new()),
            Box::new(std::io::stdout()),
            config.foreground_budget,
        )
    }

    pub fn approval(&self) -> &ApprovalGate {
        &self.approval
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn registry(&mut self) -> &mut BackgroundRegistry {
        &mut self.registry
    }

    /// Check the cancel keys between tool calls.
    pub fn poll_cancel(&mut self) -> bool {
        self.keys.poll()
    }

    pub async fn dispatch(&mut self, call: ToolCall, token: &CancellationToken) -> ToolResult {
        if token.is_cancelled() {
            return ToolResult::cancelled("operation already cancelled");
        }
        self.keys.discard();

        let name = call.name();
        tracing::info!(tool = name, mutating = call.is_mutating(), "tool call");
        let result = self.execute(call, token).await;
        tracing::info!(
            tool = name,
            is_error = result.is_error,
            cancelled = result.cancelled,
            output = %shorten(&result.output, 200),
            "tool result"
        );
        result
    }

    async fn execute(&mut self, call: ToolCall, token: &CancellationToken) -> ToolResult {
        match call {
            ToolCall::ListFiles { path, max_depth } => match self.files.list_files(&path, max_depth) {
                Ok((tree, _)) => ToolResult::ok(tree),
                Err(err) => ToolResult::error(err.to_string()),
            },
            ToolCall::ReadFile { filename } => match self.files.read_file(&filename) {
                Ok(content) => ToolResult::ok(content),
                Err(err) => ToolResult::error(err.to_string()),
            },
            ToolCall::WriteFile { filename, content } => {
                if let Err(err) = self.files.plan_write(&filename) {
                    return ToolResult::error(err.to_string());
                }
                let description = format!(
                    "write_file: {filename}\n{} lines, {} chars",
                    content.lines().count(),
                    content.chars().count()
                );
                if !self.approval.request(&description).await {
                    return ToolResult::denied("write_file");
                }
                match self.files.write_file(&filename, &content) {
                    Ok(msg) => ToolResult::ok(msg),
                    Err(err) => ToolResult::error(err.to_string()),
                }
            }
            ToolCall::EditFile {
                filename,
                target_text,
                replacement_text,
            } => {
                let plan = match self.files.plan_edit(&filename, &target_text, &replacement_text) {
                    Ok(plan) => plan,
                    Err(err) => return ToolResult::error(err.to_string()),
                };
                let diff = format_edit_diff(
                    &plan.target_text,
                    &plan.replacement_text,
                    plan.start_line,
                    terminal_width(),
                );
                let description = format!(
                    "edit_file: {} (line {})\n{diff}",
                    plan.display, plan.start_line
                );
                if !self.approval.request(&description).await {
                    return ToolResult::denied("edit_file");
                }
                match self.files.apply_edit(&plan) {
                    Ok(msg) => ToolResult::ok(msg),
                    Err(err) => ToolResult::error(err.to_string()),
                }
            }
            ToolCall::RunTerminalCommand {
                command,
                max_display_time,
            } => {
                if let Err(err) = self.supervisor.check_command(&command) {
                    tracing::warn!(command = %command, error = %err, "command rejected before approval");
                    LiveView::new(&mut self.display).finished(&StatusLine::for_error(&err));
                    return ToolResult::error(err.to_string());
                }
                let description = format!("run_terminal_command: {command}");
                if !self.approval.request(&description).await {
                    return ToolResult::denied("run_terminal_command");
                }
                let budget = self.budget_for(max_display_time);
                self.run_command(&command, budget, token).await
            }
            ToolCall::ViewLog { log_ref, lines } => {
                let viewed = match log_ref.as_deref().map(str::trim) {
                    None | Some("") => self.supervisor.view_last_log(lines),
                    Some(reference) => {
                        let name = reference
                            .parse::<u32>()
                            .ok()
                            .and_then(|pid| self.registry.log_ref_of(pid))
                            .unwrap_or(reference)
                            .to_string();
                        self.supervisor.view_log(&name, lines)
                    }
                };
                supervisor_result(viewed)
            }
            ToolCall::ListBackground {} => {
                let entries = self.registry.list();
                if entries.is_empty() {
                    return ToolResult::ok("(no background processes)");
                }
                let lines: Vec<String> = entries.iter().map(|e| e.summary_line()).collect();
                ToolResult::ok(lines.join("\n"))
            }
            ToolCall::KillBackground { pid } => {
                if !self.registry.contains(pid) {
                    return ToolResult::error(SupervisorError::NotFound(pid.to_string()).to_string());
                }
                if !self.approval.request(&format!("kill_background: pid {pid}")).await {
                    return ToolResult::denied("kill_background");
                }
                supervisor_result(
                    self.registry
                        .kill(pid)
                        .await
                        .map(|()| format!("Killed background process {pid}")),
                )
            }
            ToolCall::ReclaimBackground { pid } => supervisor_result(
                self.registry
                    .reclaim(pid)
                    .map(|()| format!("Reclaimed background process {pid}")),
            ),
        }
    }

    fn budget_for(&self, max_display_time: Option<f64>) -> Duration {
        match max_display_time {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                Duration::from_secs_f64(secs.min(MAX_BUDGET_SECS))
            }
            _ => self.foreground_budget,
        }
    }

    async fn run_command(
        &mut self,
        command: &str,
        budget: Duration,
        token: &CancellationToken,
    ) -> ToolResult {
        let _raw = RawModeGuard::engage();
        let mut view = LiveView::new(&mut self.display);
        let ctx = RunContext {
            keys: self.keys.as_mut(),
            token,
            registry: &mut self.registry,
        };
        match self.supervisor.run_command(command, budget, ctx, &mut view).await {
            Ok(outcome) if outcome.is_cancelled() => ToolResult::cancelled(outcome.report()),
            Ok(outcome) => ToolResult::ok(outcome.report()),
            Err(err) => ToolResult::error(err.to_string()),
        }
    }

    /// Terminate background processes and remove log artifacts.
    pub async fn shutdown(&mut self) {
        self.registry.shutdown().await;
        let removed = self.supervisor.cleanup_artifacts();
        tracing::info!(removed, "tool host shut down");
    }
}

fn supervisor_result(result: Result<String, SupervisorError>) -> ToolResult {
    match result {
        Ok(text) => ToolResult::ok(text),
        Err(err) => ToolResult::error(err.to_string()),
    }
}
