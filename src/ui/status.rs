use crossterm::style::Color;

use super::repaint::RenderLine;
use crate::process::{RunOutcome, SupervisorError};

/// One line that tells the operator unambiguously how a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub color: Color,
}

impl StatusLine {
    fn new(text: String, color: Color) -> Self {
        Self { text, color }
    }

    pub fn for_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed {
                exit_code: Some(0), ..
            } => Self::new("[completed] exit code 0".to_string(), Color::Green),
            RunOutcome::Completed {
                exit_code: Some(code),
                ..
            } => Self::new(format!("[failed] exit code {code}"), Color::Red),
            RunOutcome::Completed {
                exit_code: None, ..
            } => Self::new(
                "[completed] terminated by signal".to_string(),
                Color::Yellow,
            ),
            RunOutcome::Detached { pid, log_ref, .. } => Self::new(
                format!("[background] pid {pid} still running, log {log_ref}"),
                Color::Cyan,
            ),
            RunOutcome::Cancelled { .. } => Self::new(
                "[cancelled] process tree terminated".to_string(),
                Color::Magenta,
            ),
        }
    }

    pub fn for_error(err: &SupervisorError) -> Self {
        match err {
            SupervisorError::BlockedCommand { pattern } => Self::new(
                format!("[blocked] matches dangerous pattern '{pattern}', not run"),
                Color::Red,
            ),
            SupervisorError::LaunchFailed { source, .. } => {
                Self::new(format!("[launch failed] {source}"), Color::Red)
            }
            SupervisorError::NotFound(what) => {
                Self::new(format!("[not found] {what}"), Color::Yellow)
            }
            SupervisorError::StillRunning(pid) => {
                Self::new(format!("[running] pid {pid} has not exited"), Color::Yellow)
            }
            SupervisorError::KillFailed { pid, source } => {
                Self::new(format!("[kill failed] pid {pid}: {source}"), Color::Red)
            }
            SupervisorError::WaitFailed { pid, source } => Self::new(
                format!("[error] pid {pid} could not be checked, tree terminated: {source}"),
                Color::Red,
            ),
        }
    }

    pub fn cancelled_operation() -> Self {
        Self::new("[cancelled] operation stopped".to_string(), Color::Magenta)
    }

    pub fn to_render_line(&self) -> RenderLine {
        RenderLine::plain(self.text.clone()).with_color(self.color)
    }
}
