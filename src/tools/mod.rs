pub mod edit_diff;
pub mod files;
pub mod host;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use files::{EditPlan, FileTools};
pub use host::{ToolHost, ToolResult};

fn default_list_path() -> String {
    ".".to_string()
}

fn default_depth() -> usize {
    1
}

fn default_log_lines() -> usize {
    50
}

/// Every operation the assistant can request, as `{"name": ..., "input": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "input", rename_all = "snake_case")]
pub enum ToolCall {
    ListFiles {
        #[serde(default = "default_list_path")]
        path: String,
        #[serde(default = "default_depth")]
        max_depth: usize,
    },
    ReadFile {
        filename: String,
    },
    WriteFile {
        filename: String,
        content: String,
    },
    EditFile {
        filename: String,
        target_text: String,
        replacement_text: String,
    },
    RunTerminalCommand {
        command: String,
        /// Seconds before the command is moved to the background.
        #[serde(default)]
        max_display_time: Option<f64>,
    },
    ViewLog {
        /// A background pid or a log artifact name; the latest slot if absent.
        #[serde(default)]
        log_ref: Option<String>,
        #[serde(default = "default_log_lines")]
        lines: usize,
    },
    ListBackground {},
    KillBackground {
        pid: u32,
    },
    ReclaimBackground {
        pid: u32,
    },
}

impl ToolCall {
    pub fn from_parts(name: &str, input: serde_json::Value) -> Result<Self> {
        let input = if input.is_null() {
            serde_json::json!({})
        } else {
            input
        };
        serde_json::from_value(serde_json::json!({ "name": name, "input": input }))
            .with_context(|| format!("Invalid arguments for tool '{name}'"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListFiles { .. } => "list_files",
            Self::ReadFile { .. } => "read_file",
            Self::WriteFile { .. } => "write_file",
            Self::EditFile { .. } => "edit_file",
            Self::RunTerminalCommand { .. } => "run_terminal_command",
            Self::ViewLog { .. } => "view_log",
            Self::ListBackground {} => "list_background",
            Self::KillBackground { .. } => "kill_background",
            Self::ReclaimBackground { .. } => "reclaim_background",
        }
    }

    /// Calls that change files or processes and therefore need approval.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::WriteFile { .. }
                | Self::EditFile { .. }
                | Self::RunTerminalCommand { .. }
                | Self::KillBackground { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_parts_applies_defaults() {
        let call = ToolCall::from_parts("list_files", json!({})).expect("parse");
        assert_eq!(
            call,
            ToolCall::ListFiles {
                path: ".".to_string(),
                max_depth: 1
            }
        );
        let call = ToolCall::from_parts("list_background", serde_json::Value::Null).expect("parse");
        assert_eq!(call, ToolCall::ListBackground {});
    }

    #[test]
    fn test_run_terminal_command_budget_is_optional() {
        let call = ToolCall::from_parts(
            "run_terminal_command",
            json!({"command": "ls", "max_display_time": 2.5}),
        )
        .expect("parse");
        assert!(call.is_mutating());
        assert_eq!(
            call,
            ToolCall::RunTerminalCommand {
                command: "ls".to_string(),
                max_display_time: Some(2.5)
            }
        );
    }

    #[test]
    fn test_unknown_tool_and_missing_fields_fail() {
        assert!(ToolCall::from_parts("format_disk", json!({})).is_err());
        let err = ToolCall::from_parts("write_file", json!({"filename": "a"})).expect_err("missing");
        assert!(err.to_string().contains("write_file"));
    }

    #[test]
    fn test_name_matches_wire_tag() {
        let call = ToolCall::KillBackground { pid: 3 };
        let wire = serde_json::to_value(&call).expect("serialize");
        assert_eq!(wire["name"], call.name());
    }
}
