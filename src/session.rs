use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalGate;
use crate::config::{Config, LogMode};
use crate::console::{Console, SharedConsole};
use crate::preview::{StreamingArgumentPreview, ToolStreamMonitor};
use crate::stream::StreamParser;
use crate::tools::{ToolCall, ToolHost, ToolResult};
use crate::ui::StatusLine;

const PROMPT: &str = "vexrun> ";
const DEFAULT_VIEW_LINES: usize = 50;
const REPLAY_CHUNK_BYTES: usize = 64;
const REPLAY_CHUNK_DELAY: Duration = Duration::from_millis(5);

const BANNER: &str = "\
vexrun: supervised terminal commands and file tools
  !<command>       run a shell command (Esc cancels, long runs move to the background)
  /replay <file>   stream a recorded response and run its tool calls
  /help            all commands, q to quit";

const HELP: &[&str] = &[
    "!<command>, /run <command>   run a shell command",
    "/bg                          list background processes",
    "/log <pid|log-name> [lines]  view a log artifact",
    "/last [lines]                view the last foreground run",
    "/kill <pid>                  terminate a background process tree",
    "/reclaim <pid>               forget a finished background process",
    "/tool <name> <json>          invoke a tool directly",
    "/replay <sse-file>           replay a recorded stream",
    "/allow, /deny                toggle auto-approve",
    "/status, /help, q",
];

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Empty,
    Quit,
    Help,
    Allow,
    Deny,
    Status,
    Run(String),
    Background,
    Log { log_ref: String, lines: usize },
    Last { lines: usize },
    Kill(u32),
    Reclaim(u32),
    Tool { name: String, input: String },
    Replay(PathBuf),
    Invalid(String),
}

pub fn parse_command(line: &str) -> SessionCommand {
    let line = line.trim();
    if line.is_empty() {
        return SessionCommand::Empty;
    }
    if matches!(line, "q" | "quit" | "exit" | "/q" | "/quit" | "/exit") {
        return SessionCommand::Quit;
    }
    if let Some(command) = line.strip_prefix('!') {
        return run_or_usage(command, "!<command>");
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/help" | "/commands" => SessionCommand::Help,
        "/allow" => SessionCommand::Allow,
        "/deny" => SessionCommand::Deny,
        "/status" => SessionCommand::Status,
        "/run" => run_or_usage(rest, "/run <command>"),
        "/bg" => SessionCommand::Background,
        "/log" => {
            let mut parts = rest.split_whitespace();
            let Some(log_ref) = parts.next() else {
                return SessionCommand::Invalid("usage: /log <pid|log-name> [lines]".to_string());
            };
            match parse_lines(parts.next()) {
                Some(lines) => SessionCommand::Log {
                    log_ref: log_ref.to_string(),
                    lines,
                },
                None => SessionCommand::Invalid("line count must be a positive number".to_string()),
            }
        }
        "/last" => match parse_lines(rest.split_whitespace().next()) {
            Some(lines) => SessionCommand::Last { lines },
            None => SessionCommand::Invalid("line count must be a positive number".to_string()),
        },
        "/kill" => parse_pid(rest, "/kill <pid>").map_or_else(SessionCommand::Invalid, SessionCommand::Kill),
        "/reclaim" => parse_pid(rest, "/reclaim <pid>")
            .map_or_else(SessionCommand::Invalid, SessionCommand::Reclaim),
        "/tool" => {
            let (name, input) = match rest.split_once(char::is_whitespace) {
                Some((name, input)) => (name, input.trim()),
                None => (rest, ""),
            };
            if name.is_empty() {
                return SessionCommand::Invalid("usage: /tool <name> <json>".to_string());
            }
            SessionCommand::Tool {
                name: name.to_string(),
                input: input.to_string(),
            }
        }
        "/replay" if !rest.is_empty() => SessionCommand::Replay(PathBuf::from(rest)),
        "/replay" => SessionCommand::Invalid("usage: /replay <sse-file>".to_string()),
        _ => SessionCommand::Invalid(format!("unknown command: {head} (try /help)")),
    }
}

fn run_or_usage(command: &str, usage: &str) -> SessionCommand {
    let command = command.trim();
    if command.is_empty() {
        SessionCommand::Invalid(format!("usage: {usage}"))
    } else {
        SessionCommand::Run(command.to_string())
    }
}

fn parse_lines(arg: Option<&str>) -> Option<usize> {
    match arg {
        None => Some(DEFAULT_VIEW_LINES),
        Some(raw) => raw.parse::<usize>().ok().filter(|n| *n > 0),
    }
}

fn parse_pid(arg: &str, usage: &str) -> Result<u32, String> {
    arg.parse::<u32>().map_err(|_| format!("usage: {usage}"))
}

/// The interactive loop: operator commands in, tool calls out.
pub struct Session {
    console: SharedConsole,
    host: ToolHost,
    preview_out: Box<dyn Write + Send>,
    preview_interval: Duration,
}

impl Session {
    pub fn new(
        console: SharedConsole,
        host: ToolHost,
        preview_out: Box<dyn Write + Send>,
        preview_interval: Duration,
    ) -> Self {
        Self {
            console,
            host,
            preview_out,
            preview_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let console = Console::stdio().shared();
        let approval = Arc::new(ApprovalGate::new(console.clone(), config.auto_approve));
        let host = ToolHost::from_config(config, approval);
        Self::new(
            console,
            host,
            Box::new(std::io::stdout()),
            config.preview_interval,
        )
    }

    pub fn host(&mut self) -> &mut ToolHost {
        &mut self.host
    }

    pub async fn run(&mut self) -> Result<()> {
        say(&self.console, BANNER).await;
        loop {
            let line = {
                let mut console = self.console.lock().await;
                console.prompt(PROMPT).await.context("Failed to read input")?
            };
            let Some(line) = line else {
                break;
            };
            if !self.execute(parse_command(&line)).await? {
                break;
            }
        }
        Ok(())
    }

    /// Runs one command; false once the operator asked to quit.
    pub async fn execute(&mut self, command: SessionCommand) -> Result<bool> {
        let token = CancellationToken::new();
        match command {
            SessionCommand::Empty => {}
            SessionCommand::Quit => return Ok(false),
            SessionCommand::Help => {
                let mut text = String::from("* Commands");
                for line in HELP {
                    text.push_str("\n  └ ");
                    text.push_str(line);
                }
                say(&self.console, &text).await;
            }
            SessionCommand::Allow => {
                self.host.approval().set_auto_approve(true);
                say(&self.console, "* Auto-approve on").await;
            }
            SessionCommand::Deny => {
                self.host.approval().set_auto_approve(false);
                say(&self.console, "* Auto-approve off").await;
            }
            SessionCommand::Status => {
                let text = self.status_text();
                say(&self.console, &text).await;
            }
            SessionCommand::Run(command) => {
                tracing::info!(command = %command, "operator command");
                let call = ToolCall::RunTerminalCommand {
                    command,
                    max_display_time: None,
                };
                self.dispatch_and_print(call, &token).await;
            }
            SessionCommand::Background => {
                self.dispatch_and_print(ToolCall::ListBackground {}, &token)
                    .await;
            }
            SessionCommand::Log { log_ref, lines } => {
                let call = ToolCall::ViewLog {
                    log_ref: Some(log_ref),
                    lines,
                };
                self.dispatch_and_print(call, &token).await;
            }
            SessionCommand::Last { lines } => {
                let call = ToolCall::ViewLog {
                    log_ref: None,
                    lines,
                };
                self.dispatch_and_print(call, &token).await;
            }
            SessionCommand::Kill(pid) => {
                self.dispatch_and_print(ToolCall::KillBackground { pid }, &token)
                    .await;
            }
            SessionCommand::Reclaim(pid) => {
                self.dispatch_and_print(ToolCall::ReclaimBackground { pid }, &token)
                    .await;
            }
            SessionCommand::Tool { name, input } => {
                let value = if input.is_empty() {
                    serde_json::Value::Null
                } else {
                    match serde_json::from_str(&input) {
                        Ok(value) => value,
                        Err(err) => {
                            say(&self.console, &format!("[error] invalid JSON input: {err}")).await;
                            return Ok(true);
                        }
                    }
                };
                match ToolCall::from_parts(&name, value) {
                    Ok(call) => {
                        self.dispatch_and_print(call, &token).await;
                    }
                    Err(err) => say(&self.console, &format!("[error] {err:#}")).await,
                }
            }
            SessionCommand::Replay(path) => {
                if let Err(err) = self.replay(&path, &token).await {
                    say(&self.console, &format!("[error] {err:#}")).await;
                }
            }
            SessionCommand::Invalid(message) => say(&self.console, &message).await,
        }
        Ok(true)
    }

    fn status_text(&mut self) -> String {
        let options = self.host.supervisor().options();
        let mode = match options.log_mode {
            LogMode::Latest => "latest",
            LogMode::PerInvocation => "per-invocation",
        };
        let auto = if self.host.approval().auto_approve() {
            "on"
        } else {
            "off"
        };
        let working_dir = options.working_dir.display().to_string();
        let log_dir = options.log_dir.display().to_string();
        let background = self.host.registry().len();
        format!(
            "* Status\n  └ auto-approve: {auto}\n  └ working dir: {working_dir}\n  └ log dir: {log_dir} ({mode})\n  └ background processes: {background}"
        )
    }

    async fn dispatch_and_print(&mut self, call: ToolCall, token: &CancellationToken) -> ToolResult {
        let result = self.host.dispatch(call, token).await;
        print_result(&self.console, &result).await;
        result
    }

    /// Stream a recorded response through the parser, monitor and preview,
    /// then run the tool calls it produced in order.
    async fn replay(&mut self, path: &Path, token: &CancellationToken) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "replaying stream");

        let console = self.console.clone();
        let mut parser = StreamParser::new();
        let mut monitor = ToolStreamMonitor::new(StreamingArgumentPreview::new(
            &mut self.preview_out,
            self.preview_interval,
        ));
        let mut calls = Vec::new();
        let mut wrote_text = false;

        for chunk in bytes.chunks(REPLAY_CHUNK_BYTES) {
            if self.host.poll_cancel() {
                token.cancel();
            }
            if token.is_cancelled() {
                break;
            }
            for event in parser.process(chunk) {
                calls.extend(monitor.handle(event));
                let text = monitor.take_text();
                if !text.is_empty() {
                    console.lock().await.write(&text);
                    wrote_text = true;
                }
            }
            tokio::time::sleep(REPLAY_CHUNK_DELAY).await;
        }
        if monitor.preview().is_active() {
            monitor.handle(crate::types::StreamEvent::MessageStop);
        }
        let leftover = parser.flush();
        if !leftover.trim().is_empty() {
            tracing::warn!(bytes = leftover.len(), "replay ended inside an unterminated frame");
        }
        if wrote_text {
            say(&console, "").await;
        }

        for call in calls {
            if token.is_cancelled() {
                break;
            }
            let parsed = match ToolCall::from_parts(&call.name, call.input) {
                Ok(parsed) => parsed,
                Err(err) => {
                    say(&console, &format!("[error] {err:#}")).await;
                    continue;
                }
            };
            let result = self.host.dispatch(parsed, token).await;
            print_result(&console, &result).await;
        }

        if token.is_cancelled() {
            say(&console, &StatusLine::cancelled_operation().text).await;
        }
        Ok(())
    }

    /// Terminate background work and remove log artifacts.
    pub async fn shutdown(&mut self) {
        self.host.shutdown().await;
    }
}

async fn say(console: &SharedConsole, text: &str) {
    console.lock().await.write_line(text);
}

async fn print_result(console: &SharedConsole, result: &ToolResult) {
    let text = if result.is_error {
        format!("[error] {}", result.output)
    } else {
        result.output.clone()
    };
    say(console, &text).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shell_shortcuts() {
        assert_eq!(parse_command("!ls -la"), SessionCommand::Run("ls -la".to_string()));
        assert_eq!(parse_command("/run  make test "), SessionCommand::Run("make test".to_string()));
        assert!(matches!(parse_command("!"), SessionCommand::Invalid(_)));
        assert_eq!(parse_command("exit"), SessionCommand::Quit);
        assert_eq!(parse_command("   "), SessionCommand::Empty);
    }

    #[test]
    fn test_parse_log_commands() {
        assert_eq!(
            parse_command("/log 1234 20"),
            SessionCommand::Log {
                log_ref: "1234".to_string(),
                lines: 20
            }
        );
        assert_eq!(parse_command("/last"), SessionCommand::Last { lines: 50 });
        assert!(matches!(parse_command("/last 0"), SessionCommand::Invalid(_)));
        assert!(matches!(parse_command("/log"), SessionCommand::Invalid(_)));
    }

    #[test]
    fn test_parse_pid_and_tool_commands() {
        assert_eq!(parse_command("/kill 77"), SessionCommand::Kill(77));
        assert!(matches!(parse_command("/kill abc"), SessionCommand::Invalid(_)));
        assert_eq!(
            parse_command(r#"/tool read_file {"filename": "a"}"#),
            SessionCommand::Tool {
                name: "read_file".to_string(),
                input: r#"{"filename": "a"}"#.to_string()
            }
        );
        assert_eq!(
            parse_command("/replay rec.sse"),
            SessionCommand::Replay(PathBuf::from("rec.sse"))
        );
        assert!(matches!(parse_command("/nope"), SessionCommand::Invalid(_)));
    }
}
