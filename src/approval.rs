use std::sync::atomic::{AtomicBool, Ordering};

use crate::console::SharedConsole;
use crate::terminal::{separator_line, terminal_width};

/// Human confirmation before anything mutating happens.
///
/// Holding the console lock for the whole prompt keeps concurrent requests
/// from interleaving.
pub struct ApprovalGate {
    auto_approve: AtomicBool,
    console: SharedConsole,
}

impl ApprovalGate {
    pub fn new(console: SharedConsole, auto_approve: bool) -> Self {
        Self {
            auto_approve: AtomicBool::new(auto_approve),
            console,
        }
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve.load(Ordering::SeqCst)
    }

    pub fn set_auto_approve(&self, enabled: bool) {
        self.auto_approve.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "auto-approve changed");
    }

    pub async fn request(&self, description: &str) -> bool {
        let mut console = self.console.lock().await;

        if self.auto_approve() {
            console.write_line(&format!("[auto-approved] {}", first_line(description)));
            return true;
        }

        let rule = separator_line(terminal_width());
        console.write_line("");
        console.write_line(&rule);
        console.write_line("Approval required:");
        console.write_line(description);
        console.write_line(&rule);

        let approved = match console.prompt("Proceed? (y/n): ").await {
            Ok(Some(answer)) => is_affirmative(&answer),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(error = %err, "approval prompt read failed");
                false
            }
        };
        console.write_line(if approved { "approved" } else { "denied" });
        tracing::info!(approved, "approval decision");
        approved
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{CaptureBuffer, Console};
    use std::sync::Arc;

    fn gate(input: &'static [u8], auto: bool) -> (ApprovalGate, CaptureBuffer) {
        let capture = CaptureBuffer::new();
        let console = Console::new(input, capture.clone()).shared();
        (ApprovalGate::new(console, auto), capture)
    }

    #[tokio::test]
    async fn test_yes_approves() {
        let (gate, out) = gate(b"y\n", false);
        assert!(gate.request("write_file a.txt").await);
        assert!(out.contents().contains("write_file a.txt"));
    }

    #[tokio::test]
    async fn test_anything_else_denies() {
        let (gate, _) = gate(b"n\nmaybe\n", false);
        assert!(!gate.request("first").await);
        assert!(!gate.request("second").await);
        // EOF
        assert!(!gate.request("third").await);
    }

    #[tokio::test]
    async fn test_auto_approve_skips_read() {
        let (gate, out) = gate(b"", true);
        assert!(gate.request("run_terminal_command\nls").await);
        assert!(out.contents().contains("[auto-approved] run_terminal_command"));
        assert!(!out.contents().contains("Proceed?"));

        gate.set_auto_approve(false);
        assert!(!gate.request("again").await);
    }

    #[tokio::test]
    async fn test_concurrent_prompts_do_not_interleave() {
        let (gate, out) = gate(b"y\nn\n", false);
        let gate = Arc::new(gate);
        let (a, b) = tokio::join!(gate.request("alpha"), gate.request("beta"));
        assert_ne!(a, b);

        let text = out.contents();
        let alpha = text.find("alpha").expect("alpha shown");
        let beta = text.find("beta").expect("beta shown");
        let (first, second) = if alpha < beta { (alpha, beta) } else { (beta, alpha) };
        let between = &text[first..second];
        assert_eq!(between.matches("Proceed?").count(), 1);
    }
}
