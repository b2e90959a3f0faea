use crossterm::style::Color;
use std::io::Write;

use super::repaint::{RenderLine, TerminalRepainter};
use super::status::StatusLine;
use crate::terminal::separator_line;

/// What the supervisor reports while a command is running.
pub trait RunObserver {
    fn started(&mut self, command: &str, pid: u32);
    fn tail(&mut self, lines: &[String]);
    fn finished(&mut self, status: &StatusLine);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {
    fn started(&mut self, _command: &str, _pid: u32) {}
    fn tail(&mut self, _lines: &[String]) {}
    fn finished(&mut self, _status: &StatusLine) {}
}

/// Header, repainted tail window, then a status line.
pub struct LiveView<W: Write> {
    out: W,
    repainter: TerminalRepainter,
}

impl<W: Write> LiveView<W> {
    pub fn new(out: W) -> Self {
        Self::with_repainter(out, TerminalRepainter::new())
    }

    pub fn with_repainter(out: W, repainter: TerminalRepainter) -> Self {
        Self { out, repainter }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, result: std::io::Result<usize>) {
        if let Err(err) = result {
            tracing::debug!(error = %err, "live view write failed");
        }
    }
}

impl<W: Write> RunObserver for LiveView<W> {
    fn started(&mut self, command: &str, pid: u32) {
        let rule = separator_line(self.repainter.width());
        let header = [
            RenderLine::plain(rule.clone()),
            RenderLine::plain(format!("Running... (pid {pid}, Esc to cancel)")).with_color(Color::Cyan),
            RenderLine::plain(format!("$ {command}")),
            RenderLine::plain(rule),
        ];
        let result = self.repainter.redraw(&mut self.out, &header);
        self.repainter.commit();
        self.emit(result);
    }

    fn tail(&mut self, lines: &[String]) {
        let window: Vec<RenderLine> = lines.iter().map(|l| RenderLine::plain(l.clone())).collect();
        let result = self.repainter.redraw(&mut self.out, &window);
        self.emit(result);
    }

    fn finished(&mut self, status: &StatusLine) {
        self.repainter.commit();
        let rule = separator_line(self.repainter.width());
        let footer = [RenderLine::plain(rule), status.to_render_line()];
        let result = self.repainter.redraw(&mut self.out, &footer);
        self.repainter.commit();
        self.emit(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RunOutcome;

    #[test]
    fn test_live_view_repaints_tail_in_place() {
        let mut view = LiveView::with_repainter(Vec::new(), TerminalRepainter::with_width(40));
        view.started("echo hi", 12);
        view.tail(&["a".to_string(), "b".to_string()]);
        view.tail(&["a".to_string(), "b".to_string(), "c".to_string()]);
        view.finished(&StatusLine::for_outcome(&RunOutcome::Completed {
            exit_code: Some(0),
            output: "a\nb\nc".to_string(),
        }));

        let text = String::from_utf8(view.into_inner()).expect("utf8");
        assert!(text.contains("$ echo hi"));
        assert!(text.contains("pid 12"));
        // Second tail draw erases exactly the two lines of the first.
        assert!(text.contains("\x1b[2A"));
        assert!(text.contains("[completed] exit code 0"));
    }

    #[test]
    fn test_tab_heavy_tail_erases_exactly_what_it_drew() {
        let mut view = LiveView::with_repainter(Vec::new(), TerminalRepainter::with_width(20));
        let tabbed = format!("{}end", "\t".repeat(12));
        view.tail(&[tabbed.clone(), tabbed]);
        view.tail(&["done".to_string()]);

        let text = String::from_utf8(view.into_inner()).expect("utf8");
        assert!(!text.contains('\t'));
        assert!(text.contains("\x1b[2A"));
    }
}
