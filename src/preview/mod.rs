//! Live, line-numbered rendering of a file body while the tool call that
//! carries it is still streaming in.

pub mod extract;
pub mod monitor;
pub mod unescape;

use crossterm::style::Color;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::terminal::{separator_line, terminal_height, terminal_width};
use crate::ui::repaint::GUTTER_WIDTH;
use crate::ui::text_metrics::wrap_display_lines;
use crate::ui::{RenderLine, TerminalRepainter};

pub use extract::{FieldExtractor, FieldSnapshot};
pub use monitor::{CompletedToolCall, ToolStreamMonitor};

/// Argument holding the identifying name shown in the preview header.
pub const LABEL_FIELD: &str = "filename";

/// Which argument of `tool_name` is previewed, if the tool is monitored.
pub fn target_field(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "write_file" => Some("content"),
        "edit_file" => Some("replacement_text"),
        _ => None,
    }
}

/// Turn a field value into numbered rows no wider than `width` columns,
/// gutter included.
pub fn render_value_lines(value: &str, width: usize) -> Vec<RenderLine> {
    if value.is_empty() {
        return Vec::new();
    }
    let text_width = width.saturating_sub(GUTTER_WIDTH + 1).max(1);
    let mut lines = Vec::new();
    let mut previous = None;
    for (logical, segment) in wrap_display_lines(value, text_width) {
        if previous == Some(logical) {
            lines.push(RenderLine::continuation(segment));
        } else {
            lines.push(RenderLine::numbered(logical + 1, segment));
        }
        previous = Some(logical);
    }
    lines
}

struct ActivePreview {
    tool: String,
    extractor: FieldExtractor,
    header_shown: bool,
    was_complete: bool,
    last_draw: Option<Instant>,
    latest: Option<FieldSnapshot>,
}

pub struct StreamingArgumentPreview<W: Write> {
    out: W,
    repainter: TerminalRepainter,
    interval: Duration,
    max_rows: usize,
    active: Option<ActivePreview>,
    header: Option<String>,
    rendered: Vec<String>,
}

impl<W: Write> StreamingArgumentPreview<W> {
    pub fn new(out: W, interval: Duration) -> Self {
        let rows = terminal_height().saturating_sub(6).max(5);
        Self::with_size(out, interval, terminal_width(), rows)
    }

    pub fn with_size(out: W, interval: Duration, width: usize, max_rows: usize) -> Self {
        Self {
            out,
            repainter: TerminalRepainter::with_width(width),
            interval,
            max_rows: max_rows.max(1),
            active: None,
            header: None,
            rendered: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Header of the current or most recent preview.
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Rows of the most recent draw, gutters included.
    pub fn last_rendered_lines(&self) -> &[String] {
        &self.rendered
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Begin previewing a call to `tool_name`. Returns false for tools that
    /// are not monitored.
    pub fn start(&mut self, tool_name: &str) -> bool {
        let Some(field) = target_field(tool_name) else {
            return false;
        };
        if self.active.is_some() {
            self.cancel();
        }
        let extractor = match FieldExtractor::new(field, LABEL_FIELD) {
            Ok(extractor) => extractor,
            Err(err) => {
                tracing::warn!(error = %err, tool = tool_name, "preview extractor unavailable");
                return false;
            }
        };
        self.header = None;
        self.rendered.clear();
        self.active = Some(ActivePreview {
            tool: tool_name.to_string(),
            extractor,
            header_shown: false,
            was_complete: false,
            last_draw: None,
            latest: None,
        });
        true
    }

    pub fn feed(&mut self, fragment: &str) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(snapshot) = active.extractor.feed(fragment) else {
            return;
        };

        let just_completed = snapshot.complete && !active.was_complete;
        active.was_complete = snapshot.complete;
        active.latest = Some(snapshot);

        if !active.header_shown {
            let Some(label) = active.latest.as_ref().and_then(|s| s.label.clone()) else {
                return;
            };
            active.header_shown = true;
            let header = format!("{}: {label}", active.tool);
            self.print_header(&header);
            self.header = Some(header);
        }

        let due = self
            .active
            .as_ref()
            .map(|a| a.last_draw.map_or(true, |t| t.elapsed() >= self.interval))
            .unwrap_or(false);
        if just_completed || due {
            self.draw();
        }
    }

    /// The call's arguments are complete: draw the final state and close the
    /// block.
    pub fn finish(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.header_shown {
            self.draw();
            let rule = separator_line(self.repainter.width());
            self.repainter.commit();
            let result = self.repainter.redraw(&mut self.out, &[RenderLine::plain(rule)]);
            self.report(result);
        }
        self.repainter.commit();
        self.active = None;
    }

    /// Abandon the preview, leaving whatever is on screen.
    pub fn cancel(&mut self) {
        if self.active.take().is_some() {
            self.repainter.commit();
            tracing::debug!("streaming preview cancelled");
        }
    }

    fn print_header(&mut self, header: &str) {
        let rule = separator_line(self.repainter.width());
        let lines = [
            RenderLine::plain(rule.clone()),
            RenderLine::plain(header.to_string()).with_color(Color::Cyan),
            RenderLine::plain(rule),
        ];
        self.repainter.commit();
        let result = self.repainter.redraw(&mut self.out, &lines);
        self.repainter.commit();
        self.report(result);
    }

    fn draw(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.last_draw = Some(Instant::now());
        let value = active
            .latest
            .as_ref()
            .map(FieldSnapshot::value)
            .unwrap_or_default();

        let mut lines = render_value_lines(&value, self.repainter.width());
        if lines.len() > self.max_rows {
            let hidden = lines.len() - self.max_rows + 1;
            lines.drain(..hidden);
            lines.insert(
                0,
                RenderLine::plain(format!("      ... {hidden} rows above")).with_color(Color::DarkGrey),
            );
        }
        let result = self.repainter.redraw(&mut self.out, &lines);
        self.rendered = self.repainter.window().lines.clone();
        self.report(result);
    }

    fn report(&self, result: std::io::Result<usize>) {
        if let Err(err) = result {
            tracing::debug!(error = %err, "preview write failed");
        }
    }
}
