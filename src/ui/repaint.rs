use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

use super::text_metrics::{sanitize_for_display, truncate_to_display_width};

/// Columns taken by a numbered or continuation gutter.
pub const GUTTER_WIDTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gutter {
    None,
    Number(usize),
    /// A wrapped piece of the logical line above it.
    Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderLine {
    pub gutter: Gutter,
    pub text: String,
    pub color: Option<Color>,
}

impl RenderLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            gutter: Gutter::None,
            text: text.into(),
            color: None,
        }
    }

    pub fn numbered(number: usize, text: impl Into<String>) -> Self {
        Self {
            gutter: Gutter::Number(number),
            text: text.into(),
            color: None,
        }
    }

    pub fn continuation(text: impl Into<String>) -> Self {
        Self {
            gutter: Gutter::Continuation,
            text: text.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    fn gutter_text(&self) -> String {
        match self.gutter {
            Gutter::None => String::new(),
            Gutter::Number(n) => format!("{n:>4}  "),
            Gutter::Continuation => format!("{:>4}  ", "."),
        }
    }
}

/// The block most recently printed by a [`TerminalRepainter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedWindow {
    pub lines: Vec<String>,
    pub count: usize,
}

/// Redraws a block of lines in place below the cursor.
///
/// Every line is cut to fit the terminal width so one entry occupies exactly
/// one physical row; that keeps `window.count` equal to the rows on screen.
#[derive(Debug)]
pub struct TerminalRepainter {
    width: usize,
    window: RenderedWindow,
}

impl TerminalRepainter {
    pub fn new() -> Self {
        Self::with_width(crate::terminal::terminal_width())
    }

    pub fn with_width(width: usize) -> Self {
        Self {
            width: width.max(1),
            window: RenderedWindow::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn window(&self) -> &RenderedWindow {
        &self.window
    }

    /// Erase the previous window and print `lines`. Returns the number of rows
    /// that were erased.
    pub fn redraw<W: Write>(&mut self, out: &mut W, lines: &[RenderLine]) -> io::Result<usize> {
        let erased = self.erase_queued(out)?;

        // Leave the last column free so terminals with eager autowrap
        // do not push the cursor onto an extra row.
        let usable = self.width.saturating_sub(1).max(1);
        let mut printed = Vec::with_capacity(lines.len());
        for line in lines {
            let gutter = line.gutter_text();
            let budget = usable.saturating_sub(gutter.len());
            let text = truncate_to_display_width(&sanitize_for_display(&line.text), budget);
            let rendered = format!("{gutter}{text}");

            match line.color {
                Some(color) => queue!(
                    out,
                    SetForegroundColor(color),
                    Print(&rendered),
                    ResetColor,
                    Print("\r\n")
                )?,
                None => queue!(out, Print(&rendered), Print("\r\n"))?,
            }
            printed.push(rendered);
        }
        out.flush()?;

        self.window = RenderedWindow {
            count: printed.len(),
            lines: printed,
        };
        Ok(erased)
    }

    /// Erase the current window without printing anything in its place.
    pub fn clear<W: Write>(&mut self, out: &mut W) -> io::Result<usize> {
        let erased = self.erase_queued(out)?;
        out.flush()?;
        self.window = RenderedWindow::default();
        Ok(erased)
    }

    /// Keep what is on screen and start the next draw below it.
    pub fn commit(&mut self) {
        self.window = RenderedWindow::default();
    }

    fn erase_queued<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let count = self.window.count;
        if count > 0 {
            let rows = u16::try_from(count).unwrap_or(u16::MAX);
            queue!(out, MoveUp(rows))?;
        }
        queue!(out, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
        Ok(count)
    }
}

impl Default for TerminalRepainter {
    fn default() -> Self {
        Self::new()
    }
}
