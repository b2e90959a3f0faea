use crossterm::{
    cursor::Show,
    execute,
    terminal::{self, disable_raw_mode, enable_raw_mode},
};
use std::io::{self, IsTerminal};
use std::sync::Once;

/// Width used when the terminal size cannot be queried (pipes, CI).
pub const FALLBACK_WIDTH: usize = 80;
pub const FALLBACK_HEIGHT: usize = 24;

static PANIC_HOOK_INSTALLED: Once = Once::new();

pub fn install_panic_hook_once() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            restore();
            original_hook(panic_info);
        }));
    });
}

pub fn restore() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), Show);
}

pub fn terminal_width() -> usize {
    match terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => FALLBACK_WIDTH,
    }
}

pub fn terminal_height() -> usize {
    match terminal::size() {
        Ok((_, rows)) if rows > 0 => rows as usize,
        _ => FALLBACK_HEIGHT,
    }
}

pub fn separator_line(width: usize) -> String {
    "-".repeat(width.clamp(10, 120))
}

pub fn stdin_is_terminal() -> bool {
    io::stdin().is_terminal()
}

/// Holds the terminal in raw mode so single key presses arrive without Enter.
///
/// Raw mode is only engaged when stdin is a terminal; the guard is inert
/// otherwise. While it is held, views must terminate lines with `\r\n`.
pub struct RawModeGuard {
    engaged: bool,
}

impl RawModeGuard {
    pub fn engage() -> Self {
        if !stdin_is_terminal() {
            return Self { engaged: false };
        }
        install_panic_hook_once();
        let engaged = enable_raw_mode().is_ok();
        Self { engaged }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.engaged {
            let _ = disable_raw_mode();
        }
    }
}
