use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::collections::VecDeque;
use std::time::Duration;

use crate::terminal::{stdin_is_terminal, RawModeGuard};

const DRAIN_LIMIT: usize = 1024;

/// Non-blocking "did the operator ask to stop?" check.
pub trait CancelSource: Send {
    /// True at most once per cancel key press. Never blocks.
    fn poll(&mut self) -> bool;
    /// Throw away keystrokes typed while nobody was polling.
    fn discard(&mut self);
}

/// Reads Esc / Ctrl-C from the controlling terminal via crossterm.
#[derive(Debug)]
pub struct KeyCancelSource {
    interactive: bool,
}

impl KeyCancelSource {
    pub fn new() -> Self {
        Self {
            interactive: stdin_is_terminal(),
        }
    }
}

impl Default for KeyCancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource for KeyCancelSource {
    fn poll(&mut self) -> bool {
        if !self.interactive {
            return false;
        }
        for _ in 0..DRAIN_LIMIT {
            match event::poll(Duration::ZERO) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if is_cancel_key(key.code, key.modifiers, key.kind) => {
                        return true;
                    }
                    Ok(_) => continue,
                    Err(_) => return false,
                },
                Ok(false) | Err(_) => return false,
            }
        }
        false
    }

    fn discard(&mut self) {
        if !self.interactive {
            return;
        }
        // Raw mode releases anything sitting in the line discipline buffer.
        let _raw = RawModeGuard::engage();
        for _ in 0..DRAIN_LIMIT {
            match event::poll(Duration::ZERO) {
                Ok(true) => {
                    if event::read().is_err() {
                        break;
                    }
                }
                Ok(false) | Err(_) => break,
            }
        }
    }
}

fn is_cancel_key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> bool {
    if kind == KeyEventKind::Release {
        return false;
    }
    match code {
        KeyCode::Esc => true,
        KeyCode::Char('c') | KeyCode::Char('C') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Replays a fixed script of poll answers; used for headless runs and tests.
#[derive(Debug, Default)]
pub struct ScriptedCancelSource {
    script: VecDeque<bool>,
    discarded: usize,
}

impl ScriptedCancelSource {
    pub fn never() -> Self {
        Self::default()
    }

    /// Report a cancel on the `nth` poll (0-based).
    pub fn cancel_on_poll(nth: usize) -> Self {
        let mut script: VecDeque<bool> = std::iter::repeat(false).take(nth).collect();
        script.push_back(true);
        Self {
            script,
            discarded: 0,
        }
    }

    /// Pretend a key was pressed before anyone started polling.
    pub fn with_stale_press() -> Self {
        Self {
            script: VecDeque::from([true]),
            discarded: 0,
        }
    }

    pub fn discard_count(&self) -> usize {
        self.discarded
    }
}

impl CancelSource for ScriptedCancelSource {
    fn poll(&mut self) -> bool {
        self.script.pop_front().unwrap_or(false)
    }

    fn discard(&mut self) {
        self.discarded += 1;
        self.script.clear();
    }
}
