pub mod live_view;
pub mod repaint;
pub mod status;
pub mod text_metrics;

pub use live_view::{LiveView, RunObserver, SilentObserver};
pub use repaint::{Gutter, RenderLine, RenderedWindow, TerminalRepainter};
pub use status::StatusLine;
