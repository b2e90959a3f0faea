pub mod approval;
pub mod config;
pub mod console;
pub mod keys;
pub mod logging;
pub mod preview;
pub mod process;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod tools;
pub mod types;
pub mod ui;
pub mod util;

#[cfg(test)]
pub mod test_support;
