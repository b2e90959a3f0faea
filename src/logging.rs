use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILTER_ENV: &str = "VEXRUN_LOG";
const LOG_PATH_ENV: &str = "VEXRUN_LOG_PATH";
const DEFAULT_FILTER: &str = "info";
const SESSION_LOG_NAME: &str = "session.txt";

/// Install the process-wide tracing subscriber.
///
/// Diagnostics go to a file so they never interleave with the live command
/// view. If the file cannot be opened, logging is switched off entirely.
pub fn init(log_dir: &Path) {
    let path = resolve_log_path(log_dir);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            let _ = tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(resolve_filter())
                .try_init();
        }
        Err(_) => {
            let _ = tracing_subscriber::registry()
                .with(LevelFilter::OFF)
                .try_init();
        }
    }
}

fn resolve_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn resolve_log_path(log_dir: &Path) -> PathBuf {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| log_dir.join(SESSION_LOG_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScopedEnv, ENV_LOCK};

    #[test]
    fn test_resolve_log_path_prefers_env() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let _path = ScopedEnv::set(LOG_PATH_ENV, "/tmp/vexrun-custom.log");
        assert_eq!(
            resolve_log_path(Path::new("/unused")),
            PathBuf::from("/tmp/vexrun-custom.log")
        );
    }

    #[test]
    fn test_resolve_log_path_defaults_into_log_dir() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let _path = ScopedEnv::set(LOG_PATH_ENV, "   ");
        assert_eq!(
            resolve_log_path(Path::new("/var/tmp/logs")),
            PathBuf::from("/var/tmp/logs/session.txt")
        );
    }
}
