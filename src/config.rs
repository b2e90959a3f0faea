use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::util::{non_empty_trimmed, parse_bool_str};

const WORKDIR_ENV: &str = "VEXRUN_WORKDIR";
const LOG_DIR_ENV: &str = "VEXRUN_LOG_DIR";
const FOREGROUND_SECS_ENV: &str = "VEXRUN_FOREGROUND_SECS";
const TAIL_LINES_ENV: &str = "VEXRUN_TAIL_LINES";
const LOG_MODE_ENV: &str = "VEXRUN_LOG_MODE";
const AUTO_APPROVE_ENV: &str = "VEXRUN_AUTO_APPROVE";
const PREVIEW_INTERVAL_ENV: &str = "VEXRUN_PREVIEW_INTERVAL_MS";

pub const DEFAULT_FOREGROUND_BUDGET: Duration = Duration::from_secs(10);
pub const DEFAULT_TAIL_LINES: usize = 10;
pub const DEFAULT_PREVIEW_INTERVAL: Duration = Duration::from_millis(100);
const MAX_FOREGROUND_BUDGET: Duration = Duration::from_secs(600);

/// How log artifacts are named and when they are reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogMode {
    /// Foreground-only runs sharing one reused `latest.log` slot.
    Latest,
    /// One uniquely named artifact per run; runs may detach to the background.
    PerInvocation,
}

impl FromStr for LogMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "per-invocation" | "per_invocation" | "unique" => Ok(Self::PerInvocation),
            other => bail!(
                "Invalid {LOG_MODE_ENV} '{other}': expected 'latest' or 'per-invocation'"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub working_dir: PathBuf,
    pub log_dir: PathBuf,
    pub foreground_budget: Duration,
    pub tail_lines: usize,
    pub log_mode: LogMode,
    pub auto_approve: bool,
    pub preview_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let working_dir = match env_value(WORKDIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };
        let log_dir = env_value(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        let foreground_budget = match env_value(FOREGROUND_SECS_ENV) {
            Some(raw) => {
                let secs: f64 = raw
                    .parse()
                    .with_context(|| format!("Invalid {FOREGROUND_SECS_ENV} '{raw}'"))?;
                if !secs.is_finite() || secs <= 0.0 {
                    bail!("Invalid {FOREGROUND_SECS_ENV} '{raw}': expected a positive number");
                }
                Duration::from_secs_f64(secs)
            }
            None => DEFAULT_FOREGROUND_BUDGET,
        };

        let tail_lines = match env_value(TAIL_LINES_ENV) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid {TAIL_LINES_ENV} '{raw}'"))?,
            None => DEFAULT_TAIL_LINES,
        };

        let log_mode = match env_value(LOG_MODE_ENV) {
            Some(raw) => raw.parse()?,
            None => LogMode::PerInvocation,
        };

        let auto_approve = match env_value(AUTO_APPROVE_ENV) {
            Some(raw) => parse_bool_str(&raw)
                .with_context(|| format!("Invalid {AUTO_APPROVE_ENV} '{raw}'"))?,
            None => false,
        };

        let preview_interval = match env_value(PREVIEW_INTERVAL_ENV) {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("Invalid {PREVIEW_INTERVAL_ENV} '{raw}'"))?,
            ),
            None => DEFAULT_PREVIEW_INTERVAL,
        };

        Ok(Self {
            working_dir,
            log_dir,
            foreground_budget,
            tail_lines,
            log_mode,
            auto_approve,
            preview_interval,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.working_dir.is_dir() {
            bail!(
                "Working directory '{}' does not exist or is not a directory",
                self.working_dir.display()
            );
        }

        if self.foreground_budget.is_zero() || self.foreground_budget > MAX_FOREGROUND_BUDGET {
            bail!(
                "Foreground budget must be between 0 and {} seconds (got {:.1}s)",
                MAX_FOREGROUND_BUDGET.as_secs(),
                self.foreground_budget.as_secs_f64()
            );
        }

        if !(1..=200).contains(&self.tail_lines) {
            bail!(
                "{TAIL_LINES_ENV} must be between 1 and 200 (got {})",
                self.tail_lines
            );
        }

        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|value| non_empty_trimmed(&value).map(str::to_string))
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("vexrun").join("temp_logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for name in [
            WORKDIR_ENV,
            LOG_DIR_ENV,
            FOREGROUND_SECS_ENV,
            TAIL_LINES_ENV,
            LOG_MODE_ENV,
            AUTO_APPROVE_ENV,
            PREVIEW_INTERVAL_ENV,
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_load_uses_defaults() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();

        let config = Config::load().expect("load defaults");
        assert_eq!(config.foreground_budget, DEFAULT_FOREGROUND_BUDGET);
        assert_eq!(config.tail_lines, DEFAULT_TAIL_LINES);
        assert_eq!(config.log_mode, LogMode::PerInvocation);
        assert!(!config.auto_approve);
        assert!(config.log_dir.ends_with("temp_logs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reads_overrides() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var(FOREGROUND_SECS_ENV, "2.5");
        std::env::set_var(LOG_MODE_ENV, "latest");
        std::env::set_var(AUTO_APPROVE_ENV, "on");
        std::env::set_var(TAIL_LINES_ENV, "20");

        let config = Config::load().expect("load overrides");
        assert_eq!(config.foreground_budget, Duration::from_millis(2500));
        assert_eq!(config.log_mode, LogMode::Latest);
        assert!(config.auto_approve);
        assert_eq!(config.tail_lines, 20);
        clear_env();
    }

    #[test]
    fn test_load_rejects_bad_budget() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var(FOREGROUND_SECS_ENV, "-1");
        let err = Config::load().expect_err("negative budget");
        assert!(err.to_string().contains(FOREGROUND_SECS_ENV));
        clear_env();
    }

    #[test]
    fn test_validate_rejects_tail_lines_out_of_range() {
        let config = Config {
            working_dir: std::env::current_dir().expect("cwd"),
            log_dir: std::env::temp_dir(),
            foreground_budget: DEFAULT_FOREGROUND_BUDGET,
            tail_lines: 0,
            log_mode: LogMode::PerInvocation,
            auto_approve: false,
            preview_interval: DEFAULT_PREVIEW_INTERVAL,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_mode_parse() {
        assert_eq!("Latest".parse::<LogMode>().unwrap(), LogMode::Latest);
        assert_eq!(
            "per-invocation".parse::<LogMode>().unwrap(),
            LogMode::PerInvocation
        );
        assert!("sometimes".parse::<LogMode>().is_err());
    }
}
