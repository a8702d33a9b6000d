use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Root holding `trvStorage/` and `scheduleStorage/`.
    pub storage_dir: PathBuf,
    pub auth_username: String,
    pub auth_password: String,
    /// Activity checker tick in seconds. Always > 0.
    pub activity_interval_secs: u64,
    pub activity_checker_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let activity_interval_secs: u64 = optional(&var, "ACTIVITY_INTERVAL_SECS", "1")
            .parse()
            .context("ACTIVITY_INTERVAL_SECS must be a positive integer")?;
        if activity_interval_secs == 0 {
            bail!("ACTIVITY_INTERVAL_SECS must be a positive integer, got 0");
        }

        Ok(Self {
            server_host: optional(&var, "SERVER_HOST", "0.0.0.0"),
            server_port: optional(&var, "SERVER_PORT", "3002")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            storage_dir: optional(&var, "STORAGE_DIR", ".").into(),
            auth_username: required(&var, "AUTH_USERNAME")?,
            auth_password: required(&var, "AUTH_PASSWORD")?,
            activity_interval_secs,
            activity_checker_enabled: parse_bool(&optional(&var, "ACTIVITY_CHECKER_ENABLED", "true"))
                .context("ACTIVITY_CHECKER_ENABLED must be true or false")?,
        })
    }

    pub fn activity_interval(&self) -> Duration {
        Duration::from_secs(self.activity_interval_secs)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("not a boolean: {other:?}"),
    }
}

fn required(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_owned())
}
