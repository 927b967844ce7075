//! Config Module
//!
//! JSON configuration for a keep, plus lookup of the config file in the
//! usual places: an explicit path, then `$KEEP_CONFIG`, then
//! `~/.keep/config.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{KeepError, Result};

pub const CONFIG_ENV_VAR: &str = "KEEP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "~/.keep/config.json";

fn default_name() -> String {
    "keep".to_string()
}

fn default_leak_grace_ms() -> u64 {
    1000
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepConfig {
    /// Attached to the run span so several keeps in one process can be told apart
    #[serde(default = "default_name")]
    pub name: String,
    /// How long `assert_clean` lets in-flight work settle before inspecting
    #[serde(default = "default_leak_grace_ms")]
    pub leak_grace_ms: u64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for KeepConfig {
    fn default() -> Self {
        KeepConfig {
            name: default_name(),
            leak_grace_ms: default_leak_grace_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl KeepConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KeepError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: KeepConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded keep config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(KeepError::Config("name must not be empty".to_string()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(KeepError::Config("log_filter must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn leak_grace(&self) -> Duration {
        Duration::from_millis(self.leak_grace_ms)
    }
}

/// Replace a leading `~` with `home` and expand `$VAR` / `${VAR}` references.
///
/// Unknown variables expand to the empty string.
pub fn expand_user(path: &str) -> String {
    let home = std::env::var("HOME").unwrap_or_default();
    expand_with(path, &home, |name| std::env::var(name).ok())
}

fn expand_with(path: &str, home: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let path = match path.strip_prefix('~') {
        Some(rest) => format!("{}{}", home, rest),
        None => path.to_string(),
    };

    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if braced && chars.peek() == Some(&'}') {
            chars.next();
        }
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&lookup(&name).unwrap_or_default());
        }
    }
    out
}

/// Locate the config file: `explicit`, then `$KEEP_CONFIG`, then the default
/// location. `None` when none of them exists.
pub fn config_file(explicit: Option<&str>) -> Option<PathBuf> {
    let env = std::env::var(CONFIG_ENV_VAR).ok();
    resolve_config_file(explicit, env.as_deref(), expand_user)
}

fn resolve_config_file(
    explicit: Option<&str>,
    env: Option<&str>,
    expand: impl Fn(&str) -> String,
) -> Option<PathBuf> {
    [explicit, env, Some(DEFAULT_CONFIG_PATH)]
        .into_iter()
        .flatten()
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| PathBuf::from(expand(candidate)))
        .find(|path| path.exists())
}
