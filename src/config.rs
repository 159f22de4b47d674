//! Configuration loading and defaults for the sophia shell.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::backend::Provider;
use crate::usage::LookbackWindow;

pub const DEFAULT_RUNTIME_URL: &str = "http://127.0.0.1:7878";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// === Types ===

/// Resolved shell configuration, including defaults and environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub runtime_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub default_provider: Option<String>,
    pub usage_window_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(flatten)]
    base: Config,
    profiles: Option<HashMap<String, Config>>,
}

// === Config Loading ===

impl Config {
    /// Load configuration from disk and merge with environment overrides.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// # use sophia_shell::config::Config;
    /// let config = Config::load(None, None)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: Option<PathBuf>, profile: Option<&str>) -> Result<Self> {
        let path = resolve_load_config_path(path);
        let mut config = match path.as_ref() {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let parsed: ConfigFile = toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                apply_profile(parsed, profile)?
            }
            _ if profile.is_some() => apply_profile(ConfigFile::default(), profile)?,
            _ => Config::default(),
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the shell cannot run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.runtime_url.as_deref() {
            let trimmed = url.trim();
            if trimmed.is_empty() {
                anyhow::bail!("runtime_url cannot be empty string");
            }
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                anyhow::bail!("Invalid runtime_url '{url}': expected an http:// or https:// URL.");
            }
        }
        if let Some(ms) = self.poll_interval_ms
            && !(1..=MAX_POLL_INTERVAL_MS).contains(&ms)
        {
            anyhow::bail!(
                "Invalid poll_interval_ms {ms}: expected 1 to {MAX_POLL_INTERVAL_MS} milliseconds."
            );
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        if let Some(provider) = self.default_provider.as_deref() {
            provider.parse::<Provider>()?;
        }
        if let Some(days) = self.usage_window_days {
            LookbackWindow::from_days(days)?;
        }
        Ok(())
    }

    /// Base URL of the local runtime service, without a trailing slash.
    #[must_use]
    pub fn runtime_url(&self) -> String {
        let base = self
            .runtime_url
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_RUNTIME_URL);
        base.trim_end_matches('/').to_string()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .clamp(1, MAX_POLL_INTERVAL_MS),
        )
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
        )
    }

    /// Provider selected when the settings panel opens.
    #[must_use]
    pub fn default_provider(&self) -> Provider {
        self.default_provider
            .as_deref()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn usage_window(&self) -> LookbackWindow {
        self.usage_window_days
            .and_then(|days| LookbackWindow::from_days(days).ok())
            .unwrap_or_default()
    }
}

// === Defaults ===

/// Directory holding the shell's config file, history and audit log.
///
/// `SOPHIA_HOME` overrides the default `~/.sophia`.
#[must_use]
pub fn sophia_home() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SOPHIA_HOME")
        && !path.trim().is_empty()
    {
        return Some(expand_path(path.trim()));
    }
    dirs::home_dir().map(|home| home.join(".sophia"))
}

fn home_config_path() -> Option<PathBuf> {
    sophia_home().map(|dir| dir.join("config.toml"))
}

fn env_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SOPHIA_CONFIG_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(expand_path(trimmed));
        }
    }
    None
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    if let Some(raw) = path.to_str() {
        return expand_path(raw);
    }
    path
}

fn resolve_load_config_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(expand_pathbuf(path));
    }

    if let Some(path) = env_config_path() {
        if path.exists() {
            return Some(path);
        }

        if let Some(home_path) = home_config_path()
            && home_path.exists()
        {
            return Some(home_path);
        }

        return Some(path);
    }

    home_config_path()
}

fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

// === Environment Overrides ===

fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var("SOPHIA_RUNTIME_URL")
        && !value.trim().is_empty()
    {
        config.runtime_url = Some(value);
    }
    if let Ok(value) = std::env::var("SOPHIA_POLL_INTERVAL_MS")
        && let Ok(parsed) = value.trim().parse::<u64>()
    {
        config.poll_interval_ms = Some(parsed);
    }
}

fn apply_profile(config: ConfigFile, profile: Option<&str>) -> Result<Config> {
    let Some(profile_name) = profile else {
        return Ok(config.base);
    };
    let profiles = config.profiles.as_ref();
    match profiles.and_then(|profiles| profiles.get(profile_name)) {
        Some(override_cfg) => Ok(merge_config(config.base, override_cfg.clone())),
        None => {
            let available = profiles
                .map(|profiles| {
                    let mut keys = profiles.keys().cloned().collect::<Vec<_>>();
                    keys.sort();
                    if keys.is_empty() {
                        "none".to_string()
                    } else {
                        keys.join(", ")
                    }
                })
                .unwrap_or_else(|| "none".to_string());
            anyhow::bail!("Profile '{profile_name}' not found. Available profiles: {available}")
        }
    }
}

fn merge_config(base: Config, override_cfg: Config) -> Config {
    Config {
        runtime_url: override_cfg.runtime_url.or(base.runtime_url),
        poll_interval_ms: override_cfg.poll_interval_ms.or(base.poll_interval_ms),
        request_timeout_secs: override_cfg
            .request_timeout_secs
            .or(base.request_timeout_secs),
        default_provider: override_cfg.default_provider.or(base.default_provider),
        usage_window_days: override_cfg.usage_window_days.or(base.usage_window_days),
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
