use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mirror_console::{DEFAULT_COOLDOWN, DEFAULT_EXTERNAL_BASE, DEFAULT_POLL_INTERVAL};
use serde::Deserialize;
use tracing::warn;

pub const API_URL_ENV: &str = "MIRRORCTL_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub api: ApiSection,
    pub session: SessionSection,
    pub poll: PollSection,
    pub dispatch: DispatchSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSection {
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub cooldown_ms: u64,
    pub download_dir: PathBuf,
    pub external_base: String,
    /// Base of the public share links; the API base when unset.
    pub share_base: Option<String>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            sqlite_path: "data/session.db".to_string(),
        }
    }
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            download_dir: PathBuf::from("downloads"),
            external_base: DEFAULT_EXTERNAL_BASE.to_string(),
            share_base: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(source) => toml::from_str(&source)
                .with_context(|| format!("invalid config TOML at {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found; using defaults");
                Self::default()
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file {}", path.display()))
            }
        };
        config.apply_env(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            self.api.base_url = url;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.dispatch.cooldown_ms)
    }

    pub fn share_base(&self) -> &str {
        self.dispatch
            .share_base
            .as_deref()
            .unwrap_or(&self.api.base_url)
    }
}
