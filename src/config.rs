use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::events::DEFAULT_MAILBOX_CAPACITY;
use crate::orchestration::{ExecutorConfig, RetryPolicy, DEFAULT_STORE_TIMEOUT};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectsConfig {
    /// Maximum number of project stores kept open.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_capacity() -> usize {
    8
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GatesConfig {
    /// Seconds a human gate waits before the run pauses. Unset waits forever.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSection {
    #[serde(default)]
    pub finalize_on_complete: bool,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    pub prompt_dir: Option<String>,
    /// Where full retry context files are written. Unset writes none.
    pub retry_context_dir: Option<String>,
}

fn default_store_timeout_secs() -> u64 {
    DEFAULT_STORE_TIMEOUT.as_secs()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            finalize_on_complete: false,
            store_timeout_secs: default_store_timeout_secs(),
            prompt_dir: None,
            retry_context_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub executor: ExecutorSection,
}

impl Config {
    pub fn orc_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".orc"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::orc_dir()?.join("orc.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            retry_enabled = config.retry.enabled,
            max_retries = config.retry.max_retries,
            cache_capacity = config.projects.cache_capacity,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        Self::ensure_dirs()?;
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let orc_dir = Self::orc_dir()?;
        if !orc_dir.exists() {
            debug!(dir = %orc_dir.display(), "creating orc directory");
            fs::create_dir_all(&orc_dir)?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }

    pub fn gate_timeout(&self) -> Option<Duration> {
        self.gates.timeout_secs.map(Duration::from_secs)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            retry: self.retry_policy(),
            gate_timeout: self.gate_timeout(),
            finalize_on_complete: self.executor.finalize_on_complete,
            store_timeout: Duration::from_secs(self.executor.store_timeout_secs.max(1)),
            prompt_dir: self.executor.prompt_dir.as_deref().map(expand_tilde),
            retry_context_dir: self
                .executor
                .retry_context_dir
                .as_deref()
                .map(expand_tilde),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
