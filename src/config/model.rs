// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file:
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 8990
///
/// [runner]
/// metrics_interval_secs = 5
/// kill_grace_secs = 5
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Control API bind settings from `[server]`.
    #[serde(default)]
    pub server: ServerSection,

    /// Process-runner tuning from `[runner]`.
    #[serde(default)]
    pub runner: RunnerSection,
}

/// Validated configuration. Constructed only through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub runner: RunnerSection,
}

impl ConfigFile {
    /// Internal constructor used by the validation layer.
    pub(crate) fn new_unchecked(server: ServerSection, runner: RunnerSection) -> Self {
        Self { server, runner }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            runner: RunnerSection::default(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// Interval between cpu/memory samples for a running process.
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Grace period between the configured stop signal and a forced KILL.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    5
}

fn default_kill_grace_secs() -> u64 {
    5
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            metrics_interval_secs: default_metrics_interval_secs(),
            kill_grace_secs: default_kill_grace_secs(),
        }
    }
}

impl RunnerSection {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}
