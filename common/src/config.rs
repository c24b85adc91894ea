//! # Run Configuration
//!
//! One [`Config`] is built from the command line before any work starts and
//! is read-only afterwards. Mutable per-target bookkeeping lives in the
//! scheduler's scan state, never here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONCURRENT_TARGETS: usize = 5;
pub const DEFAULT_CONCURRENT_SCANS: usize = 10;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be at least 1 (got {value})")]
    InvalidConcurrency { name: &'static str, value: usize },
    #[error("no valid targets were provided")]
    NoTargets,
    #[error("unknown profile '{0}', expected 'default' or 'full'")]
    UnknownProfile(String),
    #[error("unknown module '{0}', expected 'netscan' or 'osint'")]
    UnknownModule(String),
}

/// The two scan trees sharing the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanModule {
    /// Port scans first, then service scans for every new service.
    Netscan,
    /// Name discovery first, then subdomain and network-block lookups.
    Osint,
}

impl ScanModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanModule::Netscan => "netscan",
            ScanModule::Osint => "osint",
        }
    }

    pub fn default_output_dir(&self) -> &'static str {
        match self {
            ScanModule::Netscan => "recon",
            ScanModule::Osint => "osint",
        }
    }
}

impl fmt::Display for ScanModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanModule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netscan" => Ok(ScanModule::Netscan),
            "osint" => Ok(ScanModule::Osint),
            _ => Err(ConfigError::UnknownModule(s.to_string())),
        }
    }
}

/// Port scanning intensity used to pick the netscan seed plugins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Top 1000 ports.
    #[default]
    Default,
    /// All 65535 ports.
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Full => "full",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Profile::Default),
            "full" => Ok(Profile::Full),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory; every target gets its own subdirectory below it.
    pub output_dir: PathBuf,
    /// Size of the outer worker pool. One target per worker.
    pub concurrent_targets: usize,
    /// Maximum number of external commands running at once inside one target.
    pub concurrent_scans: usize,
    pub profile: Profile,
    /// Seeds only the plugins whose name contains this text.
    pub plugin_filter: Option<String>,
    /// Stops after the seed phase: no service or subdomain fan-out.
    pub only_recon: bool,
    /// Only creates `scans/` and `logs/` below each target directory.
    pub only_scans_dir: bool,
    pub verbose: u8,
    /// Time a terminated command gets before it is killed.
    pub grace_period: Duration,
    /// Disables the 'q' keypress listener.
    pub disable_input: bool,
    /// Loads `plugins.toml` and `patterns.toml` from here instead of the built-in catalogs.
    pub catalog_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(ScanModule::Netscan.default_output_dir()),
            concurrent_targets: DEFAULT_CONCURRENT_TARGETS,
            concurrent_scans: DEFAULT_CONCURRENT_SCANS,
            profile: Profile::Default,
            plugin_filter: None,
            only_recon: false,
            only_scans_dir: false,
            verbose: 0,
            grace_period: DEFAULT_GRACE_PERIOD,
            disable_input: false,
            catalog_dir: None,
        }
    }
}

impl Config {
    /// Rejects values that would make a run impossible. Called once, before
    /// any target is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_targets == 0 {
            return Err(ConfigError::InvalidConcurrency {
                name: "concurrent targets",
                value: self.concurrent_targets,
            });
        }
        if self.concurrent_scans == 0 {
            return Err(ConfigError::InvalidConcurrency {
                name: "concurrent scans",
                value: self.concurrent_scans,
            });
        }
        Ok(())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
