//! Configuration Management
//!
//! Settings come from an optional JSON file, then environment variables.

use crate::error::{Error, Result};
use crate::gcp::operation::PollPolicy;
use crate::resource::gke::{DrainTaint, DEFAULT_TAINT_KEY, DEFAULT_TAINT_VALUE};
use crate::resource::Kind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the operation timeout and poll intervals, in seconds
pub const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Taint key applied to node pools before they are shrunk
    pub shutdown_taint_key: String,
    /// Taint value applied to node pools before they are shrunk
    pub shutdown_taint_value: String,
    /// Port for the push endpoint
    pub port: u16,
    /// Delay between operation re-fetches (GKE and Cloud SQL)
    pub poll_interval_secs: u64,
    /// Cap on the delay once backoff applies
    pub poll_max_interval_secs: u64,
    /// Growth factor for the delay; 1.0 keeps it fixed
    pub poll_backoff_multiplier: f64,
    /// Give up waiting on a single operation after this long
    pub operation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_taint_key: DEFAULT_TAINT_KEY.to_string(),
            shutdown_taint_value: DEFAULT_TAINT_VALUE.to_string(),
            port: 8080,
            poll_interval_secs: 5,
            poll_max_interval_secs: 5,
            poll_backoff_multiplier: 1.0,
            operation_timeout_secs: 480,
        }
    }
}

impl Config {
    /// Default config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcp-scheduler").join("config.json"))
    }

    /// Load from `path` (or the default path if it exists), then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Apply overrides from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("SHUTDOWN_TAINT_KEY").filter(|v| !v.is_empty()) {
            self.shutdown_taint_key = key;
        }
        if let Some(value) = lookup("SHUTDOWN_TAINT_VALUE").filter(|v| !v.is_empty()) {
            self.shutdown_taint_value = value;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", &port)?;
        }
        if let Some(secs) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_var("POLL_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("POLL_MAX_INTERVAL_SECS") {
            self.poll_max_interval_secs = parse_var("POLL_MAX_INTERVAL_SECS", &secs)?;
        }
        if let Some(multiplier) = lookup("POLL_BACKOFF_MULTIPLIER") {
            self.poll_backoff_multiplier = parse_var("POLL_BACKOFF_MULTIPLIER", &multiplier)?;
        }
        if let Some(secs) = lookup("OPERATION_TIMEOUT_SECS") {
            self.operation_timeout_secs = parse_var("OPERATION_TIMEOUT_SECS", &secs)?;
        }
        self.validate()
    }

    /// Reject polling settings the poller cannot turn into durations
    pub fn validate(&self) -> Result<()> {
        let multiplier = self.poll_backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config(format!(
                "poll backoff multiplier must be a finite number of at least 1.0, got {multiplier}"
            )));
        }

        for (name, secs) in [
            ("poll interval", self.poll_interval_secs),
            ("poll max interval", self.poll_max_interval_secs),
            ("operation timeout", self.operation_timeout_secs),
        ] {
            if secs > MAX_WAIT_SECS {
                return Err(Error::Config(format!(
                    "{name} of {secs}s exceeds the {MAX_WAIT_SECS}s maximum"
                )));
            }
        }

        if self.operation_timeout_secs == 0 {
            return Err(Error::Config("operation timeout must be at least 1s".to_string()));
        }
        Ok(())
    }

    pub fn drain_taint(&self) -> DrainTaint {
        DrainTaint {
            key: self.shutdown_taint_key.clone(),
            value: self.shutdown_taint_value.clone(),
        }
    }

    /// Polling policy for a resource kind. Compute re-fetches through the
    /// blocking `wait` endpoint, so it never sleeps between calls.
    pub fn poll_policy(&self, kind: Kind) -> PollPolicy {
        let timeout = Duration::from_secs(self.operation_timeout_secs);
        match kind {
            Kind::Compute => PollPolicy::immediate().with_timeout(timeout),
            Kind::Gke | Kind::Sql => PollPolicy::fixed(Duration::from_secs(self.poll_interval_secs))
                .with_backoff(
                    self.poll_backoff_multiplier,
                    Duration::from_secs(self.poll_max_interval_secs),
                )
                .with_timeout(timeout),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{name}={value:?}: {e}")))
}
