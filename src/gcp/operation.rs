//! Long-running operations
//!
//! Every state change in the Compute, GKE and Cloud SQL APIs returns an
//! operation handle. [`await_completion`] re-fetches the handle until its
//! status is `DONE` or the [`PollPolicy`] deadline passes.

use super::client::extract_short_name;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Operation status as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum OperationStatus {
    #[default]
    Pending,
    Running,
    Done,
    Aborting,
    Other(String),
}

impl From<String> for OperationStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "DONE" => Self::Done,
            "ABORTING" => Self::Aborting,
            _ => Self::Other(value),
        }
    }
}

impl From<OperationStatus> for String {
    fn from(value: OperationStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Running => f.write_str("RUNNING"),
            Self::Done => f.write_str("DONE"),
            Self::Aborting => f.write_str("ABORTING"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Operation handle, common to the Compute, GKE and Cloud SQL APIs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: OperationStatus,
    /// Zone URL (Compute) or zone name (GKE, deprecated there)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Zone or region name (GKE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Location embedded in the handle, as a short name
    pub fn location(&self) -> Option<String> {
        self.location
            .as_deref()
            .filter(|l| !l.is_empty())
            .or(self.zone.as_deref().filter(|z| !z.is_empty()))
            .map(extract_short_name)
    }

    /// Error text carried by a finished operation, if it failed.
    ///
    /// Compute and Cloud SQL report `{"errors": [{"message": ..}]}`, GKE
    /// reports a bare `{"message": ..}`.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        if error.is_null() {
            return None;
        }

        let messages: Vec<String> = match error.get("errors").and_then(|e| e.as_array()) {
            Some(errors) => errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .map(|m| m.to_string())
                .collect(),
            None => error
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| vec![m.to_string()])
                .unwrap_or_default(),
        };

        if messages.is_empty() {
            Some(error.to_string())
        } else {
            Some(messages.join("; "))
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::provider(format!("unexpected operation payload: {e}")))
    }
}

/// How often and how long to re-fetch an operation
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first re-fetch
    pub interval: Duration,
    /// Upper bound for the delay after backoff
    pub max_interval: Duration,
    /// Growth factor applied to the delay after each re-fetch
    pub multiplier: f64,
    /// Total wait before giving up with `OperationTimeout`
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl PollPolicy {
    /// Fixed interval, default timeout
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1.0,
            timeout: Duration::from_secs(480),
        }
    }

    /// No sleep between re-fetches, for endpoints that block server-side
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// Re-fetches an operation handle from the API that issued it
#[async_trait]
pub trait OperationSource: Send + Sync {
    async fn refresh(&self, project: &str, operation: &Operation) -> Result<Operation>;
}

/// Block until `operation` is `DONE`.
///
/// Every status other than `DONE` is re-polled. A `DONE` operation that
/// carries an error payload fails with `ProviderCallFailure`.
pub async fn await_completion<S>(
    source: &S,
    project: &str,
    mut operation: Operation,
    policy: &PollPolicy,
) -> Result<Operation>
where
    S: OperationSource + ?Sized,
{
    let started = Instant::now();
    let deadline = started.checked_add(policy.timeout).ok_or_else(|| {
        Error::Config(format!(
            "operation timeout {:?} is too large to wait on {}",
            policy.timeout, operation.name
        ))
    })?;
    let mut interval = policy.interval;

    while !operation.is_done() {
        if !interval.is_zero() {
            let wake = Instant::now()
                .checked_add(interval)
                .map_or(deadline, |wake| wake.min(deadline));
            tokio::time::sleep_until(wake).await;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::OperationTimeout {
                operation: operation.name,
                waited: started.elapsed(),
            });
        }

        let refreshed = tokio::time::timeout(remaining, source.refresh(project, &operation)).await;
        operation = match refreshed {
            Ok(refreshed) => refreshed?,
            Err(_) => {
                return Err(Error::OperationTimeout {
                    operation: operation.name,
                    waited: started.elapsed(),
                })
            },
        };
        tracing::debug!("Operation {} is {}", operation.name, operation.status);

        interval = policy.next_interval(interval);
    }

    if let Some(message) = operation.error_message() {
        return Err(Error::provider(format!(
            "operation {} failed: {}",
            operation.name, message
        )));
    }

    Ok(operation)
}
