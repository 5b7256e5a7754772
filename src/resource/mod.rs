//! Resource kinds that can be started and stopped
//!
//! Each kind implements [`PowerTarget`]: it lists the resources a request
//! selects and runs the per-resource pipeline that moves one of them to the
//! requested state.
//!
//! # Architecture
//!
//! - [`fetcher`] - Paged and aggregated list queries
//! - [`labels`] - Label filter strings and client-side label matching
//! - [`compute`] - Compute Engine instances (start/stop calls)
//! - [`sql`] - Cloud SQL instances (activation policy patch)
//! - [`gke`] - GKE node pools (drain taint, then resize)

pub mod compute;
pub mod fetcher;
pub mod gke;
pub mod labels;
pub mod sql;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gcp::client::GcpClient;
use crate::payload::Request;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub use compute::{ComputeEngine, ComputeInstance};
pub use gke::{Cluster, DrainTaint, Gke, NodePool, Taint, TaintEffect};
pub use sql::{CloudSql, DatabaseInstance};

/// Resource family handled by one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Compute,
    Sql,
    Gke,
}

impl Kind {
    /// Noun used in log lines
    pub fn noun(self) -> &'static str {
        match self {
            Kind::Compute | Kind::Sql => "instance",
            Kind::Gke => "cluster",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Compute => f.write_str("compute"),
            Kind::Sql => f.write_str("sql"),
            Kind::Gke => f.write_str("gke"),
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compute" | "gce" => Ok(Kind::Compute),
            "sql" | "cloudsql" => Ok(Kind::Sql),
            "gke" | "container" => Ok(Kind::Gke),
            other => Err(Error::MalformedPayload(format!("unknown resource kind: {other}"))),
        }
    }
}

/// Requested operational state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
}

impl Action {
    /// Progressive verb for per-resource log lines
    pub fn verb(self) -> &'static str {
        match self {
            Action::Start => "Starting",
            Action::Stop => "Stopping",
        }
    }

    /// Past tense for summaries
    pub fn past(self) -> &'static str {
        match self {
            Action::Start => "started",
            Action::Stop => "stopped",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => f.write_str("start"),
            Action::Stop => f.write_str("stop"),
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            other => Err(Error::MalformedPayload(format!("unknown action: {other}"))),
        }
    }
}

/// A resource selected for a state change
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Instance(ComputeInstance),
    Cluster(Cluster),
    Database(DatabaseInstance),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Instance(i) => &i.name,
            Resource::Cluster(c) => &c.name,
            Resource::Database(d) => &d.name,
        }
    }

    /// Zone or region, as a short name
    pub fn location(&self) -> Option<String> {
        match self {
            Resource::Instance(i) => Some(i.zone_name()),
            Resource::Cluster(c) => Some(c.location.clone()),
            Resource::Database(d) => d.region.clone(),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Resource::Instance(_) => Kind::Compute,
            Resource::Cluster(_) => Kind::Gke,
            Resource::Database(_) => Kind::Sql,
        }
    }
}

/// One resource family's listing and state-change pipeline
#[async_trait]
pub trait PowerTarget: Send + Sync {
    fn kind(&self) -> Kind;

    /// Resources the request selects for `action`, already label-filtered
    async fn list(&self, request: &Request, action: Action) -> Result<Vec<Resource>>;

    /// Move one resource to the requested state and wait for the provider
    /// operations involved to finish
    async fn transition(&self, project: &str, resource: &Resource, action: Action) -> Result<()>;
}

/// Build the target for `kind` with the configured polling and taint settings
pub fn target_for(kind: Kind, client: GcpClient, config: &Config) -> Box<dyn PowerTarget> {
    let poll = config.poll_policy(kind);
    match kind {
        Kind::Compute => Box::new(ComputeEngine::new(client, poll)),
        Kind::Sql => Box::new(CloudSql::new(client, poll)),
        Kind::Gke => Box::new(Gke::new(client, poll, config.drain_taint())),
    }
}

pub(crate) fn mismatched(target: Kind, resource: &Resource) -> Error {
    Error::provider(format!(
        "{} target cannot act on {} resource {}",
        target,
        resource.kind(),
        resource.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_action_parse() {
        assert_eq!("compute".parse::<Kind>().unwrap(), Kind::Compute);
        assert_eq!("GKE".parse::<Kind>().unwrap(), Kind::Gke);
        assert_eq!("cloudsql".parse::<Kind>().unwrap(), Kind::Sql);
        assert!("dataproc".parse::<Kind>().is_err());

        assert_eq!("Stop".parse::<Action>().unwrap(), Action::Stop);
        assert!("restart".parse::<Action>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for kind in [Kind::Compute, Kind::Sql, Kind::Gke] {
            assert_eq!(kind.to_string().parse::<Kind>().unwrap(), kind);
        }
        for action in [Action::Start, Action::Stop] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
    }
}
