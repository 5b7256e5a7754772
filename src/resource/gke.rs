//! GKE node pools
//!
//! A cluster is stopped by draining and shrinking every node pool to zero
//! nodes and started by growing them back to one. Pools are handled one at a
//! time. For each pool the drain taint update must reach `DONE` before the
//! resize is issued:
//!
//! ```text
//! stop:  Running --taint--> Tainted --resize 0--> Stopped
//! start: Stopped --untaint--> Untainted --resize 1--> Running
//! ```
//!
//! Taints are replaced as a whole set on every update.

use super::labels::filter_by_labels;
use super::{mismatched, Action, Kind, PowerTarget, Resource};
use crate::error::{Error, Result};
use crate::gcp::client::GcpClient;
use crate::gcp::operation::{await_completion, Operation, OperationSource, PollPolicy};
use crate::payload::Request;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

pub const DEFAULT_TAINT_KEY: &str = "scheduled-shutdown";
pub const DEFAULT_TAINT_VALUE: &str = "true";

/// A GKE cluster and its node pools
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub config: NodeConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default)]
    pub resource_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub image_type: Option<String>,
}

/// Kubernetes node taint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub effect: TaintEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaintEffect {
    #[default]
    EffectUnspecified,
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

/// Drain taint key and value; the effect is always `NO_EXECUTE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainTaint {
    pub key: String,
    pub value: String,
}

impl Default for DrainTaint {
    fn default() -> Self {
        Self {
            key: DEFAULT_TAINT_KEY.to_string(),
            value: DEFAULT_TAINT_VALUE.to_string(),
        }
    }
}

impl DrainTaint {
    pub fn taint(&self) -> Taint {
        Taint {
            key: self.key.clone(),
            value: self.value.clone(),
            effect: TaintEffect::NoExecute,
        }
    }
}

/// Taint set with `taint` added, replacing any taint with the same key
pub fn with_taint(taints: &[Taint], taint: Taint) -> Vec<Taint> {
    let mut updated = without_taint(taints, &taint.key);
    updated.push(taint);
    updated
}

/// Taint set with every taint keyed `key` removed
pub fn without_taint(taints: &[Taint], key: &str) -> Vec<Taint> {
    taints.iter().filter(|t| t.key != key).cloned().collect()
}

/// GKE start/stop by drain taint and resize
pub struct Gke {
    client: GcpClient,
    poll: PollPolicy,
    drain: DrainTaint,
}

impl Gke {
    pub fn new(client: GcpClient, poll: PollPolicy, drain: DrainTaint) -> Self {
        Self { client, poll, drain }
    }

    /// List clusters in the given locations, or in all of them when none are
    /// given, keeping only node pools that carry the requested labels
    pub async fn list_clusters(
        &self,
        project: &str,
        locations: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Cluster>> {
        let mut clusters = Vec::new();

        if locations.is_empty() {
            let found = self.list_in(project, "-").await?;
            tracing::info!("Found {} cluster(s) in all zones and regions", found.len());
            clusters.extend(found);
        } else {
            for location in locations {
                let found = self.list_in(project, location).await?;
                tracing::info!("Found {} cluster(s) in zone {}", found.len(), location);
                clusters.extend(found);
            }
        }

        let total = clusters.len();
        let clusters = filter_by_labels(clusters, labels);
        if clusters.len() != total {
            tracing::info!("{} of {} cluster(s) have matching node pools", clusters.len(), total);
        }
        Ok(clusters)
    }

    async fn list_in(&self, project: &str, location: &str) -> Result<Vec<Cluster>> {
        let url = self.client.container_location_url(project, location, "clusters");
        let response = self.client.get(&url).await?;
        match response.get("clusters") {
            Some(clusters) => serde_json::from_value(clusters.clone())
                .map_err(|e| Error::provider(format!("unexpected cluster payload: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn pool_url(&self, project: &str, cluster: &Cluster, pool: &NodePool) -> String {
        self.client.container_location_url(
            project,
            &cluster.location,
            &format!("clusters/{}/nodePools/{}", cluster.name, pool.name),
        )
    }

    /// Replace the pool's taint set; does not wait
    pub async fn set_taints(
        &self,
        project: &str,
        cluster: &Cluster,
        pool: &NodePool,
        taints: &[Taint],
    ) -> Result<Operation> {
        // "-" would upgrade the pool to the control plane version
        let version = pool
            .version
            .as_deref()
            .filter(|v| !v.is_empty() && *v != "-")
            .ok_or_else(|| {
                Error::provider(format!(
                    "no node version reported in cluster {}; refusing to update taints",
                    cluster.name
                ))
            })?;

        let mut body = json!({
            "nodeVersion": version,
            "taints": { "taints": taints },
        });
        if let Some(image_type) = &pool.config.image_type {
            body["imageType"] = json!(image_type);
        }

        let url = self.pool_url(project, cluster, pool);
        Operation::from_value(self.client.put(&url, &body).await?)
    }

    /// Resize the pool; does not wait
    pub async fn set_size(
        &self,
        project: &str,
        cluster: &Cluster,
        pool: &NodePool,
        node_count: u32,
    ) -> Result<Operation> {
        let url = format!("{}:setSize", self.pool_url(project, cluster, pool));
        let body = json!({ "nodeCount": node_count });
        Operation::from_value(self.client.post(&url, Some(&body)).await?)
    }

    async fn wait(&self, project: &str, cluster: &Cluster, mut operation: Operation) -> Result<()> {
        if operation.location().is_none() {
            operation.location = Some(cluster.location.clone());
        }
        await_completion(self, project, operation, &self.poll).await?;
        Ok(())
    }

    /// Taint then shrink (stop), or untaint then grow (start), one pool
    async fn transition_pool(
        &self,
        project: &str,
        cluster: &Cluster,
        pool: &NodePool,
        action: Action,
    ) -> Result<()> {
        let (taints, node_count) = match action {
            Action::Stop => (with_taint(&pool.config.taints, self.drain.taint()), 0),
            Action::Start => (without_taint(&pool.config.taints, &self.drain.key), 1),
        };

        let operation = self.set_taints(project, cluster, pool, &taints).await?;
        self.wait(project, cluster, operation).await?;

        tracing::info!("Resizing node pool {} to {}", pool.name, node_count);
        let operation = self.set_size(project, cluster, pool, node_count).await?;
        self.wait(project, cluster, operation).await
    }
}

#[async_trait]
impl OperationSource for Gke {
    async fn refresh(&self, project: &str, operation: &Operation) -> Result<Operation> {
        let location = operation.location().ok_or_else(|| {
            Error::provider(format!("operation {} has no location", operation.name))
        })?;
        let url = self.client.container_location_url(
            project,
            &location,
            &format!("operations/{}", operation.name),
        );
        Operation::from_value(self.client.get(&url).await?)
    }
}

#[async_trait]
impl PowerTarget for Gke {
    fn kind(&self) -> Kind {
        Kind::Gke
    }

    async fn list(&self, request: &Request, _action: Action) -> Result<Vec<Resource>> {
        let clusters = self
            .list_clusters(&request.project, &request.locations, &request.labels)
            .await?;
        Ok(clusters.into_iter().map(Resource::Cluster).collect())
    }

    async fn transition(&self, project: &str, resource: &Resource, action: Action) -> Result<()> {
        let Resource::Cluster(cluster) = resource else {
            return Err(mismatched(Kind::Gke, resource));
        };

        for pool in &cluster.node_pools {
            self.transition_pool(project, cluster, pool, action)
                .await
                .map_err(|e| match e {
                    Error::ProviderCallFailure { status, message } => Error::ProviderCallFailure {
                        status,
                        message: format!("node pool {}: {}", pool.name, message),
                    },
                    other => other,
                })?;
        }
        Ok(())
    }
}
