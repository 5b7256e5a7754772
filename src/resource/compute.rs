//! Compute Engine instances

use super::fetcher::{decode_items, fetch_aggregated, fetch_all};
use super::labels::compute_filter;
use super::{mismatched, Action, Kind, PowerTarget, Resource};
use crate::error::{Error, Result};
use crate::gcp::client::{add_query_params, extract_short_name, GcpClient};
use crate::gcp::operation::{await_completion, Operation, OperationSource, PollPolicy};
use crate::payload::Request;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A VM instance as returned by `instances.list`
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeInstance {
    pub name: String,
    /// Zone URL
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ComputeInstance {
    pub fn zone_name(&self) -> String {
        extract_short_name(&self.zone)
    }
}

/// Compute Engine start/stop
pub struct ComputeEngine {
    client: GcpClient,
    poll: PollPolicy,
}

impl ComputeEngine {
    pub fn new(client: GcpClient, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    /// List instances in the given zones, or in every zone when none are given
    pub async fn list_instances(
        &self,
        project: &str,
        zones: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ComputeInstance>> {
        let filter = compute_filter(labels).unwrap_or_default();

        if zones.is_empty() {
            return self.list_all_instances(project, &filter).await;
        }

        let mut instances = Vec::new();
        for zone in zones {
            let url = self.client.compute_zonal_url(project, zone, "instances");
            let url = add_query_params(&url, &[("filter", filter.as_str())]);
            let found: Vec<ComputeInstance> = decode_items(fetch_all(&self.client, &url, "items").await?)?;
            tracing::info!("Found {} instance(s) in zone {}", found.len(), zone);
            instances.extend(found);
        }
        Ok(instances)
    }

    async fn list_all_instances(&self, project: &str, filter: &str) -> Result<Vec<ComputeInstance>> {
        let url = self.client.compute_aggregated_url(project, "instances");
        let url = add_query_params(&url, &[("filter", filter)]);

        let mut instances = Vec::new();
        for (scope, items) in fetch_aggregated(&self.client, &url, "instances").await? {
            let found: Vec<ComputeInstance> = decode_items(items)?;
            tracing::info!("Found {} instance(s) in zone {}", found.len(), extract_short_name(&scope));
            instances.extend(found);
        }
        Ok(instances)
    }

    /// Issue `instances.start` or `instances.stop`; does not wait
    pub async fn apply(&self, project: &str, instance: &ComputeInstance, action: Action) -> Result<Operation> {
        let url = self.client.compute_zonal_url(
            project,
            &instance.zone_name(),
            &format!("instances/{}/{}", instance.name, action),
        );
        Operation::from_value(self.client.post(&url, None).await?)
    }
}

#[async_trait]
impl OperationSource for ComputeEngine {
    /// `zoneOperations.wait` blocks server-side until the operation is done or
    /// roughly two minutes pass, so callers re-fetch without sleeping.
    async fn refresh(&self, project: &str, operation: &Operation) -> Result<Operation> {
        let zone = operation
            .location()
            .ok_or_else(|| Error::provider(format!("operation {} has no zone", operation.name)))?;
        let url = self
            .client
            .compute_zonal_url(project, &zone, &format!("operations/{}/wait", operation.name));
        Operation::from_value(self.client.post(&url, None).await?)
    }
}

#[async_trait]
impl PowerTarget for ComputeEngine {
    fn kind(&self) -> Kind {
        Kind::Compute
    }

    async fn list(&self, request: &Request, _action: Action) -> Result<Vec<Resource>> {
        let instances = self
            .list_instances(&request.project, &request.locations, &request.labels)
            .await?;
        Ok(instances.into_iter().map(Resource::Instance).collect())
    }

    async fn transition(&self, project: &str, resource: &Resource, action: Action) -> Result<()> {
        let Resource::Instance(instance) = resource else {
            return Err(mismatched(Kind::Compute, resource));
        };

        let mut operation = self.apply(project, instance, action).await?;
        if operation.location().is_none() {
            operation.zone = Some(instance.zone.clone());
        }
        await_completion(self, project, operation, &self.poll).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_deserialize() {
        let instance: ComputeInstance = serde_json::from_value(json!({
            "name": "vm-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "status": "RUNNING",
            "labels": {"env": "dev"},
            "machineType": "zones/us-central1-a/machineTypes/e2-medium"
        }))
        .unwrap();

        assert_eq!(instance.zone_name(), "us-central1-a");
        assert_eq!(instance.labels.get("env").map(String::as_str), Some("dev"));
    }
}
