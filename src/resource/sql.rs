//! Cloud SQL instances
//!
//! Cloud SQL has no start/stop call. An instance with activation policy
//! `ALWAYS` runs; `NEVER` stops it.

use super::fetcher::{decode_items, fetch_all};
use super::labels::sql_filter;
use super::{mismatched, Action, Kind, PowerTarget, Resource};
use crate::error::Result;
use crate::gcp::client::{add_query_params, GcpClient};
use crate::gcp::operation::{await_completion, Operation, OperationSource, PollPolicy};
use crate::payload::Request;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

pub const POLICY_ALWAYS: &str = "ALWAYS";
pub const POLICY_NEVER: &str = "NEVER";

/// A Cloud SQL instance as returned by `instances.list`
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInstance {
    pub name: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub gce_zone: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub settings: DatabaseSettings,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSettings {
    #[serde(default)]
    pub activation_policy: String,
    #[serde(default)]
    pub user_labels: BTreeMap<String, String>,
}

impl DatabaseInstance {
    /// Whether the instance sits in one of `locations` (region or zone)
    pub fn is_in(&self, locations: &[String]) -> bool {
        locations.iter().any(|location| {
            self.region.as_deref() == Some(location.as_str())
                || self.gce_zone.as_deref() == Some(location.as_str())
        })
    }
}

/// Policy an instance must currently have to be selected for `action`
fn current_policy(action: Action) -> &'static str {
    match action {
        Action::Start => POLICY_NEVER,
        Action::Stop => POLICY_ALWAYS,
    }
}

/// Policy that puts an instance in the state `action` asks for
fn target_policy(action: Action) -> &'static str {
    match action {
        Action::Start => POLICY_ALWAYS,
        Action::Stop => POLICY_NEVER,
    }
}

/// Cloud SQL start/stop through the activation policy
pub struct CloudSql {
    client: GcpClient,
    poll: PollPolicy,
}

impl CloudSql {
    pub fn new(client: GcpClient, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    /// List runnable instances whose policy is not yet the one `action` sets
    pub async fn list_instances(
        &self,
        project: &str,
        action: Action,
        locations: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DatabaseInstance>> {
        let filter = sql_filter(current_policy(action), labels);
        let url = self.client.sql_url(project, "instances");
        let url = add_query_params(&url, &[("filter", filter.as_str())]);

        let instances: Vec<DatabaseInstance> = decode_items(fetch_all(&self.client, &url, "items").await?)?;
        tracing::info!("Found {} instance(s)", instances.len());

        if locations.is_empty() {
            return Ok(instances);
        }

        let instances: Vec<DatabaseInstance> = instances
            .into_iter()
            .filter(|instance| instance.is_in(locations))
            .collect();
        tracing::info!("{} instance(s) in {}", instances.len(), locations.join(", "));
        Ok(instances)
    }

    /// Patch the activation policy; does not wait
    pub async fn apply(&self, project: &str, instance: &DatabaseInstance, action: Action) -> Result<Operation> {
        let url = self.client.sql_url(project, &format!("instances/{}", instance.name));
        let body = json!({
            "settings": {
                "activationPolicy": target_policy(action),
            }
        });
        Operation::from_value(self.client.patch(&url, &body).await?)
    }
}

#[async_trait]
impl OperationSource for CloudSql {
    async fn refresh(&self, project: &str, operation: &Operation) -> Result<Operation> {
        let url = self
            .client
            .sql_url(project, &format!("operations/{}", operation.name));
        Operation::from_value(self.client.get(&url).await?)
    }
}

#[async_trait]
impl PowerTarget for CloudSql {
    fn kind(&self) -> Kind {
        Kind::Sql
    }

    async fn list(&self, request: &Request, action: Action) -> Result<Vec<Resource>> {
        let instances = self
            .list_instances(&request.project, action, &request.locations, &request.labels)
            .await?;
        Ok(instances.into_iter().map(Resource::Database).collect())
    }

    async fn transition(&self, project: &str, resource: &Resource, action: Action) -> Result<()> {
        let Resource::Database(instance) = resource else {
            return Err(mismatched(Kind::Sql, resource));
        };

        let project = instance.project.as_deref().unwrap_or(project);
        let operation = self.apply(project, instance, action).await?;
        await_completion(self, project, operation, &self.poll).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies_are_opposite() {
        for action in [Action::Start, Action::Stop] {
            assert_ne!(current_policy(action), target_policy(action));
        }
        assert_eq!(target_policy(Action::Start), POLICY_ALWAYS);
    }

    #[test]
    fn test_is_in_matches_region_or_zone() {
        let instance: DatabaseInstance = serde_json::from_value(json!({
            "name": "db",
            "region": "us-central1",
            "gceZone": "us-central1-b",
            "state": "RUNNABLE",
            "settings": {"activationPolicy": "ALWAYS"}
        }))
        .unwrap();

        assert!(instance.is_in(&["us-central1".to_string()]));
        assert!(instance.is_in(&["us-central1-b".to_string()]));
        assert!(!instance.is_in(&["europe-west1".to_string()]));
    }
}
