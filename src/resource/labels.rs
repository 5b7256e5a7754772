//! Label filters
//!
//! Compute and Cloud SQL filter on the server through a filter expression;
//! GKE has no server-side label filter for clusters, so node pools are
//! matched here.

use super::gke::Cluster;
use std::collections::BTreeMap;

/// Compute Engine filter: `(labels.k = "v") AND (labels.k2 = "v2")`.
/// `None` when there are no labels, so no filter is sent.
pub fn compute_filter(labels: &BTreeMap<String, String>) -> Option<String> {
    if labels.is_empty() {
        return None;
    }

    let clauses: Vec<String> = labels
        .iter()
        .map(|(key, value)| format!("(labels.{} = \"{}\")", key, value))
        .collect();
    Some(clauses.join(" AND "))
}

/// Cloud SQL filter on activation policy, runnable state and user labels.
/// Clauses are space-separated, which the SQL Admin API treats as AND.
pub fn sql_filter(activation_policy: &str, labels: &BTreeMap<String, String>) -> String {
    let mut clauses = vec![
        format!("(settings.activationPolicy = \"{}\")", activation_policy),
        "(state = \"RUNNABLE\")".to_string(),
    ];
    clauses.extend(
        labels
            .iter()
            .map(|(key, value)| format!("(settings.userLabels.{} = \"{}\")", key, value)),
    );
    clauses.join(" ")
}

/// True when every requested label is present in `labels` with the same value
pub fn contains_labels(labels: &BTreeMap<String, String>, requested: &BTreeMap<String, String>) -> bool {
    requested
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Keep node pools whose resource labels match, dropping clusters with none left
pub fn filter_by_labels(clusters: Vec<Cluster>, requested: &BTreeMap<String, String>) -> Vec<Cluster> {
    if requested.is_empty() {
        return clusters;
    }

    clusters
        .into_iter()
        .filter_map(|mut cluster| {
            cluster
                .node_pools
                .retain(|pool| contains_labels(&pool.config.resource_labels, requested));
            (!cluster.node_pools.is_empty()).then_some(cluster)
        })
        .collect()
}
