//! Batch orchestration
//!
//! Lists what a request selects, then runs every resource's pipeline
//! concurrently. A failing resource does not stop its siblings; the outcome
//! of each is collected into a [`BatchReport`].

use crate::config::Config;
use crate::error::Result;
use crate::gcp::client::GcpClient;
use crate::gcp::http::format_gcp_error;
use crate::payload::{Payload, Request};
use crate::resource::{target_for, Action, Kind, PowerTarget};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

/// A resource whose pipeline failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedResource {
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub error: String,
    /// Short operator-facing explanation of `error`
    pub hint: String,
}

/// Outcome of one start/stop invocation
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub kind: Kind,
    pub action: Action,
    pub project: String,
    /// Number of resources the listing selected
    pub found: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedResource>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Nothing matched the request; not an error
    pub fn is_empty(&self) -> bool {
        self.found == 0
    }
}

/// List the resources `request` selects and move all of them to `action`
pub async fn run_batch(target: &dyn PowerTarget, request: &Request, action: Action) -> Result<BatchReport> {
    let started_at = Utc::now();
    let kind = target.kind();
    let resources = target.list(request, action).await?;

    let outcomes = join_all(resources.iter().map(|resource| async move {
        tracing::info!("{} {} {}", action.verb(), kind.noun(), resource.name());
        let outcome = target.transition(&request.project, resource, action).await;
        (resource, outcome)
    }))
    .await;

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (resource, outcome) in outcomes {
        match outcome {
            Ok(()) => succeeded.push(resource.name().to_string()),
            Err(e) => {
                tracing::error!("Failed to {} {} {}: {}", action, kind.noun(), resource.name(), e);
                failed.push(FailedResource {
                    resource: resource.name().to_string(),
                    location: resource.location(),
                    hint: format_gcp_error(&e),
                    error: e.to_string(),
                });
            },
        }
    }

    if failed.is_empty() {
        tracing::info!("Successfully {} {} {}(s)", action.past(), succeeded.len(), kind.noun());
    } else {
        tracing::warn!(
            "{} {} {}(s), {} failed",
            capitalize(action.past()),
            succeeded.len(),
            kind.noun(),
            failed.len()
        );
    }

    Ok(BatchReport {
        kind,
        action,
        project: request.project.clone(),
        found: resources.len(),
        succeeded,
        failed,
        started_at,
        finished_at: Utc::now(),
    })
}

/// Start every resource the request selects
pub async fn start_instances(target: &dyn PowerTarget, request: &Request) -> Result<BatchReport> {
    run_batch(target, request, Action::Start).await
}

/// Stop every resource the request selects
pub async fn stop_instances(target: &dyn PowerTarget, request: &Request) -> Result<BatchReport> {
    run_batch(target, request, Action::Stop).await
}

/// Handle one trigger end to end: resolve the payload, build the target for
/// `kind` and run the batch, inside a span tagged with an invocation id
pub async fn handle_trigger(
    client: &GcpClient,
    config: &Config,
    kind: Kind,
    action: Action,
    payload: Payload,
) -> Result<BatchReport> {
    let invocation = Uuid::new_v4();
    let span = tracing::info_span!("invocation", id = %invocation, %kind, %action);

    async move {
        let request = payload.resolve(client).await?;
        tracing::info!(
            "Request for project {} (locations: {}, labels: {})",
            request.project,
            if request.locations.is_empty() {
                "all".to_string()
            } else {
                request.locations.join(",")
            },
            request.labels.len()
        );

        let target = target_for(kind, client.clone(), config);
        match action {
            Action::Start => start_instances(target.as_ref(), &request).await,
            Action::Stop => stop_instances(target.as_ref(), &request).await,
        }
    }
    .instrument(span)
    .await
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
