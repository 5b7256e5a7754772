//! Scheduled start/stop for GCP resources
//!
//! A scheduler job publishes a small JSON message; this crate decodes it,
//! lists the Compute Engine instances, Cloud SQL instances or GKE node pools
//! it selects, and moves each of them to the requested state concurrently,
//! waiting on every provider operation.
//!
//! - [`payload`] - Trigger decoding into a [`payload::Request`]
//! - [`resource`] - Listing and per-resource pipelines for each kind
//! - [`orchestrator`] - Concurrent fan-out and the [`orchestrator::BatchReport`]
//! - [`gcp`] - Credentials, REST client and operation polling
//! - [`server`] - Pub/Sub push endpoint

pub mod config;
pub mod error;
pub mod gcp;
pub mod orchestrator;
pub mod payload;
pub mod resource;
pub mod server;
