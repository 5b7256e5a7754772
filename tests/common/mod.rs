//! Shared helpers for the mock-server integration tests

#![allow(dead_code)]

use gcp_scheduler::gcp::auth::StaticToken;
use gcp_scheduler::gcp::client::{Endpoints, GcpClient};
use gcp_scheduler::payload::Request;
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::MockServer;

pub const PROJECT: &str = "test-project";
pub const TOKEN: &str = "test-token";

/// Client that sends every API call to the mock server
pub fn client(server: &MockServer) -> GcpClient {
    GcpClient::with_parts(
        Arc::new(StaticToken::new(TOKEN).with_project(PROJECT)),
        Endpoints::with_base(&server.uri()),
    )
    .expect("client should build")
}

pub fn request(locations: &[&str], labels: &[(&str, &str)]) -> Request {
    Request {
        project: PROJECT.to_string(),
        locations: locations.iter().map(|l| l.to_string()).collect(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Method and path of every request the server received, in order
pub async fn calls(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .expect("request recording is enabled")
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect()
}
