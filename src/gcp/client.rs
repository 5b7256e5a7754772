//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining a token source with
//! the HTTP wrapper. Base URLs are injectable so the client can be pointed at
//! a mock server.

use super::auth::{AdcTokens, TokenSource};
use super::http::GcpHttpClient;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// API base URLs, without trailing slash
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub compute: String,
    pub container: String,
    pub sqladmin: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com/compute/v1".to_string(),
            container: "https://container.googleapis.com/v1".to_string(),
            sqladmin: "https://sqladmin.googleapis.com/sql/v1beta4".to_string(),
        }
    }
}

impl Endpoints {
    /// Serve every API from one host, keeping the real path prefixes
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compute: format!("{}/compute/v1", base),
            container: format!("{}/v1", base),
            sqladmin: format!("{}/sql/v1beta4", base),
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    tokens: Arc<dyn TokenSource>,
    http: GcpHttpClient,
    endpoints: Endpoints,
}

impl GcpClient {
    /// Create a client backed by Application Default Credentials
    pub async fn new() -> Result<Self> {
        let credentials = AdcTokens::new().await?;
        Self::with_parts(Arc::new(credentials), Endpoints::default())
    }

    /// Create a client from an explicit token source and endpoints
    pub fn with_parts(tokens: Arc<dyn TokenSource>, endpoints: Endpoints) -> Result<Self> {
        Ok(Self {
            tokens,
            http: GcpHttpClient::new()?,
            endpoints,
        })
    }

    /// Project the ambient credentials belong to
    pub async fn default_project(&self) -> Result<String> {
        self.tokens.project_id().await
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.tokens.token().await?;
        self.http.get(url, &token).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.tokens.token().await?;
        self.http.post(url, &token, body).await
    }

    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.tokens.token().await?;
        self.http.put(url, &token, body).await
    }

    pub async fn patch(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.tokens.token().await?;
        self.http.patch(url, &token, body).await
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.compute, project, path)
    }

    /// Build zonal Compute Engine API URL
    pub fn compute_zonal_url(&self, project: &str, zone: &str, resource: &str) -> String {
        self.compute_url(project, &format!("zones/{}/{}", zone, resource))
    }

    /// Build aggregated Compute Engine API URL (all zones)
    pub fn compute_aggregated_url(&self, project: &str, resource: &str) -> String {
        self.compute_url(project, &format!("aggregated/{}", resource))
    }

    // =========================================================================
    // GKE API helpers
    // =========================================================================

    /// Build GKE API URL
    pub fn container_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.container, project, path)
    }

    /// Build GKE location URL (region, zone, or `-` for all)
    pub fn container_location_url(&self, project: &str, location: &str, resource: &str) -> String {
        self.container_url(project, &format!("locations/{}/{}", location, resource))
    }

    // =========================================================================
    // Cloud SQL Admin API helpers
    // =========================================================================

    /// Build Cloud SQL Admin API URL
    pub fn sql_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.sqladmin, project, path)
    }
}

/// Append URL-encoded query parameters, skipping empty values
pub fn add_query_params(url: &str, params: &[(&str, &str)]) -> String {
    let query_parts: Vec<String> = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();

    if query_parts.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&{}", url, query_parts.join("&"))
    } else {
        format!("{}?{}", url, query_parts.join("&"))
    }
}

/// Extract short name from GCP resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::auth::StaticToken;

    fn client() -> GcpClient {
        GcpClient::with_parts(
            Arc::new(StaticToken::new("t")),
            Endpoints::with_base("http://localhost:9999/"),
        )
        .unwrap()
    }

    #[test]
    fn test_url_builders() {
        let client = client();
        assert_eq!(
            client.compute_zonal_url("p", "us-central1-a", "instances"),
            "http://localhost:9999/compute/v1/projects/p/zones/us-central1-a/instances"
        );
        assert_eq!(
            client.compute_aggregated_url("p", "instances"),
            "http://localhost:9999/compute/v1/projects/p/aggregated/instances"
        );
        assert_eq!(
            client.container_location_url("p", "-", "clusters"),
            "http://localhost:9999/v1/projects/p/locations/-/clusters"
        );
        assert_eq!(
            client.sql_url("p", "instances"),
            "http://localhost:9999/sql/v1beta4/projects/p/instances"
        );
    }

    #[test]
    fn test_add_query_params() {
        assert_eq!(add_query_params("http://x/a", &[("filter", "")]), "http://x/a");
        assert_eq!(
            add_query_params("http://x/a", &[("filter", "(labels.env = \"dev\")"), ("maxResults", "25")]),
            "http://x/a?filter=%28labels.env%20%3D%20%22dev%22%29&maxResults=25"
        );
        assert_eq!(
            add_query_params("http://x/a?b=1", &[("pageToken", "t")]),
            "http://x/a?b=1&pageToken=t"
        );
    }

    #[test]
    fn test_extract_short_name() {
        assert_eq!(
            extract_short_name("https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-b"),
            "us-east1-b"
        );
        assert_eq!(extract_short_name("us-east1-b"), "us-east1-b");
    }
}
