//! GCP API interaction module
//!
//! Authentication, the REST client and long-running operation polling shared
//! by every resource kind.
//!
//! # Module Structure
//!
//! - [`auth`] - Application Default Credentials and default project lookup
//! - [`client`] - Main GCP client and API URL builders
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operation`] - Operation handles and the completion poller
//!
//! # Example
//!
//! ```ignore
//! use gcp_scheduler::gcp::client::GcpClient;
//!
//! async fn example() -> gcp_scheduler::error::Result<()> {
//!     let client = GcpClient::new().await?;
//!     let url = client.compute_zonal_url("my-project", "us-central1-a", "instances");
//!     let instances = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operation;
