//! Trigger payload decoding
//!
//! A scheduler job publishes `{"project"?, "zones"?, "labels"?}` to Pub/Sub;
//! the message arrives base64-encoded inside a push envelope. Decoding is
//! pure; filling in a missing project asks the credential provider.

use crate::error::{Error, Result};
use crate::gcp::client::GcpClient;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Zone and region names go into URL paths unescaped
fn is_location_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// A decoded, validated start/stop request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    pub project: String,
    /// Zones or regions to search; empty means every location
    pub locations: Vec<String>,
    /// Exact-match label constraints; empty means no filter
    pub labels: BTreeMap<String, String>,
}

/// Message body before the project is resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default, alias = "locations")]
    pub zones: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Pub/Sub push (and Eventarc) delivery envelope
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PubsubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Payload {
    /// Decode base64-encoded UTF-8 JSON, as found in `message.data`
    pub fn from_base64(data: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| Error::MalformedPayload(format!("base64: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::MalformedPayload(format!("utf-8: {e}")))?;
        Self::from_json(&text)
    }

    /// Parse an already-decoded JSON message
    pub fn from_json(text: &str) -> Result<Self> {
        let payload: Payload = serde_json::from_str(text)
            .map_err(|e| Error::MalformedPayload(format!("json: {e}")))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Decode the data carried by a push envelope body
    pub fn from_envelope(body: &[u8]) -> Result<Self> {
        let envelope: PushEnvelope = serde_json::from_slice(body)
            .map_err(|e| Error::MalformedPayload(format!("envelope: {e}")))?;
        if let Some(id) = &envelope.message.message_id {
            tracing::debug!("Decoding message {}", id);
        }
        Self::from_base64(&envelope.message.data)
    }

    /// Message given on the command line: base64 `data`, else plain JSON
    /// `message`, else empty. A `project` flag overrides the message.
    pub fn from_cli(data: Option<&str>, message: Option<&str>, project: Option<String>) -> Result<Self> {
        let mut payload = match (data, message) {
            (Some(data), _) => Self::from_base64(data)?,
            (None, Some(message)) => Self::from_json(message)?,
            (None, None) => Self::default(),
        };
        if project.is_some() {
            payload.project = project;
        }
        Ok(payload)
    }

    fn validate(&self) -> Result<()> {
        for zone in self.zones.iter().flatten() {
            if !is_location_name(zone.trim()) {
                return Err(Error::MalformedPayload(format!(
                    "zone {:?} must be a non-empty name of lowercase letters, digits and hyphens",
                    zone
                )));
            }
        }

        // Values may be empty; the filter then matches resources carrying
        // the key with an empty value
        for (key, value) in self.labels.iter().flatten() {
            if key.is_empty() {
                return Err(Error::MalformedPayload(format!(
                    "label {:?}={:?} must have a non-empty key",
                    key, value
                )));
            }
            if key.contains('"') || value.contains('"') || key.contains(' ') {
                return Err(Error::MalformedPayload(format!(
                    "label {:?}={:?} contains characters not allowed in a filter",
                    key, value
                )));
            }
        }

        Ok(())
    }

    /// Build the request, falling back to the ambient default project
    pub async fn resolve(self, client: &GcpClient) -> Result<Request> {
        let project = match self.project.filter(|p| !p.trim().is_empty()) {
            Some(project) => project,
            None => {
                let project = client.default_project().await?;
                tracing::info!("No project in payload, using default project {}", project);
                project
            },
        };

        Ok(Request {
            project,
            locations: self
                .zones
                .unwrap_or_default()
                .into_iter()
                .map(|z| z.trim().to_string())
                .collect(),
            labels: self.labels.unwrap_or_default(),
        })
    }
}
