//! GCP Authentication
//!
//! Bearer tokens come from Application Default Credentials. The project a
//! trigger falls back to is read from the environment, then the gcloud
//! configuration, then the credentials themselves.

use crate::error::{Error, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Scope requested for every token
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Assumed token lifetime; `gcp_auth` hands back opaque tokens
const TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Renew this long before the assumed expiry
const RENEW_MARGIN: Duration = Duration::from_secs(60);

/// Environment variables checked for a project, in order
const PROJECT_VARS: [&str; 3] = ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

/// Source of bearer tokens and of the ambient project identity.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Bearer token for the next API call
    async fn token(&self) -> Result<String>;

    /// Project the credentials belong to, used when a trigger names none
    async fn project_id(&self) -> Result<String>;
}

/// Application Default Credentials with a shared token cache
#[derive(Clone)]
pub struct AdcTokens {
    provider: Arc<dyn TokenProvider>,
    cached: Arc<RwLock<Option<IssuedToken>>>,
}

#[derive(Clone)]
struct IssuedToken {
    value: String,
    renew_at: Instant,
}

impl IssuedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.renew_at
    }
}

impl AdcTokens {
    /// Resolve Application Default Credentials from the environment
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| {
            Error::Auth(format!(
                "failed to initialize Application Default Credentials: {e}"
            ))
        })?;

        Ok(Self {
            provider,
            cached: Arc::new(RwLock::new(None)),
        })
    }
}

#[async_trait]
impl TokenSource for AdcTokens {
    async fn token(&self) -> Result<String> {
        if let Some(issued) = self.cached.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(issued.value.clone());
        }

        let token = self
            .provider
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| Error::Auth(format!("failed to get access token: {e}")))?;

        let issued = IssuedToken {
            value: token.as_str().to_string(),
            renew_at: Instant::now() + TOKEN_LIFETIME - RENEW_MARGIN,
        };
        let value = issued.value.clone();
        *self.cached.write().await = Some(issued);

        tracing::debug!(
            "Fetched new access token, renewing in {}m",
            (TOKEN_LIFETIME - RENEW_MARGIN).as_secs() / 60
        );
        Ok(value)
    }

    async fn project_id(&self) -> Result<String> {
        if let Some(project) = ambient_project() {
            return Ok(project);
        }

        self.provider
            .project_id()
            .await
            .map(|project| project.to_string())
            .map_err(|e| Error::Auth(format!("failed to resolve default project: {e}")))
    }
}

/// Fixed token and project, for local runs against emulators and for tests.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
    project: Option<String>,
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            project: None,
        }
    }

    pub fn with_project(mut self, project: &str) -> Self {
        self.project = Some(project.to_string());
        self
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn project_id(&self) -> Result<String> {
        self.project
            .clone()
            .ok_or_else(|| Error::Auth("no default project configured".to_string()))
    }
}

/// Whether `project` is a well-formed project ID: 6 to 30 lowercase
/// letters, digits or hyphens, starting with a letter, not ending in a hyphen
pub fn is_valid_project_id(project: &str) -> bool {
    let starts_with_letter = project
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase());

    (6..=30).contains(&project.len())
        && starts_with_letter
        && !project.ends_with('-')
        && project
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Project from the environment or the gcloud configuration, if any
pub fn ambient_project() -> Option<String> {
    for var in PROJECT_VARS {
        let Ok(project) = std::env::var(var) else {
            continue;
        };
        if is_valid_project_id(&project) {
            return Some(project);
        }
        tracing::warn!("Ignoring malformed project ID in {}", var);
    }

    gcloud_dir().and_then(|dir| gcloud_project(&dir))
}

/// gcloud configuration directory (`$CLOUDSDK_CONFIG` or `~/.config/gcloud`)
fn gcloud_dir() -> Option<PathBuf> {
    match std::env::var_os("CLOUDSDK_CONFIG") {
        Some(dir) => Some(PathBuf::from(dir)),
        None => dirs::config_dir().map(|dir| dir.join("gcloud")),
    }
}

/// `core/project` from the legacy properties file, else the active named
/// configuration
fn gcloud_project(dir: &Path) -> Option<String> {
    let legacy = std::fs::read_to_string(dir.join("properties")).ok();
    if let Some(project) = legacy.as_deref().and_then(|c| ini_core_project(c, false)) {
        return Some(project);
    }

    let active = std::fs::read_to_string(dir.join("active_config")).ok()?;
    let name = active.trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Ignoring active gcloud configuration with an unexpected name");
        return None;
    }

    let named = std::fs::read_to_string(dir.join("configurations").join(format!("config_{name}"))).ok()?;
    ini_core_project(&named, true)
}

/// `project = ...` from an ini file; with `sectioned`, only under `[core]`
fn ini_core_project(content: &str, sectioned: bool) -> Option<String> {
    let mut in_core = !sectioned;

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .find_map(|line| {
            if sectioned && line.starts_with('[') {
                in_core = line == "[core]";
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            (in_core && key.trim() == "project" && is_valid_project_id(value)).then(|| value.to_string())
        })
}
