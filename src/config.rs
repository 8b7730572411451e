//! Agent configuration
//!
//! The agent is configured with two strings: the tracking endpoint URL, whose
//! last path segment names the tracking id, and the relay API key. A missing
//! or unusable tracking URL leaves the agent inert; an empty API key only skips
//! the bootstrap call.

use crate::error::PixelError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Relay that attaches credentials before forwarding to the collector
pub const DEFAULT_RELAY_ENDPOINT: &str = "https://proxyprovider-vhkdzfr2sq-uc.a.run.app";

/// Marker left in embed snippets whose endpoint was never filled in
pub const TRACKING_URL_PLACEHOLDER: &str = "TRACKING_ENDPOINT";

/// Query-string flag that turns on diagnostic mode
pub const DEBUG_QUERY_FLAG: &str = "mdb_pixel_debug=true";

/// Host name that turns on diagnostic mode
pub const DEBUG_HOSTNAME: &str = "localhost";

/// Storage key holding the device identifier
pub const STORAGE_KEY: &str = "_mdb_did";

/// Raw configuration as supplied by the embedder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub tracking_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_relay_endpoint")]
    pub relay_endpoint: String,
}

fn default_relay_endpoint() -> String {
    DEFAULT_RELAY_ENDPOINT.to_string()
}

/// Configuration after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub tracking_id: String,
    pub api_key: String,
    pub relay_endpoint: Url,
}

impl ResolvedConfig {
    /// Bootstrap is skipped when no API key was supplied
    pub fn bootstrap_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl AgentConfig {
    pub fn new(tracking_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            tracking_url: tracking_url.into(),
            api_key: api_key.into(),
            relay_endpoint: default_relay_endpoint(),
        }
    }

    pub fn with_relay_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.relay_endpoint = endpoint.into();
        self
    }

    /// Parse a JSON config document
    pub fn from_json(json: &str) -> Result<Self, PixelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the configuration and extract the tracking id
    pub fn resolve(&self) -> Result<ResolvedConfig, PixelError> {
        let tracking_id = extract_tracking_id(&self.tracking_url)?;

        let relay_endpoint = Url::parse(&self.relay_endpoint)
            .map_err(|e| PixelError::InvalidRelayEndpoint(format!("{}: {}", self.relay_endpoint, e)))?;

        Ok(ResolvedConfig {
            tracking_id,
            api_key: self.api_key.clone(),
            relay_endpoint,
        })
    }
}

/// Tracking id = everything after the last `/` of the tracking URL
pub fn extract_tracking_id(tracking_url: &str) -> Result<String, PixelError> {
    if tracking_url.is_empty() {
        return Err(PixelError::MissingTrackingUrl);
    }
    if tracking_url.contains(TRACKING_URL_PLACEHOLDER) {
        return Err(PixelError::UnreplacedPlaceholder(tracking_url.to_string()));
    }

    let tracking_id = tracking_url.rsplit('/').next().unwrap_or_default();
    if tracking_id.is_empty() {
        return Err(PixelError::EmptyTrackingId(tracking_url.to_string()));
    }

    Ok(tracking_id.to_string())
}

/// Whether the page location asks for diagnostic output
pub fn is_diagnostic(location: &Url) -> bool {
    location.host_str() == Some(DEBUG_HOSTNAME)
        || location
            .query()
            .is_some_and(|query| query.contains(DEBUG_QUERY_FLAG))
}
