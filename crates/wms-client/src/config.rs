//! Client configuration.
//!
//! Built in code or deserialized by the caller; nothing is read from the
//! environment.

use std::time::Duration;

use serde::Deserialize;

use crate::capabilities::WMS_SRS_DEFAULT;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for capability and metadata requests, in seconds
    pub request_timeout_secs: u64,
    /// Timeout for GetMap requests, in seconds
    pub image_timeout_secs: u64,
    /// Web Mercator alias to render with when the service supports it
    pub preferred_spatial_ref: String,
    /// Protocol version requested in GetCapabilities; the latest known by default
    pub version: Option<String>,
    /// Access token appended to every request as `token`
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            image_timeout_secs: 120,
            preferred_spatial_ref: WMS_SRS_DEFAULT.to_string(),
            version: None,
            token: None,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}
