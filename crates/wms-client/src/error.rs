//! Error types for the WMS client.

use map_geometry::GeometryError;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias using ClientError.
pub type ClientResult<T> = Result<T, ClientError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every variant carries the URL of the service or request that failed.
#[derive(Debug, Error)]
pub enum ClientError {
    // === Document errors ===
    #[error("{message}: {url}")]
    BadExtent {
        message: String,
        url: String,
        #[source]
        source: Option<GeometryError>,
    },

    #[error("The WMS service version is not supported ({invalid}, expected one of {supported:?}): {url}")]
    UnsupportedVersion {
        invalid: String,
        supported: Vec<String>,
        url: String,
    },

    #[error("The WMS service is missing required fields {missing:?}: {url}")]
    MissingFields { missing: Vec<String>, url: String },

    #[error("{message}: {url}")]
    Content {
        message: String,
        url: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("The WMS service does not have any layers: {url}")]
    NoLayers { url: String },

    #[error("{message}: {url}")]
    Validation { message: String, url: String },

    // === Network errors ===
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Request failed ({message}): {url}")]
    Transport { message: String, url: String },

    #[error("Service responded with HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Service exception ({message}): {url}")]
    ServiceException { message: String, url: String },

    // === Rendering errors ===
    #[error("{message}: {url}")]
    Image {
        message: String,
        url: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ClientError {
    pub fn url(&self) -> &str {
        match self {
            ClientError::BadExtent { url, .. }
            | ClientError::UnsupportedVersion { url, .. }
            | ClientError::MissingFields { url, .. }
            | ClientError::Content { url, .. }
            | ClientError::NoLayers { url }
            | ClientError::Validation { url, .. }
            | ClientError::Timeout { url }
            | ClientError::Transport { url, .. }
            | ClientError::HttpStatus { url, .. }
            | ClientError::ServiceException { url, .. }
            | ClientError::Image { url, .. } => url,
        }
    }

    pub(crate) fn bad_extent(message: impl Into<String>, url: &str, source: GeometryError) -> Self {
        ClientError::BadExtent {
            message: message.into(),
            url: url.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn content(message: impl Into<String>, url: &str) -> Self {
        ClientError::Content {
            message: message.into(),
            url: url.to_string(),
            source: None,
        }
    }

    pub(crate) fn image(message: impl Into<String>, url: &str) -> Self {
        ClientError::Image {
            message: message.into(),
            url: url.to_string(),
            source: None,
        }
    }

    pub(crate) fn transport(error: TransportError, url: &str) -> Self {
        match error {
            TransportError::Timeout => ClientError::Timeout { url: url.to_string() },
            TransportError::Connection(message) => ClientError::Transport {
                message,
                url: url.to_string(),
            },
        }
    }
}

/// Geometry failures surface as `BadExtent`; the URL is unknown at this level.
impl From<GeometryError> for ClientError {
    fn from(error: GeometryError) -> Self {
        ClientError::BadExtent {
            message: error.to_string(),
            url: String::new(),
            source: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_mapping() {
        let timeout = ClientError::transport(TransportError::Timeout, "http://example.com/wms");
        assert!(matches!(timeout, ClientError::Timeout { .. }));
        assert_eq!(timeout.url(), "http://example.com/wms");

        let refused = ClientError::transport(
            TransportError::Connection("connection refused".to_string()),
            "http://example.com/wms",
        );
        assert!(matches!(refused, ClientError::Transport { .. }));
    }

    #[test]
    fn test_error_messages() {
        let err = ClientError::MissingFields {
            missing: vec!["Abstract".to_string()],
            url: "http://example.com/wms".to_string(),
        };
        assert!(err.to_string().contains("Abstract"));

        let err = ClientError::NoLayers {
            url: "http://example.com/wms".to_string(),
        };
        assert!(err.to_string().contains("does not have any layers"));
    }
}
