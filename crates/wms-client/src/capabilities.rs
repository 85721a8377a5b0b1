//! WMS GetCapabilities document validation and service-level fields.
//!
//! A document moves through two steps: [`ValidatedCapabilities::validate`]
//! checks the root structure and version, then
//! [`ValidatedCapabilities::service_info`] extracts the flat service record.
//! Layers are handed to the layer tree builder untouched.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::xml::XmlElement;
use crate::{ClientError, ClientResult};

pub const WMS_KNOWN_VERSIONS: [&str; 2] = ["1.1.1", "1.3.0"];
pub const WMS_EXCEPTION_FORMAT: &str = "application/vnd.ogc.se_xml";
pub const WMS_SRS_DEFAULT: &str = "EPSG:3857";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum WmsVersion {
    #[serde(rename = "1.1.1")]
    V1_1_1,
    #[default]
    #[serde(rename = "1.3.0")]
    V1_3_0,
}

impl WmsVersion {
    pub fn parse(version: &str) -> Option<Self> {
        match version.trim() {
            "1.1.1" => Some(WmsVersion::V1_1_1),
            "1.3.0" => Some(WmsVersion::V1_3_0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WmsVersion::V1_1_1 => "1.1.1",
            WmsVersion::V1_3_0 => "1.3.0",
        }
    }

    /// The older of the two supported versions.
    pub fn is_old(&self) -> bool {
        *self == WmsVersion::V1_1_1
    }
}

impl fmt::Display for WmsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service-level fields of a capability document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub title: String,
    pub description: Option<String>,
    pub access_constraints: Option<String>,
    pub version: WmsVersion,
    pub keywords: Option<Vec<String>>,
    /// Maximum number of layers the service renders in one request
    pub layer_drawing_limit: Option<u32>,
    pub map_formats: Vec<String>,
    pub feature_info_formats: Vec<String>,
}

/// A capability document whose root structure has been checked.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedCapabilities<'a> {
    pub version: WmsVersion,
    service: &'a XmlElement,
    capability: &'a XmlElement,
}

impl<'a> ValidatedCapabilities<'a> {
    pub fn validate(root: &'a XmlElement, url: &str) -> ClientResult<Self> {
        if let Some(message) = service_exception_message(root) {
            return Err(ClientError::ServiceException {
                message,
                url: url.to_string(),
            });
        }

        let service = root
            .child("Service")
            .ok_or_else(|| ClientError::content("The WMS service did not respond correctly", url))?;
        let capability = root.child("Capability").ok_or_else(|| ClientError::NoLayers {
            url: url.to_string(),
        })?;

        let declared = root.attr("version").unwrap_or_default();
        let version = WmsVersion::parse(declared).ok_or_else(|| ClientError::UnsupportedVersion {
            invalid: declared.to_string(),
            supported: WMS_KNOWN_VERSIONS.iter().map(|v| v.to_string()).collect(),
            url: url.to_string(),
        })?;

        if service.child("Abstract").is_none() {
            return Err(ClientError::MissingFields {
                missing: vec!["Abstract".to_string()],
                url: url.to_string(),
            });
        }

        Ok(Self {
            version,
            service,
            capability,
        })
    }

    pub fn service_info(&self) -> ServiceInfo {
        let service = self.service;

        let access_constraints = service
            .child_text("AccessConstraints")
            .filter(|c| !c.eq_ignore_ascii_case("none"))
            .map(str::to_string);

        let layer_drawing_limit = service.child_text("LayerLimit").and_then(|limit| {
            let parsed = limit.parse::<u32>().ok();
            if parsed.is_none() {
                debug!(limit = %limit, "Ignoring non-numeric LayerLimit");
            }
            parsed.filter(|l| *l > 0)
        });

        let formats = |request: &str| {
            self.capability
                .find(&["Request", request])
                .map(|e| e.child_texts("Format"))
                .unwrap_or_default()
        };

        ServiceInfo {
            title: service.child_text("Title").unwrap_or_default().to_string(),
            description: service.child_text("Abstract").map(str::to_string),
            access_constraints,
            version: self.version,
            keywords: service.child("KeywordList").map(|k| k.child_texts("Keyword")),
            layer_drawing_limit,
            map_formats: formats("GetMap"),
            feature_info_formats: formats("GetFeatureInfo"),
        }
    }

    /// Top-level `Layer` elements, in document order.
    pub fn root_layers(&self) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.capability.children("Layer")
    }
}

/// The message of a `ServiceExceptionReport`, or of a `ServiceException`
/// directly under the root.
pub fn service_exception_message(root: &XmlElement) -> Option<String> {
    let exception = if root.is("ServiceException") {
        Some(root)
    } else {
        root.child("ServiceException")
    };
    match exception {
        Some(e) => Some(
            e.text()
                .or_else(|| e.attr("code"))
                .unwrap_or("No service exception")
                .to_string(),
        ),
        None if root.is("ServiceExceptionReport") => Some("No service exception".to_string()),
        None => None,
    }
}
