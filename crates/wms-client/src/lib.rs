//! Client for OGC Web Map Services.
//!
//! Supports:
//! - WMS 1.1.1 and WMS 1.3.0 GetCapabilities parsing into a layer tree
//! - NcWMS per-layer palette metadata
//! - GetMap requests, including extents that cross the anti-meridian

pub mod capabilities;
pub mod compositor;
pub mod config;
pub mod declaration;
pub mod error;
pub mod layer;
pub mod layer_tree;
pub mod ncwms;
pub mod service;
pub mod transport;
pub mod urls;
pub mod xml;

pub use capabilities::{ServiceInfo, WmsVersion};
pub use compositor::GetImageRequest;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use layer::{Attribution, Dimension, LayerId, LayerNode, Style};
pub use layer_tree::LayerTree;
pub use ncwms::{LegendInfo, NcwmsMetadata};
pub use service::{ServiceDescriptor, WmsClient};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
