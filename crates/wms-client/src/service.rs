//! Service entry point: capability parsing and the parsed service record.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use map_geometry::{union_extent, Extent};
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{service_exception_message, ValidatedCapabilities, WmsVersion};
use crate::compositor::{GetImageRequest, ImageCompositor};
use crate::config::ClientConfig;
use crate::layer::{LayerId, LayerNode};
use crate::layer_tree::LayerTree;
use crate::ncwms::fetch_layer_metadata;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::urls::ServiceUrl;
use crate::xml::XmlElement;
use crate::{ClientError, ClientResult};

/// Web Mercator aliases a service may advertise.
pub const WEB_MERCATOR_ALIASES: [&str; 4] = ["EPSG:3857", "EPSG:3785", "EPSG:900913", "EPSG:102113"];

/// Entry point for reading WMS services.
#[derive(Clone)]
pub struct WmsClient {
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
}

impl WmsClient {
    /// Create a client over a default `reqwest` transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::default()), config)
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch and parse the capability document of the service at `url`.
    ///
    /// `version_hint` overrides the configured protocol version for this call.
    /// For NcWMS services this also fetches the details of every leaf layer.
    #[instrument(skip(self), fields(version = tracing::field::Empty))]
    pub async fn parse_service(&self, url: &str, version_hint: Option<&str>) -> ClientResult<ServiceDescriptor> {
        let service_url = ServiceUrl::parse(url, self.config.token.as_deref())?;
        let wms_url = service_url.wms_url.as_str();

        let version = version_hint
            .or(self.config.version.as_deref())
            .unwrap_or(WmsVersion::default().as_str());
        tracing::Span::current().record("version", version);

        let query = vec![
            ("service".to_string(), "WMS".to_string()),
            ("request".to_string(), "GetCapabilities".to_string()),
            ("version".to_string(), version.to_string()),
        ];
        let response = self
            .transport
            .get(wms_url, &query, self.config.request_timeout())
            .await
            .map_err(|e| ClientError::transport(e, wms_url))?;

        let root = XmlElement::parse(&response.body);
        if !response.is_success() {
            let exception = root.as_ref().ok().and_then(service_exception_message);
            return Err(match exception {
                Some(message) => ClientError::ServiceException {
                    message,
                    url: wms_url.to_string(),
                },
                None => ClientError::HttpStatus {
                    status: response.status,
                    url: wms_url.to_string(),
                },
            });
        }
        let root = root.map_err(|e| ClientError::Content {
            message: "The WMS service did not return valid XML".to_string(),
            url: wms_url.to_string(),
            source: Some(Box::new(e)),
        })?;

        let capabilities = ValidatedCapabilities::validate(&root, wms_url)?;
        let descriptor = self.describe(&capabilities, &service_url).await?;

        info!(
            title = %descriptor.title,
            version = %descriptor.version,
            layers = descriptor.leaf_layers.len(),
            spatial_ref = ?descriptor.spatial_ref,
            "Parsed WMS service"
        );
        Ok(descriptor)
    }

    async fn describe(
        &self,
        capabilities: &ValidatedCapabilities<'_>,
        service_url: &ServiceUrl,
    ) -> ClientResult<ServiceDescriptor> {
        let wms_url = service_url.wms_url.as_str();
        let info = capabilities.service_info();
        let mut tree = LayerTree::build(capabilities.root_layers(), capabilities.version, service_url)?;

        let document_roots = tree.roots().to_vec();
        let leaf_layers = tree.leaf_layers(&document_roots);
        if leaf_layers.is_empty() {
            return Err(ClientError::NoLayers {
                url: wms_url.to_string(),
            });
        }

        // A lone root group stands for the service itself
        let root_layers = match document_roots.as_slice() {
            [root] if tree[*root].is_group() => tree[*root].child_layers.clone(),
            roots => roots.to_vec(),
        };

        let ordered_layers = tree.assign_render_order(&root_layers);
        if service_url.is_ncwms {
            self.load_ncwms_metadata(&mut tree, &ordered_layers, wms_url).await;
        }

        let full_extent = union_extent(root_layers.iter().map(|id| tree[*id].full_extent.as_ref()))
            .ok_or_else(|| ClientError::NoLayers {
                url: wms_url.to_string(),
            })?;

        let leaves: Vec<&LayerNode> = leaf_layers.values().map(|id| &tree[*id]).collect();
        let has_dimensions = leaves.iter().any(|l| l.has_dimensions);
        let has_time = leaves.iter().any(|l| l.has_dimensions && l.has_time);
        let supported_spatial_refs: Vec<String> = leaves
            .iter()
            .flat_map(|l| l.supported_spatial_refs.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let spatial_ref = choose_spatial_ref(&supported_spatial_refs, &self.config.preferred_spatial_ref);
        if spatial_ref.is_none() {
            warn!(title = %info.title, url = %wms_url, "The WMS service does not support Web Mercator");
        }

        Ok(ServiceDescriptor {
            title: info.title,
            description: info.description,
            access_constraints: info.access_constraints,
            version: info.version,
            feature_info_formats: info.feature_info_formats,
            map_formats: info.map_formats,
            keywords: info.keywords,
            layer_drawing_limit: info.layer_drawing_limit,
            full_extent,
            has_dimensions,
            has_time,
            is_ncwms: service_url.is_ncwms,
            supported_spatial_refs,
            spatial_ref,
            wms_url: service_url.wms_url.clone(),
            behind_proxy: service_url.behind_proxy,
            tree,
            root_layers,
            leaf_layers,
            ordered_layers,
            transport: Arc::clone(&self.transport),
            image_timeout: self.config.image_timeout(),
        })
    }

    /// One metadata request per leaf, in render order. Failures leave the
    /// leaf without NcWMS details.
    async fn load_ncwms_metadata(&self, tree: &mut LayerTree, ordered: &[LayerId], wms_url: &str) {
        for id in ordered {
            let node = &tree[*id];
            let Some(layer_id) = node.id.clone().filter(|_| node.is_leaf()) else {
                continue;
            };

            match fetch_layer_metadata(self.transport.as_ref(), wms_url, &layer_id, self.config.request_timeout()).await {
                Ok(metadata) => {
                    debug!(layer = %layer_id, palettes = metadata.palettes.len(), "Loaded NcWMS layer details");
                    tree.apply_ncwms_metadata(*id, metadata);
                }
                Err(e) => {
                    warn!(layer = %layer_id, error = %e, "NcWMS layer details unavailable");
                }
            }
        }
    }
}

impl fmt::Debug for WmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WmsClient").field("config", &self.config).finish()
    }
}

/// The preferred alias if supported, else the first supported alias in
/// lexical order.
pub fn choose_spatial_ref(supported: &[String], preferred: &str) -> Option<String> {
    let mut aliases: Vec<&str> = WEB_MERCATOR_ALIASES
        .iter()
        .copied()
        .filter(|alias| supported.iter().any(|s| s == alias))
        .collect();
    aliases.sort_unstable();

    if aliases.contains(&preferred) {
        Some(preferred.to_string())
    } else {
        aliases.first().map(|alias| alias.to_string())
    }
}

/// A parsed WMS service: flat service fields plus the layer tree.
pub struct ServiceDescriptor {
    pub title: String,
    pub description: Option<String>,
    pub access_constraints: Option<String>,
    pub version: WmsVersion,
    pub feature_info_formats: Vec<String>,
    pub map_formats: Vec<String>,
    pub keywords: Option<Vec<String>>,
    pub layer_drawing_limit: Option<u32>,
    /// Union of all layer extents, in Web Mercator
    pub full_extent: Extent,
    pub has_dimensions: bool,
    pub has_time: bool,
    pub is_ncwms: bool,
    /// Sorted union of the leaves' CRS identifiers
    pub supported_spatial_refs: Vec<String>,
    /// CRS used for image requests; `None` when no Web Mercator alias is supported
    pub spatial_ref: Option<String>,
    pub wms_url: String,
    pub behind_proxy: bool,

    tree: LayerTree,
    root_layers: Vec<LayerId>,
    leaf_layers: BTreeMap<String, LayerId>,
    ordered_layers: Vec<LayerId>,

    transport: Arc<dyn HttpTransport>,
    image_timeout: Duration,
}

impl ServiceDescriptor {
    pub fn layers(&self) -> &LayerTree {
        &self.tree
    }

    pub fn root_layers(&self) -> impl Iterator<Item = &LayerNode> {
        self.root_layers.iter().map(|id| &self.tree[*id])
    }

    /// Renderable layers by id.
    pub fn leaf_layers(&self) -> impl Iterator<Item = (&str, &LayerNode)> {
        self.leaf_layers.iter().map(|(k, id)| (k.as_str(), &self.tree[*id]))
    }

    pub fn leaf_layer(&self, layer_id: &str) -> Option<&LayerNode> {
        self.leaf_layers.get(layer_id).map(|id| &self.tree[*id])
    }

    /// The root layers and all their descendants, in render order.
    pub fn ordered_layers(&self) -> impl Iterator<Item = &LayerNode> {
        self.ordered_layers.iter().map(|id| &self.tree[*id])
    }

    /// Render the requested layers into one image of `request.width` x
    /// `request.height` pixels.
    pub async fn get_image(&self, request: &GetImageRequest) -> ClientResult<RgbaImage> {
        let compositor = ImageCompositor {
            transport: self.transport.as_ref(),
            wms_url: &self.wms_url,
            version: self.version,
            spatial_ref: self.spatial_ref.as_deref(),
            supported_spatial_refs: &self.supported_spatial_refs,
            map_formats: &self.map_formats,
            timeout: self.image_timeout,
        };
        compositor.render(request).await
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("title", &self.title)
            .field("version", &self.version)
            .field("wms_url", &self.wms_url)
            .field("full_extent", &self.full_extent)
            .field("spatial_ref", &self.spatial_ref)
            .field("leaf_layers", &self.leaf_layers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
