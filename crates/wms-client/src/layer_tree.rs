//! Arena of layer nodes built from nested `Layer` elements.
//!
//! Nodes are stored in construction order and addressed by [`LayerId`].
//! Parents own their children through `child_layers`; the `parent` handle is
//! only read while inheriting attribution, styles, spatial references and
//! extent during construction.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use map_geometry::{union_extent, Extent};
use tracing::{debug, warn};

use crate::capabilities::WmsVersion;
use crate::declaration::LayerDeclaration;
use crate::layer::{LayerId, LayerNode, Style};
use crate::ncwms::{append_title_fragment, NcwmsMetadata};
use crate::urls::{query_params, update_url_params, ServiceUrl};
use crate::xml::XmlElement;
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, Default)]
pub struct LayerTree {
    nodes: Vec<LayerNode>,
    roots: Vec<LayerId>,
}

impl LayerTree {
    /// Build one subtree per root element, in document order.
    pub fn build<'a, I>(roots: I, version: WmsVersion, service_url: &ServiceUrl) -> ClientResult<Self>
    where
        I: IntoIterator<Item = &'a XmlElement>,
    {
        let mut builder = LayerTreeBuilder {
            version,
            service_url,
            nodes: Vec::new(),
        };
        let roots = roots
            .into_iter()
            .map(|element| builder.build_layer(element, None))
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(Self {
            nodes: builder.nodes,
            roots,
        })
    }

    pub fn get(&self, id: LayerId) -> Option<&LayerNode> {
        self.nodes.get(id.0)
    }

    /// Top-level layers of the document.
    pub fn roots(&self) -> &[LayerId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &LayerNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (LayerId(i), node))
    }

    pub fn children(&self, id: LayerId) -> impl Iterator<Item = &LayerNode> {
        self.get(id)
            .map(|node| node.child_layers.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// Every leaf reachable from `roots`, by layer id. A root that is itself
    /// a leaf is included.
    pub fn leaf_layers(&self, roots: &[LayerId]) -> BTreeMap<String, LayerId> {
        let mut leaves = BTreeMap::new();
        for root in roots {
            let Some(node) = self.get(*root) else { continue };
            if node.is_leaf() {
                if let Some(id) = &node.id {
                    leaves.insert(id.clone(), *root);
                }
            }
            leaves.extend(node.leaf_layers.iter().map(|(k, v)| (k.clone(), *v)));
        }
        leaves
    }

    /// Find a layer by its declared name.
    pub fn find(&self, layer_id: &str) -> Option<(LayerId, &LayerNode)> {
        self.iter().find(|(_, node)| node.id.as_deref() == Some(layer_id))
    }

    /// Assign `layer_order` and `parent_order` depth first from `roots`,
    /// visiting siblings last-declared first. Returns the visit order.
    pub fn assign_render_order(&mut self, roots: &[LayerId]) -> Vec<LayerId> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<LayerId> = roots.to_vec();

        // Stack pops from the end, so pushing in declaration order visits
        // the last sibling first
        while let Some(id) = stack.pop() {
            let parent_order = self.nodes[id.0].parent.and_then(|p| self.nodes[p.0].layer_order);
            let node = &mut self.nodes[id.0];
            node.layer_order = Some(ordered.len());
            node.parent_order = parent_order;
            ordered.push(id);
            stack.extend(node.child_layers.iter().copied());
        }
        ordered
    }

    /// Replace a leaf's styles with those derived from NcWMS metadata.
    pub fn apply_ncwms_metadata(&mut self, id: LayerId, metadata: NcwmsMetadata) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.styles = metadata.styles.clone();
            node.default_style = metadata.default_style.clone();
            node.ncwms = Some(metadata);
        }
    }
}

impl Index<LayerId> for LayerTree {
    type Output = LayerNode;

    fn index(&self, id: LayerId) -> &LayerNode {
        &self.nodes[id.0]
    }
}

struct LayerTreeBuilder<'u> {
    version: WmsVersion,
    service_url: &'u ServiceUrl,
    nodes: Vec<LayerNode>,
}

impl LayerTreeBuilder<'_> {
    fn url(&self) -> &str {
        &self.service_url.wms_url
    }

    fn build_layer(&mut self, element: &XmlElement, parent: Option<LayerId>) -> ClientResult<LayerId> {
        let declared = LayerDeclaration::from_element(element, self.version);
        let parent_node = parent.map(|p| &self.nodes[p.0]);

        let attribution = match &declared.attribution {
            Some(own) => own.clone(),
            None => parent_node.and_then(|p| p.attribution.clone()),
        };

        let full_extent = self.resolve_extent(&declared, parent_node.and_then(|p| p.full_extent.as_ref()))?;

        let mut styles: Vec<Style> = parent_node.map(|p| p.styles.clone()).unwrap_or_default();
        styles.extend(self.own_styles(&declared));

        let supported_spatial_refs: BTreeSet<String> = parent_node
            .map(|p| p.supported_spatial_refs.clone())
            .unwrap_or_default()
            .into_iter()
            .chain(declared.spatial_refs.iter().cloned())
            .collect();

        let dimensions = declared.dimensions.resolve();

        let id = LayerId(self.nodes.len());
        self.nodes.push(LayerNode {
            title: declared.title.clone(),
            description: declared.description.clone(),
            version: self.version,
            supports_query: declared.queryable,
            full_extent,
            styles,
            supported_spatial_refs: supported_spatial_refs.into_iter().collect(),
            has_dimensions: !dimensions.is_empty(),
            has_time: dimensions.contains_key("time"),
            dimensions,
            attribution,
            metadata_urls: declared.metadata_urls.clone(),
            parent,
            child_layers: Vec::new(),
            leaf_layers: BTreeMap::new(),
            layer_order: None,
            parent_order: None,
            is_old_version: self.version.is_old(),
            is_ncwms: self.service_url.is_ncwms,
            default_style: None,
            ncwms: None,
            id: declared.name.clone(),
        });

        for child_element in &declared.children {
            let child = self.build_layer(child_element, Some(id))?;

            let child_node = &self.nodes[child.0];
            let mut leaves = child_node.leaf_layers.clone();
            if child_node.is_leaf() {
                if let Some(child_id) = &child_node.id {
                    leaves.insert(child_id.clone(), child);
                }
            }
            let child_extent = child_node.full_extent.clone();

            let node = &mut self.nodes[id.0];
            node.child_layers.push(child);
            node.full_extent = union_extent([node.full_extent.as_ref(), child_extent.as_ref()]);
            node.leaf_layers.extend(leaves);
        }

        if self.service_url.is_ncwms {
            self.qualify_ncwms_title(id);
        }
        Ok(id)
    }

    /// A declared extent wins over the parent's; either way the result is in
    /// Web Mercator. Leaves must end up with an extent and an id.
    fn resolve_extent(&self, declared: &LayerDeclaration<'_>, inherited: Option<&Extent>) -> ClientResult<Option<Extent>> {
        let layer_name = declared.name.as_deref().unwrap_or(&declared.title);

        let extent = match &declared.extent {
            Some(own) => {
                let extent = own.resolve().map_err(|e| {
                    ClientError::bad_extent(format!("Invalid extent for WMS layer \"{}\"", layer_name), self.url(), e)
                })?;
                Some(extent.project_to_web_mercator().map_err(|e| {
                    ClientError::bad_extent(
                        format!("Error reprojecting extent for WMS layer \"{}\"", layer_name),
                        self.url(),
                        e,
                    )
                })?)
            }
            None => inherited.cloned(),
        };

        if declared.children.is_empty() {
            if declared.name.is_none() {
                return Err(ClientError::Validation {
                    message: format!("WMS layer \"{}\" has no name", declared.title),
                    url: self.url().to_string(),
                });
            }
            if extent.is_none() {
                return Err(ClientError::BadExtent {
                    message: format!("Extent required for WMS layer \"{}\"", layer_name),
                    url: self.url().to_string(),
                    source: None,
                });
            }
        }
        Ok(extent)
    }

    fn own_styles(&self, declared: &LayerDeclaration<'_>) -> Vec<Style> {
        declared
            .styles
            .iter()
            .filter_map(|style| {
                let Some(name) = &style.name else {
                    warn!(layer = ?declared.name, url = %self.url(), "Style missing name for WMS layer");
                    return None;
                };

                // Internal legend hosts are unreachable through a proxy
                let legend_url = style.legend_url.as_ref().map(|legend| {
                    if self.service_url.behind_proxy {
                        debug!(legend = %legend, "Routing legend URL through proxy");
                        let params = query_params(legend);
                        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                        update_url_params(self.url(), &params)
                    } else {
                        legend.clone()
                    }
                });

                Some(Style {
                    id: name.clone(),
                    title: style.title.clone().unwrap_or_else(|| name.clone()),
                    description: style.description.clone(),
                    legend_url,
                    colors: None,
                })
            })
            .collect()
    }

    /// NcWMS group titles tend to repeat the dataset name: add the variable
    /// (leaves) or dataset (groups) fragment of the layer ids.
    fn qualify_ncwms_title(&mut self, id: LayerId) {
        let node = &self.nodes[id.0];
        let fragment = if node.is_leaf() {
            node.id.as_deref().and_then(|i| i.split('/').nth(1))
        } else {
            node.child_layers
                .first()
                .map(|first| &self.nodes[first.0])
                .filter(|first| first.is_leaf())
                .and_then(|first| first.id.as_deref())
                .filter(|first_id| first_id.contains('/'))
                .and_then(|first_id| first_id.split('/').next())
        };

        if let Some(fragment) = fragment {
            let title = append_title_fragment(&node.title, fragment);
            self.nodes[id.0].title = title;
        }
    }
}
