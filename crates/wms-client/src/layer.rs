//! Resolved layer records.

use std::collections::BTreeMap;

use map_geometry::Extent;
use serde::Serialize;

use crate::capabilities::WmsVersion;
use crate::ncwms::NcwmsMetadata;

/// Handle of a layer inside its [`LayerTree`](crate::layer_tree::LayerTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Style {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub description: Option<String>,
    #[serde(rename = "legendURL")]
    pub legend_url: Option<String>,
    /// Representative palette colors, for NcWMS palettes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub title: String,
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub units: String,
    pub default: Option<String>,
    pub values: Vec<String>,
    pub current: bool,
    pub multiple_values: bool,
}

/// A layer with inheritance applied.
///
/// Nodes with children are groups; leaves always carry an id and an extent.
/// `full_extent` is in Web Mercator.
#[derive(Debug, Clone)]
pub struct LayerNode {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub version: WmsVersion,
    pub supports_query: bool,

    pub full_extent: Option<Extent>,
    pub styles: Vec<Style>,
    /// Sorted CRS identifiers
    pub supported_spatial_refs: Vec<String>,
    pub dimensions: BTreeMap<String, Dimension>,
    pub attribution: Option<Attribution>,
    pub metadata_urls: BTreeMap<String, String>,

    pub parent: Option<LayerId>,
    pub child_layers: Vec<LayerId>,
    /// Every leaf below this node, by id
    pub leaf_layers: BTreeMap<String, LayerId>,

    pub layer_order: Option<usize>,
    pub parent_order: Option<usize>,

    pub is_old_version: bool,
    pub has_time: bool,
    pub has_dimensions: bool,
    pub is_ncwms: bool,

    pub default_style: Option<String>,
    /// Palette and legend details fetched from an NcWMS server
    pub ncwms: Option<NcwmsMetadata>,
}

impl LayerNode {
    pub fn is_group(&self) -> bool {
        !self.child_layers.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.child_layers.is_empty()
    }
}
