//! What a single `Layer` element declares, before inheritance.
//!
//! Extent and dimension encodings differ between WMS 1.1.1 and 1.3.0; each
//! encoding is a variant here and is resolved into the common shape by one
//! function ([`DeclaredExtent::resolve`], [`DeclaredDimensions::resolve`]).

use std::collections::BTreeMap;

use map_geometry::{Extent, GeometryResult, SpatialReference};

use crate::capabilities::WmsVersion;
use crate::layer::{Attribution, Dimension};
use crate::xml::XmlElement;

/// Axis order of `BoundingBox` coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// X (longitude/easting), Y (latitude/northing)
    XY,
    /// Y (latitude), X (longitude)
    LatLon,
}

impl AxisOrder {
    /// WMS 1.3.0 follows the CRS definition, which is latitude first for
    /// EPSG geographic systems. `CRS:84` and all of 1.1.1 are X/Y.
    pub fn for_crs(crs: &str, version: WmsVersion) -> Self {
        let sr = SpatialReference::from_srs(crs);
        let is_epsg = crs.trim().to_ascii_uppercase().starts_with("EPSG:");
        if version == WmsVersion::V1_3_0 && is_epsg && sr.is_geographic() {
            AxisOrder::LatLon
        } else {
            AxisOrder::XY
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredExtent {
    /// 1.3.0 `EX_GeographicBoundingBox`: west, south, east, north in WGS84
    Geographic([String; 4]),
    /// 1.1.1 `LatLonBoundingBox`: minx, miny, maxx, maxy in WGS84
    LatLon([String; 4]),
    /// `BoundingBox` in the CRS it names
    BoundingBox {
        crs: String,
        coords: [String; 4],
        axis_order: AxisOrder,
    },
}

impl DeclaredExtent {
    /// Pick the best declared extent of a layer element, in priority order:
    /// geographic box, lat/lon box, then a `BoundingBox` carrying a CRS
    /// (one in a projectable CRS preferred).
    pub fn from_layer(layer: &XmlElement, version: WmsVersion) -> Option<Self> {
        if let Some(bbox) = layer.child("EX_GeographicBoundingBox") {
            let coords = ["westBoundLongitude", "southBoundLatitude", "eastBoundLongitude", "northBoundLatitude"]
                .map(|name| bbox.child_text(name).unwrap_or_default().to_string());
            return Some(DeclaredExtent::Geographic(coords));
        }

        if let Some(bbox) = layer.child("LatLonBoundingBox") {
            return Some(DeclaredExtent::LatLon(bbox_attributes(bbox)));
        }

        let with_crs: Vec<(&str, &XmlElement)> = layer
            .children("BoundingBox")
            .filter_map(|bbox| {
                let crs = bbox.attr("CRS").or_else(|| bbox.attr("SRS"))?.trim();
                Some((crs, bbox)).filter(|(crs, _)| !crs.is_empty())
            })
            .collect();
        let (crs, bbox) = with_crs
            .iter()
            .find(|(crs, _)| {
                let sr = SpatialReference::from_srs(crs);
                sr.is_web_mercator() || sr.is_geographic()
            })
            .or_else(|| with_crs.first())?;

        Some(DeclaredExtent::BoundingBox {
            crs: crs.to_string(),
            coords: bbox_attributes(bbox),
            axis_order: AxisOrder::for_crs(crs, version),
        })
    }

    /// The declared extent as an [`Extent`] in its own CRS.
    pub fn resolve(&self) -> GeometryResult<Extent> {
        match self {
            DeclaredExtent::Geographic(coords) | DeclaredExtent::LatLon(coords) => {
                Extent::from_strs(coords_ref(coords), SpatialReference::wgs84())
            }
            DeclaredExtent::BoundingBox {
                crs,
                coords,
                axis_order,
            } => {
                let [a, b, c, d] = coords_ref(coords);
                let ordered = match axis_order {
                    AxisOrder::XY => [a, b, c, d],
                    AxisOrder::LatLon => [b, a, d, c],
                };
                Extent::from_strs(ordered, SpatialReference::from_srs(crs))
            }
        }
    }
}

fn bbox_attributes(bbox: &XmlElement) -> [String; 4] {
    ["minx", "miny", "maxx", "maxy"].map(|name| bbox.attr(name).unwrap_or_default().to_string())
}

fn coords_ref(coords: &[String; 4]) -> [&str; 4] {
    [&coords[0], &coords[1], &coords[2], &coords[3]].map(String::as_str)
}

/// Attributes of a `Dimension` or 1.1.1 `Extent` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionDeclaration {
    pub name: Option<String>,
    pub units: Option<String>,
    pub values: Option<String>,
    pub default: Option<String>,
    pub current: bool,
    pub multiple_values: bool,
}

impl DimensionDeclaration {
    fn from_element(element: &XmlElement) -> Self {
        let attr = |name: &str| {
            element
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let flag = |name: &str| {
            element
                .attr(name)
                .is_some_and(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"))
        };
        Self {
            name: attr("name"),
            units: attr("units"),
            values: element.text().map(str::to_string),
            default: attr("default"),
            current: flag("current"),
            multiple_values: flag("multipleValues"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredDimensions {
    /// 1.1.1: `Dimension` declares name and units, an `Extent` of the same
    /// name carries the values
    Split {
        dimensions: Vec<DimensionDeclaration>,
        extents: Vec<DimensionDeclaration>,
    },
    /// 1.3.0: `Dimension` carries its values
    Inline(Vec<DimensionDeclaration>),
}

impl DeclaredDimensions {
    pub fn from_layer(layer: &XmlElement, version: WmsVersion) -> Self {
        let dimensions = layer
            .children("Dimension")
            .map(DimensionDeclaration::from_element)
            .collect();
        match version {
            WmsVersion::V1_1_1 => DeclaredDimensions::Split {
                dimensions,
                extents: layer
                    .children("Extent")
                    .map(DimensionDeclaration::from_element)
                    .collect(),
            },
            WmsVersion::V1_3_0 => DeclaredDimensions::Inline(dimensions),
        }
    }

    /// Dimensions by name. Declarations without a name, units or values
    /// are dropped.
    pub fn resolve(&self) -> BTreeMap<String, Dimension> {
        let (dimensions, extents): (&[DimensionDeclaration], &[DimensionDeclaration]) = match self {
            DeclaredDimensions::Split { dimensions, extents } => (dimensions.as_slice(), extents.as_slice()),
            DeclaredDimensions::Inline(dimensions) => (dimensions.as_slice(), &[]),
        };

        let mut resolved = BTreeMap::new();
        for declared in dimensions {
            let (Some(name), Some(units)) = (&declared.name, &declared.units) else {
                continue;
            };
            let source = extents
                .iter()
                .find(|e| e.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
                .unwrap_or(declared);
            let Some(values) = &source.values else {
                continue;
            };

            resolved.insert(
                name.clone(),
                Dimension {
                    units: units.clone(),
                    default: source.default.clone(),
                    values: values.split(',').map(|v| v.trim().to_string()).collect(),
                    current: source.current,
                    multiple_values: source.multiple_values,
                },
            );
        }
        resolved
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleDeclaration {
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub legend_url: Option<String>,
}

/// Everything a `Layer` element declares about itself.
#[derive(Debug, Clone)]
pub struct LayerDeclaration<'a> {
    pub name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub queryable: bool,
    pub extent: Option<DeclaredExtent>,
    /// `Some` when an `Attribution` block is present, even without a title
    pub attribution: Option<Option<Attribution>>,
    pub styles: Vec<StyleDeclaration>,
    pub spatial_refs: Vec<String>,
    pub dimensions: DeclaredDimensions,
    pub metadata_urls: BTreeMap<String, String>,
    pub children: Vec<&'a XmlElement>,
}

impl<'a> LayerDeclaration<'a> {
    pub fn from_element(layer: &'a XmlElement, version: WmsVersion) -> Self {
        let attribution = layer.child("Attribution").map(|a| {
            a.child_text("Title").map(|title| Attribution {
                title: title.to_string(),
                href: online_resource(a),
            })
        });

        let styles = layer
            .children("Style")
            .map(|style| StyleDeclaration {
                name: style.child_text("Name").map(str::to_string),
                title: style.child_text("Title").map(str::to_string),
                description: style.child_text("Abstract").map(str::to_string),
                legend_url: style.child("LegendURL").and_then(online_resource),
            })
            .collect();

        // 1.1.1 services may list several SRS in one element
        let spatial_refs = layer
            .child_texts("SRS")
            .iter()
            .chain(layer.child_texts("CRS").iter())
            .flat_map(|s| s.split_whitespace())
            .map(str::to_string)
            .collect();

        let metadata_urls = layer
            .children("MetadataURL")
            .filter_map(|md| Some((md.attr("type")?.to_string(), online_resource(md)?)))
            .collect();

        Self {
            name: layer.child_text("Name").map(str::to_string),
            title: layer.child_text("Title").unwrap_or_default().to_string(),
            description: layer.child_text("Abstract").map(str::to_string),
            queryable: layer
                .attr("queryable")
                .is_some_and(|q| q == "1" || q.eq_ignore_ascii_case("true")),
            extent: DeclaredExtent::from_layer(layer, version),
            attribution,
            styles,
            spatial_refs,
            dimensions: DeclaredDimensions::from_layer(layer, version),
            metadata_urls,
            children: layer.children("Layer").collect(),
        }
    }
}

fn online_resource(element: &XmlElement) -> Option<String> {
    element
        .child("OnlineResource")
        .and_then(|r| r.attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}
