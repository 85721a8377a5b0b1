//! NcWMS extensions: per-layer palette metadata and title fixes.
//!
//! NcWMS servers answer `GetMetadata&item=layerDetails` with a JSON record of
//! the layer's palettes, color bands and scale range. Each palette becomes a
//! selectable `boxfill/<palette>` style.

use std::collections::HashMap;
use std::time::Duration;

use map_geometry::{Extent, SpatialReference};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::layer::Style;
use crate::transport::HttpTransport;
use crate::urls::update_url_params;
use crate::{ClientError, ClientResult};

/// The only rendering style this client knows how to request.
pub const BOXFILL_STYLE: &str = "boxfill";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub name: &'static str,
    pub colors: [&'static str; 5],
}

const fn palette(name: &'static str, colors: [&'static str; 5]) -> Palette {
    Palette { name, colors }
}

/// Display names and sample colors of known NcWMS palettes.
static PALETTES: Lazy<HashMap<&'static str, Palette>> = Lazy::new(|| {
    HashMap::from([
        // Custom ncWMS palettes
        ("alg", palette("Algorithmic", ["#CC00FF", "#00FFFF", "#CCFF33", "#FF9900", "#AA0000"])),
        ("alg2", palette("Algorithmic 2", ["#000066", "#00CCFF", "#99FF00", "#FF9900", "#660000"])),
        ("bugnyl", palette("Blue Green Yellow", ["#084081", "#2B8CBE", "#A8DDB5", "#E0F3DB", "#F7FCF0"])),
        ("burd", palette("Blue White Red", ["#2166AC", "#92C5DE", "#FDDBC7", "#D6604D", "#B2182B"])),
        ("buylrd", palette("Blue Yellow Red", ["#4575B4", "#ABD9E9", "#FEE090", "#F46D43", "#D73027"])),
        ("ferret", palette("Ferret", ["#CC00FF", "#00994D", "#FFFF00", "#FF0000", "#990000"])),
        ("gbbr", palette("Green Blue Brown", ["#01665E", "#80CDC1", "#F6E8C3", "#BF812D", "#8C510A"])),
        ("gnrp", palette("Green White Purple", ["#1B7837", "#A6DBA0", "#E7D4E8", "#9970AB", "#762A83"])),
        ("gnylrd", palette("Green Yellow Red", ["#1A9850", "#A6D96A", "#FEE08B", "#F46D43", "#D73027"])),
        ("greyscale", palette("Grey Scale", ["#2B2B2B", "#555555", "#808080", "#AAAAAA", "#FFFFFF"])),
        ("gypi", palette("Green White Pink", ["#4D9221", "#B8E186", "#FDE0EF", "#DE77AE", "#C51B7D"])),
        ("gyrd", palette("Grey White Red", ["#4D4D4D", "#BABABA", "#FDDBC7", "#D6604D", "#B2182B"])),
        ("invblues", palette("Inverted Blues", ["#F7FBFF", "#C6DBEF", "#4292C6", "#08519C", "#08306B"])),
        ("ncview", palette("NcView", ["#00008F", "#008BFF", "#87FF77", "#FF8700", "#8C0000"])),
        ("occam", palette("Occam", ["#511FCC", "#0082D2", "#32C86A", "#A07232", "#781F1F"])),
        ("occam_pastel-30", palette("Occam Pastel", ["#DB58A6", "#5B91DE", "#73C644", "#BDA541", "#FF3233"])),
        ("orpu", palette("Purple White Orange", ["#542788", "#B2ABD2", "#FEE0B6", "#E08214", "#B35806"])),
        ("pastels", palette("Pastels", ["#D6D6FF", "#5A75ED", "#CDDB70", "#E6561E", "#C2915D"])),
        ("rainbow", palette("Rainbow", ["#00008F", "#008BFF", "#87FF77", "#FF8700", "#8C0000"])),
        ("redblue", palette("Blue White Red", ["#0000FF", "#5555FF", "#AAAAFF", "#FFFFFF", "#FF0000"])),
        ("sst_36", palette("Sea Surface Temperature", ["#000099", "#0082E3", "#D7D400", "#FB6C00", "#990000"])),
        ("ylbu", palette("Yellow Blue", ["#FFFFD9", "#C7E9B4", "#1D91C0", "#253494", "#081D58"])),
        // Color Brewer palettes
        ("blues", palette("Blues", ["#EFF3FF", "#BDD7E7", "#6BAED6", "#3182BD", "#08519C"])),
        ("brbg", palette("Brown White Blue-green", ["#A6611A", "#DFC27D", "#F5F5F5", "#80CDC1", "#018571"])),
        ("bugn", palette("Blue Green", ["#EDF8FB", "#B2E2E2", "#66C2A4", "#2CA25F", "#006D2C"])),
        ("bupu", palette("White Blue Purple", ["#EDF8FB", "#B3CDE3", "#8C96C6", "#8856A7", "#810F7C"])),
        ("gnbu", palette("Green Blue", ["#F0F9E8", "#BAE4BC", "#7BCCC4", "#43A2CA", "#0868AC"])),
        ("greens", palette("Greens", ["#EDF8E9", "#BAE4B3", "#74C476", "#31A354", "#006D2C"])),
        ("greys", palette("Greys", ["#F7F7F7", "#CCCCCC", "#969696", "#636363", "#252525"])),
        ("oranges", palette("Oranges", ["#FEEDDE", "#FDBE85", "#FD8D3C", "#E6550D", "#A63603"])),
        ("orrd", palette("White Orange Red", ["#FEF0D9", "#FDCC8A", "#FC8D59", "#E34A33", "#B30000"])),
        ("piyg", palette("Pink Yellow Green", ["#D01C8B", "#F1B6DA", "#F7F7F7", "#B8E186", "#4DAC26"])),
        ("prgn", palette("Purple White Green", ["#7B3294", "#C2A5CF", "#F7F7F7", "#A6DBA0", "#008837"])),
        ("pubu", palette("White Purple Blue", ["#F1EEF6", "#BDC9E1", "#74A9CF", "#2B8CBE", "#045A8D"])),
        ("pubugn", palette("White Purple Blue-green", ["#F6EFF7", "#BDC9E1", "#67A9CF", "#1C9099", "#016C59"])),
        ("puor", palette("Purple White Orange", ["#E66101", "#FDB863", "#F7F7F7", "#B2ABD2", "#5E3C99"])),
        ("purd", palette("White Purple Red", ["#F1EEF6", "#D7B5D8", "#DF65B0", "#DD1C77", "#980043"])),
        ("purples", palette("Purples", ["#F2F0F7", "#CBC9E2", "#9E9AC8", "#756BB1", "#54278F"])),
        ("rdbu", palette("Red White Blue", ["#CA0020", "#F4A582", "#F7F7F7", "#92C5DE", "#0571B0"])),
        ("rdgy", palette("Red White Grey", ["#CA0020", "#F4A582", "#FFFFFF", "#BABABA", "#404040"])),
        ("rdpu", palette("White Red Purple", ["#FEEBE2", "#FBB4B9", "#F768A1", "#C51B8A", "#7A0177"])),
        ("rdylbu", palette("Red Yellow Blue", ["#D7191C", "#FDAE61", "#FFFFBF", "#ABD9E9", "#2C7BB6"])),
        ("rdylgn", palette("Red Yellow Green", ["#D7191C", "#FDAE61", "#FFFFBF", "#A6D96A", "#1A9641"])),
        ("reds", palette("Reds", ["#FEE5D9", "#FCAE91", "#FB6A4A", "#DE2D26", "#A50F15"])),
        ("spectral", palette("Spectral", ["#D7191C", "#FDAE61", "#FFFFBF", "#ABDDA4", "#2B83BA"])),
        ("ylgn", palette("Yellow Green", ["#FFFFCC", "#C2E699", "#78C679", "#31A354", "#006837"])),
        ("ylgnbu", palette("Yellow Green Blue", ["#FFFFCC", "#A1DAB4", "#41B6C4", "#2C7FB8", "#253494"])),
        ("ylorbr", palette("Yellow Orange Brown", ["#FFFFD4", "#FED98E", "#FE9929", "#D95F0E", "#993404"])),
        ("ylorrd", palette("Yellow Orange Red", ["#FFFFB2", "#FECC5C", "#FD8D3C", "#F03B20", "#BD0026"])),
    ])
});

/// Look up a palette by its (case-insensitive) NcWMS name.
pub fn palette_info(name: &str) -> Option<&'static Palette> {
    PALETTES.get(name.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendInfo {
    pub color_bands: u32,
    pub scale_range: Vec<f64>,
    pub log_scaling: bool,
    pub legend_units: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NcwmsMetadata {
    pub units: Option<String>,
    pub copyright_text: Option<String>,
    pub more_info: Option<String>,
    pub num_color_bands: u32,
    pub log_scaling: bool,
    pub scale_range: Vec<f64>,
    pub default_palette: Option<String>,
    pub palettes: Vec<String>,
    pub supported_styles: Vec<String>,
    pub default_style: Option<String>,
    pub legend_info: LegendInfo,
    /// The layer's bounding box in Web Mercator
    pub full_extent: Option<Extent>,
    /// One `boxfill/<palette>` style per palette, sorted by title
    pub styles: Vec<Style>,
}

/// Response of a `layerDetails` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayerDetails {
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    bbox: Option<Vec<Value>>,
    #[serde(default)]
    scale_range: Vec<Value>,
    #[serde(default)]
    num_color_bands: Option<u32>,
    #[serde(default)]
    log_scaling: bool,
    #[serde(default)]
    palettes: Vec<String>,
    #[serde(default)]
    default_palette: Option<String>,
    #[serde(default = "default_supported_styles")]
    supported_styles: Vec<String>,
    #[serde(default)]
    copyright: Option<String>,
    #[serde(default)]
    more_info: Option<String>,
}

fn default_supported_styles() -> Vec<String> {
    vec![BOXFILL_STYLE.to_string()]
}

pub fn layer_details_query(layer_id: &str) -> Vec<(String, String)> {
    vec![
        ("request".to_string(), "GetMetadata".to_string()),
        ("item".to_string(), "layerDetails".to_string()),
        ("layerName".to_string(), layer_id.to_string()),
    ]
}

/// Fetch and interpret the `layerDetails` record of one layer.
pub async fn fetch_layer_metadata(
    transport: &dyn HttpTransport,
    wms_url: &str,
    layer_id: &str,
    timeout: Duration,
) -> ClientResult<NcwmsMetadata> {
    let response = transport
        .get(wms_url, &layer_details_query(layer_id), timeout)
        .await
        .map_err(|e| ClientError::transport(e, wms_url))?;

    if !response.is_success() {
        return Err(ClientError::HttpStatus {
            status: response.status,
            url: response.url,
        });
    }

    let details: LayerDetails = serde_json::from_slice(&response.body).map_err(|e| ClientError::Content {
        message: "Invalid NcWMS layer details".to_string(),
        url: response.url.clone(),
        source: Some(Box::new(e)),
    })?;

    NcwmsMetadata::from_details(details, layer_id, wms_url)
}

impl NcwmsMetadata {
    fn from_details(details: LayerDetails, layer_id: &str, wms_url: &str) -> ClientResult<Self> {
        if !details.supported_styles.iter().any(|s| s.eq_ignore_ascii_case(BOXFILL_STYLE)) {
            return Err(ClientError::Validation {
                message: format!(
                    "Layer {} does not support boxfill style (supports {})",
                    layer_id,
                    details.supported_styles.join(",")
                ),
                url: wms_url.to_string(),
            });
        }

        let full_extent = match &details.bbox {
            Some(bbox) => Some(
                Extent::from_value(&Value::from(bbox.clone()), Some(&SpatialReference::wgs84()))
                    .and_then(|e| e.project_to_web_mercator())
                    .map_err(|e| ClientError::bad_extent("Invalid NcWMS layer bounding box", wms_url, e))?,
            ),
            None => None,
        };

        let scale_range: Vec<f64> = details.scale_range.iter().filter_map(value_to_f64).collect();
        let num_color_bands = details.num_color_bands.unwrap_or(0);
        let palettes: Vec<String> = details.palettes.iter().map(|p| p.to_ascii_lowercase()).collect();

        let color_bar_only = if num_color_bands > 0 { "true" } else { "false" };
        let mut styles: Vec<Style> = palettes
            .iter()
            .map(|name| {
                let known = palette_info(name);
                Style {
                    id: format!("{}/{}", BOXFILL_STYLE, name),
                    title: known.map(|p| p.name.to_string()).unwrap_or_else(|| name.clone()),
                    description: None,
                    legend_url: Some(update_url_params(
                        wms_url,
                        &[
                            ("palette", name.as_str()),
                            ("request", "GetLegendGraphic"),
                            ("layer", layer_id),
                            ("colorbaronly", color_bar_only),
                        ],
                    )),
                    colors: known.map(|p| p.colors.iter().map(|c| c.to_string()).collect()),
                }
            })
            .collect();
        styles.sort_by_key(|s| s.title.to_lowercase());

        Ok(Self {
            legend_info: LegendInfo {
                color_bands: num_color_bands,
                scale_range: scale_range.clone(),
                log_scaling: details.log_scaling,
                legend_units: details.units.clone().unwrap_or_default(),
            },
            default_style: details
                .default_palette
                .as_ref()
                .map(|p| format!("{}/{}", BOXFILL_STYLE, p.to_ascii_lowercase())),
            units: details.units,
            copyright_text: details.copyright,
            more_info: details.more_info,
            num_color_bands,
            log_scaling: details.log_scaling,
            scale_range,
            default_palette: details.default_palette,
            palettes,
            supported_styles: details.supported_styles,
            full_extent,
            styles,
        })
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// NcWMS group titles are often just the dataset name: qualify `title` with
/// a fragment of a layer id, skipping a fragment the title already contains.
pub fn append_title_fragment(title: &str, fragment: &str) -> String {
    let mut fragment = fragment;
    if fragment.to_lowercase().starts_with(&title.to_lowercase()) {
        fragment = fragment.get(title.len()..).unwrap_or_default().trim_matches('_');
    }
    let mut title = title.to_string();
    if !title.contains(fragment) {
        debug!(title = %title, fragment = %fragment, "Qualifying NcWMS layer title");
        title = format!("{} ({})", title, fragment);
    }
    title.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WMS_URL: &str = "http://example.com/ncWMS/wms";

    fn details(json: &str) -> LayerDetails {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_palette_lookup() {
        assert_eq!(palette_info("RAINBOW").map(|p| p.name), Some("Rainbow"));
        assert_eq!(palette_info("occam_pastel-30").map(|p| p.colors[0]), Some("#DB58A6"));
        assert!(palette_info("unknown").is_none());
    }

    #[test]
    fn test_metadata_from_details() {
        let metadata = NcwmsMetadata::from_details(
            details(
                r#"{
                    "units": "K",
                    "bbox": ["-180", "-90", "180", "90"],
                    "scaleRange": [270.0, "310.5"],
                    "numColorBands": 254,
                    "logScaling": false,
                    "palettes": ["rainbow", "Greyscale", "custom"],
                    "defaultPalette": "Rainbow",
                    "copyright": "Public domain",
                    "moreInfo": "http://example.com/info"
                }"#,
            ),
            "ocean/sst",
            WMS_URL,
        )
        .unwrap();

        assert_eq!(metadata.default_style.as_deref(), Some("boxfill/rainbow"));
        assert_eq!(metadata.scale_range, vec![270.0, 310.5]);
        assert_eq!(metadata.supported_styles, vec!["boxfill"]);
        assert_eq!(metadata.legend_info.legend_units, "K");
        assert_eq!(metadata.legend_info.color_bands, 254);
        assert!(metadata.full_extent.unwrap().spatial_reference.is_web_mercator());

        let titles: Vec<&str> = metadata.styles.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["custom", "Grey Scale", "Rainbow"]);

        let rainbow = &metadata.styles[2];
        assert_eq!(rainbow.id, "boxfill/rainbow");
        assert_eq!(rainbow.colors.as_ref().map(|c| c.len()), Some(5));
        let legend = rainbow.legend_url.as_deref().unwrap();
        assert!(legend.starts_with(WMS_URL));
        assert!(legend.contains("palette=rainbow"));
        assert!(legend.contains("request=GetLegendGraphic"));
        assert!(legend.contains("layer=ocean%2Fsst"));
        assert!(legend.contains("colorbaronly=true"));
    }

    #[test]
    fn test_boxfill_required() {
        let result = NcwmsMetadata::from_details(
            details(r#"{"supportedStyles": ["vector"], "palettes": []}"#),
            "ocean/currents",
            WMS_URL,
        );
        assert!(matches!(result, Err(ClientError::Validation { .. })));
    }

    #[test]
    fn test_append_title_fragment() {
        assert_eq!(append_title_fragment("Ocean", "sst"), "Ocean (sst)");
        assert_eq!(append_title_fragment("Sea surface temp", "temp"), "Sea surface temp");
        assert_eq!(append_title_fragment("ocean", "ocean_model"), "ocean (model)");
        assert_eq!(append_title_fragment("Ocean", "sea_ice"), "Ocean (sea ice)");
    }
}
