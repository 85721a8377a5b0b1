//! Tests for the layer tree of parsed services: inheritance, render order
//! and NcWMS layer details.

mod common;

use common::*;
use wms_client::{ClientConfig, LayerNode, ServiceDescriptor, TransportError, WmsClient};

async fn parse(document: &'static str) -> ServiceDescriptor {
    WmsClient::with_transport(MockTransport::serving(document), ClientConfig::default())
        .parse_service(WMS_URL, None)
        .await
        .unwrap()
}

fn ids<'a>(layers: impl Iterator<Item = &'a LayerNode>) -> Vec<&'a str> {
    layers.map(|l| l.id.as_deref().unwrap_or(l.title.as_str())).collect()
}

// ============================================================================
// Structure tests
// ============================================================================

#[tokio::test]
async fn test_single_root_is_unwrapped() {
    let service = parse(WMS_1_3_0).await;

    assert_eq!(ids(service.root_layers()), vec!["temperature", "Precipitation"]);
    let leaves: Vec<&str> = service.leaf_layers().map(|(id, _)| id).collect();
    assert_eq!(leaves, vec!["precip_rate", "precip_total", "temperature"]);

    let tree = service.layers();
    let root = tree.roots()[0];
    assert_eq!(tree[root].title, "Weather");
    assert_eq!(tree[root].leaf_layers.len(), 3);
    assert_eq!(tree.children(root).count(), 2);
}

#[tokio::test]
async fn test_inherited_fields() {
    let service = parse(WMS_1_3_0).await;

    let temperature = service.leaf_layer("temperature").unwrap();
    assert!(temperature.supports_query);
    assert_eq!(temperature.description.as_deref(), Some("Air temperature at 2 m"));
    assert_eq!(
        temperature.attribution.as_ref().map(|a| a.title.as_str()),
        Some("National Weather Service")
    );
    assert_eq!(
        temperature.metadata_urls.get("ISO19115:2003").map(String::as_str),
        Some("https://weather.example.com/metadata/temperature.xml")
    );
    assert_eq!(temperature.styles.len(), 1);
    assert_eq!(temperature.styles[0].title, "Default");
    assert_eq!(
        temperature.styles[0].legend_url.as_deref(),
        Some("https://weather.example.com/legend/temperature.png")
    );

    // Extent inherited through the group from the root
    let rate = service.leaf_layer("precip_rate").unwrap();
    let group = service.root_layers().nth(1).unwrap();
    assert_eq!(rate.full_extent, group.full_extent);
    assert_eq!(rate.styles.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["rain"]);
    assert!(rate.attribution.is_some());
    assert!(!rate.has_dimensions);

    // An empty attribution block stops inheritance
    let total = service.leaf_layer("precip_total").unwrap();
    assert!(total.attribution.is_none());
    assert_eq!(total.full_extent.as_ref().unwrap().as_list(None), vec![-1000000.0, -1000000.0, 1000000.0, 1000000.0]);
}

#[tokio::test]
async fn test_group_extent_is_union_of_children() {
    let service = parse(WMS_1_3_0).await;
    let tree = service.layers();

    let groups: Vec<_> = tree.iter().filter(|(_, n)| n.is_group()).collect();
    assert_eq!(groups.len(), 2);

    for (id, group) in groups {
        let extent = group.full_extent.as_ref().unwrap();
        for child in tree.children(id) {
            let child_extent = child.full_extent.as_ref().unwrap();
            assert!(extent.xmin <= child_extent.xmin && extent.xmax >= child_extent.xmax);
            assert!(extent.ymin <= child_extent.ymin && extent.ymax >= child_extent.ymax);
        }
    }
}

// ============================================================================
// Render order tests
// ============================================================================

#[tokio::test]
async fn test_render_order() {
    let service = parse(WMS_1_3_0).await;

    // Later siblings first, depth first: the first declared layer is drawn last
    assert_eq!(
        ids(service.ordered_layers()),
        vec!["Precipitation", "precip_total", "precip_rate", "temperature"]
    );

    let orders: Vec<(Option<usize>, Option<usize>)> = service
        .ordered_layers()
        .map(|l| (l.layer_order, l.parent_order))
        .collect();
    assert_eq!(
        orders,
        vec![(Some(0), None), (Some(1), Some(0)), (Some(2), Some(0)), (Some(3), None)]
    );

    // The unwrapped root is not part of the render order
    let tree = service.layers();
    assert_eq!(tree[tree.roots()[0]].layer_order, None);
}

// ============================================================================
// NcWMS tests
// ============================================================================

fn ncwms_transport() -> std::sync::Arc<MockTransport> {
    MockTransport::new(|request| match request.param("request") {
        Some("GetCapabilities") => Ok(xml_response(NCWMS)),
        Some("GetMetadata") if request.param("layerName") == Some("ocean/sst") => {
            Ok(json_response(ncwms_layer_details()))
        }
        Some("GetMetadata") => Err(TransportError::Connection("layer details unavailable".to_string())),
        _ => Ok(status_response(404)),
    })
}

#[tokio::test]
async fn test_ncwms_layer_details() {
    let transport = ncwms_transport();
    let service = WmsClient::with_transport(transport.clone(), ClientConfig::default())
        .parse_service(NCWMS_URL, None)
        .await
        .unwrap();
    assert!(service.is_ncwms);

    // One metadata request per leaf, in render order
    let metadata_requests: Vec<String> = transport
        .requests_of("GetMetadata")
        .iter()
        .map(|r| {
            assert_eq!(r.param("item"), Some("layerDetails"));
            r.param("layerName").unwrap().to_string()
        })
        .collect();
    assert_eq!(metadata_requests, vec!["ocean/salinity", "ocean/sst"]);

    let sst = service.leaf_layer("ocean/sst").unwrap();
    let details = sst.ncwms.as_ref().unwrap();
    assert_eq!(details.units.as_deref(), Some("degC"));
    assert_eq!(details.scale_range, vec![-2.0, 32.0]);
    assert_eq!(details.legend_info.color_bands, 250);
    assert_eq!(sst.default_style.as_deref(), Some("boxfill/rainbow"));

    let styles: Vec<(&str, &str)> = sst.styles.iter().map(|s| (s.id.as_str(), s.title.as_str())).collect();
    assert_eq!(
        styles,
        vec![
            ("boxfill/greyscale", "Grey Scale"),
            ("boxfill/ncview", "NcView"),
            ("boxfill/rainbow", "Rainbow"),
        ]
    );
    let legend = sst.styles[2].legend_url.as_deref().unwrap();
    assert!(legend.starts_with(NCWMS_URL));
    assert!(legend.contains("request=GetLegendGraphic"));
    assert!(legend.contains("palette=rainbow"));

    // Fetch failures leave the leaf without details
    let salinity = service.leaf_layer("ocean/salinity").unwrap();
    assert!(salinity.ncwms.is_none());
    assert!(salinity.styles.is_empty());
}

#[tokio::test]
async fn test_ncwms_titles() {
    let service = WmsClient::with_transport(ncwms_transport(), ClientConfig::default())
        .parse_service(NCWMS_URL, None)
        .await
        .unwrap();

    assert_eq!(
        service.leaf_layer("ocean/sst").map(|l| l.title.as_str()),
        Some("Sea Surface Temperature (sst)")
    );
    assert_eq!(
        service.leaf_layer("ocean/salinity").map(|l| l.title.as_str()),
        Some("Salinity")
    );
    // The group title already names the dataset
    assert_eq!(ids(service.root_layers()), vec!["ocean"]);
}
