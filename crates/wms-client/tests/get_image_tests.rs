//! Tests for GetMap requests through a parsed service, including extents
//! that cross the anti-meridian.

mod common;

use std::sync::Arc;

use common::*;
use map_geometry::{Extent, SpatialReference};
use tracing_subscriber::EnvFilter;
use wms_client::{ClientConfig, ClientError, GetImageRequest, ServiceDescriptor, TransportError, WmsClient};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn service(transport: Arc<MockTransport>, document: &'static str) -> ServiceDescriptor {
    init_logging();
    WmsClient::with_transport(transport, ClientConfig::default())
        .parse_service(WMS_URL, None)
        .await
        .unwrap()
}

/// Answers GetCapabilities with `document` and GetMap with `image`.
fn transport_with_image<F>(document: &'static str, image: F) -> Arc<MockTransport>
where
    F: Fn(&RecordedRequest) -> Result<wms_client::HttpResponse, TransportError> + Send + Sync + 'static,
{
    MockTransport::new(move |request| match request.param("request") {
        Some("GetCapabilities") => Ok(xml_response(document)),
        _ => image(request),
    })
}

fn mercator(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Extent {
    Extent::new(xmin, ymin, xmax, ymax, SpatialReference::web_mercator())
}

fn is_close(pixel: &image::Rgba<u8>, expected: [u8; 4]) -> bool {
    pixel.0.iter().zip(expected).all(|(a, b)| a.abs_diff(b) <= 2)
}

// ============================================================================
// Single request tests
// ============================================================================

#[tokio::test]
async fn test_single_request() {
    let transport = MockTransport::serving(WMS_1_3_0);
    let service = service(transport.clone(), WMS_1_3_0).await;

    let request = GetImageRequest::new(mercator(-1_000_000.0, -500_000.0, 1_000_000.0, 500_000.0), 200, 100, [
        "temperature",
        "precip_rate",
    ])
    .with_time("2024-01-01T00:00:00Z");
    let image = service.get_image(&request).await.unwrap();
    assert_eq!(image.dimensions(), (200, 100));
    assert!(is_close(image.get_pixel(10, 50), BLUE));
    assert!(is_close(image.get_pixel(190, 50), RED));

    let requests = transport.requests_of("GetMap");
    assert_eq!(requests.len(), 1);
    let query = &requests[0];
    assert_eq!(query.url, WMS_URL);
    assert_eq!(query.param("crs"), Some("EPSG:3857"));
    assert_eq!(query.param("format"), Some("image/png"));
    assert_eq!(query.param("width"), Some("200"));
    assert_eq!(query.param("height"), Some("100"));
    assert_eq!(query.param("layers"), Some("temperature,precip_rate"));
    assert_eq!(query.param("time"), Some("2024-01-01T00:00:00Z"));
    assert_eq!(query.param("transparent"), Some("TRUE"));
    assert_eq!(query.timeout, ClientConfig::default().image_timeout());
}

#[tokio::test]
async fn test_1_1_1_request() {
    let transport = MockTransport::serving(WMS_1_1_1);
    let service = service(transport.clone(), WMS_1_1_1).await;

    let request = GetImageRequest::new(mercator(-1_000_000.0, -1_000_000.0, 1_000_000.0, 1_000_000.0), 64, 64, ["radar"])
        .with_format("image/png");
    service.get_image(&request).await.unwrap();

    let query = &transport.requests_of("GetMap")[0];
    assert_eq!(query.param("version"), Some("1.1.1"));
    assert_eq!(query.param("srs"), Some("EPSG:900913"));
    assert_eq!(query.param("exceptions"), Some("application/vnd.ogc.se_xml"));
    assert_eq!(query.param("crs"), None);
}

// ============================================================================
// Anti-meridian tests
// ============================================================================

#[tokio::test]
async fn test_anti_meridian_split() {
    let transport = MockTransport::serving(WMS_1_3_0);
    let service = service(transport.clone(), WMS_1_3_0).await;

    // Half the image east of the anti-meridian, half wrapped around to the west
    let extent = mercator(0.75 * HALF_WORLD, -5009377.085697311, 1.25 * HALF_WORLD, 5009377.085697311);
    let image = service
        .get_image(&GetImageRequest::new(extent, 100, 100, ["temperature"]))
        .await
        .unwrap();
    assert_eq!(image.dimensions(), (100, 100));

    let mut widths: Vec<u32> = transport
        .requests_of("GetMap")
        .iter()
        .map(|r| r.param("width").unwrap().parse().unwrap())
        .collect();
    widths.sort_unstable();
    assert_eq!(widths, vec![50, 100]);

    assert!(is_close(image.get_pixel(10, 50), RED));
    assert!(is_close(image.get_pixel(90, 50), BLUE));
}

/// Sorted widths of the GetMap requests, and how many had a bbox west of the prime meridian.
fn split_requests(transport: &MockTransport) -> (Vec<u32>, usize) {
    let requests = transport.requests_of("GetMap");
    let mut widths: Vec<u32> = requests
        .iter()
        .map(|r| r.param("width").unwrap().parse().unwrap())
        .collect();
    widths.sort_unstable();
    let western = requests
        .iter()
        .filter(|r| r.param("bbox").unwrap().starts_with('-'))
        .count();
    (widths, western)
}

#[tokio::test]
async fn test_anti_meridian_split_wrapped_extent() {
    let transport = MockTransport::serving(WMS_1_3_0);
    let service = service(transport.clone(), WMS_1_3_0).await;

    // Stored with xmin > xmax, same area as the east overflow case
    let extent = mercator(0.75 * HALF_WORLD, -5009377.085697311, -0.75 * HALF_WORLD, 5009377.085697311);
    let image = service
        .get_image(&GetImageRequest::new(extent, 100, 100, ["temperature"]))
        .await
        .unwrap();
    assert_eq!(image.dimensions(), (100, 100));
    assert_eq!(split_requests(&transport), (vec![50, 100], 1));

    assert!(is_close(image.get_pixel(10, 50), RED));
    assert!(is_close(image.get_pixel(49, 50), RED));
    assert!(is_close(image.get_pixel(50, 50), BLUE));
    assert!(is_close(image.get_pixel(90, 50), BLUE));
}

#[tokio::test]
async fn test_anti_meridian_split_west() {
    let transport = MockTransport::serving(WMS_1_3_0);
    let service = service(transport.clone(), WMS_1_3_0).await;

    // Half the image west of -180, wrapped around to the far east
    let extent = mercator(-1.25 * HALF_WORLD, -5009377.085697311, -0.75 * HALF_WORLD, 5009377.085697311);
    let image = service
        .get_image(&GetImageRequest::new(extent, 100, 100, ["temperature"]))
        .await
        .unwrap();
    assert_eq!(image.dimensions(), (100, 100));
    assert_eq!(split_requests(&transport), (vec![50, 100], 1));

    assert!(is_close(image.get_pixel(10, 50), RED));
    assert!(is_close(image.get_pixel(49, 50), RED));
    assert!(is_close(image.get_pixel(50, 50), BLUE));
    assert!(is_close(image.get_pixel(90, 50), BLUE));
}

#[tokio::test]
async fn test_failed_part_fails_request() {
    let transport = transport_with_image(WMS_1_3_0, |request| {
        let bbox = request.param("bbox").unwrap_or_default();
        if bbox.starts_with('-') {
            Ok(status_response(500))
        } else {
            Ok(render_map(request))
        }
    });
    let service = service(transport, WMS_1_3_0).await;

    let extent = mercator(0.75 * HALF_WORLD, -5009377.085697311, 1.25 * HALF_WORLD, 5009377.085697311);
    let error = service
        .get_image(&GetImageRequest::new(extent, 100, 100, ["temperature"]))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_format_with_parameters() {
    let document: &'static str = Box::leak(
        WMS_1_3_0
            .replacen("<Format>image/png</Format>", "<Format>image/png; mode=8bit</Format>", 1)
            .into_boxed_str(),
    );
    let transport = MockTransport::serving(document);
    let service = service(transport.clone(), document).await;

    let request = GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"])
        .with_format("image/png; mode=8bit");
    let image = service.get_image(&request).await.unwrap();
    assert_eq!(image.dimensions(), (10, 10));

    let query = &transport.requests_of("GetMap")[0];
    assert_eq!(query.param("format"), Some("image/png; mode=8bit"));
}

// ============================================================================
// Validation tests
// ============================================================================

#[tokio::test]
async fn test_validation_before_request() {
    let transport = MockTransport::serving(WMS_1_3_0);
    let service = service(transport.clone(), WMS_1_3_0).await;
    let extent = mercator(-100.0, -100.0, 100.0, 100.0);

    let error = service
        .get_image(&GetImageRequest::new(extent.clone(), 10, 10, Vec::<String>::new()))
        .await
        .unwrap_err();
    assert!(error.to_string().starts_with("No layers from which to generate an image"));

    let error = service
        .get_image(&GetImageRequest::new(extent.clone(), 10, 10, ["temperature"]).with_styles(["a", "b"]))
        .await
        .unwrap_err();
    assert!(error.to_string().starts_with("Provided styles do not correspond to specified Layers"));

    let error = service
        .get_image(&GetImageRequest::new(extent, 10, 10, ["temperature"]).with_format("gif"))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::Image { .. }));
    assert!(error.to_string().starts_with("Incompatible image format gif: image/png,image/jpeg"));

    assert!(transport.requests_of("GetMap").is_empty());
}

#[tokio::test]
async fn test_web_mercator_required() {
    let document: &'static str = Box::leak(WMS_1_3_0.replace("<CRS>EPSG:3857</CRS>", "").into_boxed_str());
    let transport = MockTransport::serving(document);
    let service = service(transport.clone(), document).await;

    let error = service
        .get_image(&GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"]))
        .await
        .unwrap_err();
    assert!(error
        .to_string()
        .starts_with("Invalid coordinate system identifier (Web Mercator required): EPSG:4326"));
    assert!(transport.requests_of("GetMap").is_empty());
}

// ============================================================================
// Response error tests
// ============================================================================

#[tokio::test]
async fn test_service_exception_response() {
    let transport = transport_with_image(WMS_1_3_0, |_| {
        Ok(response(
            200,
            "application/vnd.ogc.se_xml",
            r#"<ServiceExceptionReport version="1.3.0">
                <ServiceException code="LayerNotDefined">Layer temperature is not defined</ServiceException>
            </ServiceExceptionReport>"#,
        ))
    });
    let service = service(transport, WMS_1_3_0).await;

    let error = service
        .get_image(&GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"]))
        .await
        .unwrap_err();
    match error {
        ClientError::Image { message, .. } => assert_eq!(message, "Layer temperature is not defined"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unexpected_content_type() {
    let transport = transport_with_image(WMS_1_3_0, |_| Ok(response(200, "text/html", "<html>maintenance</html>")));
    let service = service(transport, WMS_1_3_0).await;

    let error = service
        .get_image(&GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"]))
        .await
        .unwrap_err();
    match error {
        ClientError::Image { message, .. } => assert_eq!(message, "Unexpected image format text/html: image/png"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_with_image_content_type() {
    let transport = transport_with_image(WMS_1_3_0, |_| Ok(response(503, "image/png", "")));
    let service = service(transport, WMS_1_3_0).await;

    let error = service
        .get_image(&GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"]))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_undecodable_image() {
    let transport = transport_with_image(WMS_1_3_0, |_| Ok(response(200, "image/png", "not a png")));
    let service = service(transport, WMS_1_3_0).await;

    let error = service
        .get_image(&GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"]))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::Image { source: Some(_), .. }));
}

#[tokio::test]
async fn test_image_timeout() {
    let transport = transport_with_image(WMS_1_3_0, |_| Err(TransportError::Timeout));
    let service = service(transport, WMS_1_3_0).await;

    let error = service
        .get_image(&GetImageRequest::new(mercator(-100.0, -100.0, 100.0, 100.0), 10, 10, ["temperature"]))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::Timeout { .. }));
}
