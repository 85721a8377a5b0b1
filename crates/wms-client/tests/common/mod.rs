//! Shared fixtures: an in-memory transport and capability documents.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use wms_client::{HttpResponse, HttpTransport, TransportError};

pub const WMS_URL: &str = "http://weather.example.com/wms";
pub const NCWMS_URL: &str = "http://ocean.example.com/ncWMS/wms";

/// Half the Web Mercator world width
pub const HALF_WORLD: f64 = 20037508.342789244;

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

type Responder = dyn Fn(&RecordedRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Records every request and answers with a caller-supplied function.
pub struct MockTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RecordedRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Serves `capabilities` for GetCapabilities and renders GetMap requests
    /// with [`render_map`]. Anything else is a 404.
    pub fn serving(capabilities: &'static str) -> Arc<Self> {
        Self::new(move |request| {
            Ok(match request.param("request") {
                Some("GetCapabilities") => xml_response(capabilities),
                Some("GetMap") => render_map(request),
                _ => status_response(404),
            })
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of(&self, kind: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.param("request") == Some(kind))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let request = RecordedRequest {
            url: url.to_string(),
            query: query.to_vec(),
            timeout,
        };
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(&request)
    }
}

// ============================================================================
// Responses
// ============================================================================

pub fn response(status: u16, content_type: &str, body: impl Into<Bytes>) -> HttpResponse {
    HttpResponse {
        url: WMS_URL.to_string(),
        status,
        content_type: Some(content_type.to_string()),
        body: body.into(),
    }
}

pub fn xml_response(body: &'static str) -> HttpResponse {
    response(200, "text/xml; charset=UTF-8", body)
}

pub fn json_response(body: String) -> HttpResponse {
    response(200, "application/json", body)
}

pub fn status_response(status: u16) -> HttpResponse {
    response(status, "text/html", "error")
}

pub fn encode_png(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(pixels, width, height, ColorType::Rgba8)
        .unwrap();
    png
}

/// A fake map server: each pixel column is red east of the prime meridian,
/// blue west of it and transparent outside the world.
pub fn render_map(request: &RecordedRequest) -> HttpResponse {
    let width: u32 = request.param("width").unwrap().parse().unwrap();
    let height: u32 = request.param("height").unwrap().parse().unwrap();
    let bbox: Vec<f64> = request
        .param("bbox")
        .unwrap()
        .split(',')
        .map(|v| v.parse().unwrap())
        .collect();

    let column_width = (bbox[2] - bbox[0]) / width as f64;
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for column in 0..width {
            let x = bbox[0] + (column as f64 + 0.5) * column_width;
            let color = if x.abs() > HALF_WORLD {
                [0, 0, 0, 0]
            } else if x >= 0.0 {
                RED
            } else {
                BLUE
            };
            pixels.extend_from_slice(&color);
        }
    }
    response(200, "image/png", encode_png(&pixels, width, height))
}

// ============================================================================
// Capability documents
// ============================================================================

pub const WMS_1_3_0: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms" xmlns:xlink="http://www.w3.org/1999/xlink">
  <Service>
    <Name>WMS</Name>
    <Title>Weather Service</Title>
    <Abstract>Forecast layers</Abstract>
    <KeywordList>
      <Keyword>weather</Keyword>
      <Keyword>forecast</Keyword>
    </KeywordList>
    <AccessConstraints>none</AccessConstraints>
    <LayerLimit>4</LayerLimit>
  </Service>
  <Capability>
    <Request>
      <GetCapabilities><Format>text/xml</Format></GetCapabilities>
      <GetMap>
        <Format>image/png</Format>
        <Format>image/jpeg</Format>
      </GetMap>
      <GetFeatureInfo><Format>text/html</Format></GetFeatureInfo>
    </Request>
    <Layer>
      <Title>Weather</Title>
      <CRS>EPSG:4326</CRS>
      <CRS>EPSG:3857</CRS>
      <EX_GeographicBoundingBox>
        <westBoundLongitude>-180</westBoundLongitude>
        <eastBoundLongitude>180</eastBoundLongitude>
        <southBoundLatitude>-85</southBoundLatitude>
        <northBoundLatitude>85</northBoundLatitude>
      </EX_GeographicBoundingBox>
      <Attribution>
        <Title>National Weather Service</Title>
        <OnlineResource xlink:href="https://weather.example.com/about"/>
      </Attribution>
      <Layer queryable="1">
        <Name>temperature</Name>
        <Title>Temperature</Title>
        <Abstract>Air temperature at 2 m</Abstract>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>-130</westBoundLongitude>
          <eastBoundLongitude>-60</eastBoundLongitude>
          <southBoundLatitude>20</southBoundLatitude>
          <northBoundLatitude>55</northBoundLatitude>
        </EX_GeographicBoundingBox>
        <Style>
          <Name>default</Name>
          <Title>Default</Title>
          <LegendURL><OnlineResource xlink:href="https://weather.example.com/legend/temperature.png"/></LegendURL>
        </Style>
        <Dimension name="time" units="ISO8601" default="2024-01-01T00:00:00Z">2024-01-01T00:00:00Z,2024-01-01T06:00:00Z</Dimension>
        <MetadataURL type="ISO19115:2003">
          <OnlineResource xlink:href="https://weather.example.com/metadata/temperature.xml"/>
        </MetadataURL>
      </Layer>
      <Layer>
        <Title>Precipitation</Title>
        <Style><Name>rain</Name></Style>
        <Layer>
          <Name>precip_rate</Name>
          <Title>Precipitation rate</Title>
        </Layer>
        <Layer>
          <Name>precip_total</Name>
          <Title>Total precipitation</Title>
          <Attribution/>
          <BoundingBox CRS="EPSG:3857" minx="-1000000" miny="-1000000" maxx="1000000" maxy="1000000"/>
        </Layer>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

pub const WMS_1_1_1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMT_MS_Capabilities version="1.1.1">
  <Service>
    <Name>OGC:WMS</Name>
    <Title>Legacy Radar</Title>
    <Abstract/>
    <AccessConstraints>Internal use only</AccessConstraints>
    <LayerLimit>unlimited</LayerLimit>
  </Service>
  <Capability>
    <Request>
      <GetMap><Format>image/png</Format></GetMap>
    </Request>
    <Layer>
      <Name>radar</Name>
      <Title>Radar</Title>
      <SRS>EPSG:4326 EPSG:900913</SRS>
      <LatLonBoundingBox minx="-125" miny="24" maxx="-66" maxy="50"/>
      <Dimension name="time" units="ISO8601"/>
      <Extent name="time" default="2024-01-02">2024-01-01,2024-01-02</Extent>
    </Layer>
  </Capability>
</WMT_MS_Capabilities>"#;

pub const NCWMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0">
  <Service>
    <Title>Ocean Model</Title>
    <Abstract>Ocean model output</Abstract>
  </Service>
  <Capability>
    <Request>
      <GetMap><Format>image/png</Format></GetMap>
    </Request>
    <Layer>
      <Title>Ocean Model</Title>
      <CRS>EPSG:4326</CRS>
      <CRS>EPSG:3857</CRS>
      <Layer>
        <Title>ocean</Title>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>-180</westBoundLongitude>
          <eastBoundLongitude>180</eastBoundLongitude>
          <southBoundLatitude>-80</southBoundLatitude>
          <northBoundLatitude>80</northBoundLatitude>
        </EX_GeographicBoundingBox>
        <Layer>
          <Name>ocean/sst</Name>
          <Title>Sea Surface Temperature</Title>
        </Layer>
        <Layer>
          <Name>ocean/salinity</Name>
          <Title>Salinity</Title>
        </Layer>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

pub fn ncwms_layer_details() -> String {
    serde_json::json!({
        "units": "degC",
        "bbox": ["-180.0", "-80.0", "180.0", "80.0"],
        "scaleRange": [-2.0, 32.0],
        "numColorBands": 250,
        "logScaling": false,
        "palettes": ["rainbow", "greyscale", "ncview"],
        "defaultPalette": "rainbow",
        "supportedStyles": ["boxfill"]
    })
    .to_string()
}
