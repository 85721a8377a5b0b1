//! GetMap image requests and anti-meridian compositing.

use std::time::Duration;

use futures::try_join;
use image::{imageops, Rgba, RgbaImage};
use map_geometry::Extent;
use tracing::{debug, instrument};

use crate::capabilities::{service_exception_message, WmsVersion, WMS_EXCEPTION_FORMAT};
use crate::transport::{HttpTransport, TransportError};
use crate::xml::XmlElement;
use crate::{ClientError, ClientResult};

const DEFAULT_IMAGE_FORMAT: &str = "png";

/// Parameters of one `GetImage` call.
///
/// The extent must be in Web Mercator, with the same aspect ratio as the
/// image. The first layer is drawn lowest.
#[derive(Debug, Clone)]
pub struct GetImageRequest {
    pub extent: Extent,
    pub width: u32,
    pub height: u32,
    pub layer_ids: Vec<String>,
    /// Empty, or one style per layer
    pub style_ids: Vec<String>,
    pub time: Option<String>,
    /// Extra query parameters, applied last
    pub params: Vec<(String, String)>,
    /// Short (`png`) or full (`image/png`) format name
    pub image_format: String,
}

impl GetImageRequest {
    pub fn new<I, S>(extent: Extent, width: u32, height: u32, layer_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extent,
            width,
            height,
            layer_ids: layer_ids.into_iter().map(Into::into).collect(),
            style_ids: Vec::new(),
            time: None,
            params: Vec::new(),
            image_format: DEFAULT_IMAGE_FORMAT.to_string(),
        }
    }

    pub fn with_styles<I, S>(mut self, style_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.style_ids = style_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_format(mut self, image_format: impl Into<String>) -> Self {
        self.image_format = image_format.into();
        self
    }

    fn short_format(&self) -> &str {
        self.image_format
            .strip_prefix("image/")
            .unwrap_or(&self.image_format)
    }

    fn mime_type(&self) -> String {
        format!("image/{}", self.short_format())
    }

    /// The mime type without parameters such as `; mode=8bit`, as servers
    /// report it in the response content type.
    fn response_mime_type(&self) -> String {
        let mime_type = self.mime_type();
        match mime_type.split_once(';') {
            Some((base, _)) => base.trim().to_string(),
            None => mime_type,
        }
    }
}

/// What the compositor needs to know about a parsed service.
pub struct ImageCompositor<'a> {
    pub transport: &'a dyn HttpTransport,
    pub wms_url: &'a str,
    pub version: WmsVersion,
    pub spatial_ref: Option<&'a str>,
    pub supported_spatial_refs: &'a [String],
    pub map_formats: &'a [String],
    pub timeout: Duration,
}

impl ImageCompositor<'_> {
    /// Render `request` into a single RGBA image of the requested size.
    ///
    /// Extents crossing the anti-meridian are split into the in-world part
    /// and the wrapped part, fetched concurrently and composited. Any failed
    /// fetch fails the whole call.
    #[instrument(skip(self, request), fields(url = %self.wms_url, layers = ?request.layer_ids))]
    pub async fn render(&self, request: &GetImageRequest) -> ClientResult<RgbaImage> {
        let spatial_ref = self.validate(request)?;
        let bad_extent = |e| ClientError::bad_extent("Invalid image extent", self.wms_url, e);

        let extent = request.extent.unwrapped().map_err(bad_extent)?;
        if !extent.crosses_anti_meridian().map_err(bad_extent)? {
            return self
                .fetch_image(&request.extent, request.width, request.height, request, spatial_ref)
                .await;
        }

        // Only the width is adjusted, so the parts overlay base maps exactly
        let clipped = extent.limit_to_global_width().map_err(bad_extent)?;
        let resolution = extent.get_image_resolution(request.width, request.height);
        let offset = ((clipped.xmin - extent.xmin) / resolution).round() as i64;
        let clipped_size = clipped.fit_image_dimensions_to_extent(request.width, request.height, Some(resolution));

        let wrapped = extent.get_negative_extent().map_err(bad_extent)?.map(|negative| {
            let size = negative.fit_image_dimensions_to_extent(request.width, request.height, Some(resolution));
            (negative, size)
        });

        debug!(
            offset = offset,
            clipped = %clipped.as_bbox_string(None),
            wrapped = ?wrapped.as_ref().map(|(e, _)| e.as_bbox_string(None)),
            "Splitting image request at the anti-meridian"
        );

        let (clipped_image, wrapped_image) = try_join!(
            self.fetch_part(Some((clipped, clipped_size)), request, spatial_ref),
            self.fetch_part(wrapped, request, spatial_ref),
        )?;

        let mut canvas = RgbaImage::from_pixel(request.width, request.height, Rgba([0, 0, 0, 0]));
        if let Some(image) = clipped_image {
            imageops::overlay(&mut canvas, &image, offset, 0);
        }
        if let Some(image) = wrapped_image {
            imageops::overlay(&mut canvas, &image, 0, 0);
        }
        Ok(canvas)
    }

    /// Checks that need no network access. Returns the CRS to request.
    fn validate(&self, request: &GetImageRequest) -> ClientResult<&str> {
        let spatial_ref = self.spatial_ref.ok_or_else(|| {
            ClientError::image(
                format!(
                    "Invalid coordinate system identifier (Web Mercator required): {}",
                    self.supported_spatial_refs.join(",")
                ),
                self.wms_url,
            )
        })?;

        if request.layer_ids.is_empty() {
            return Err(ClientError::image(
                "No layers from which to generate an image",
                self.wms_url,
            ));
        }
        if !request.style_ids.is_empty() && request.style_ids.len() != request.layer_ids.len() {
            return Err(ClientError::image(
                "Provided styles do not correspond to specified Layers",
                self.wms_url,
            ));
        }

        let mime_type = request.mime_type();
        if !self.map_formats.iter().any(|f| f.starts_with(&mime_type)) {
            return Err(ClientError::image(
                format!(
                    "Incompatible image format {}: {}",
                    request.short_format(),
                    self.map_formats.join(",")
                ),
                self.wms_url,
            ));
        }
        Ok(spatial_ref)
    }

    async fn fetch_part(
        &self,
        part: Option<(Extent, (i64, i64))>,
        request: &GetImageRequest,
        spatial_ref: &str,
    ) -> ClientResult<Option<RgbaImage>> {
        let Some((extent, (width, height))) = part else {
            return Ok(None);
        };
        if width <= 0 || height <= 0 {
            debug!(width = width, height = height, "Skipping empty image part");
            return Ok(None);
        }
        self.fetch_image(&extent, width as u32, height as u32, request, spatial_ref)
            .await
            .map(Some)
    }

    /// Query parameters of one GetMap request.
    pub fn image_query(
        &self,
        extent: &Extent,
        width: u32,
        height: u32,
        request: &GetImageRequest,
        spatial_ref: &str,
    ) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = vec![
            ("service".into(), "WMS".into()),
            ("request".into(), "GetMap".into()),
            ("transparent".into(), "TRUE".into()),
            ("format".into(), request.mime_type()),
            ("width".into(), width.to_string()),
            ("height".into(), height.to_string()),
            ("bbox".into(), extent.as_bbox_string(None)),
            ("layers".into(), request.layer_ids.join(",")),
            ("styles".into(), request.style_ids.join(",")),
            ("version".into(), self.version.to_string()),
        ];

        match self.version {
            WmsVersion::V1_3_0 => {
                query.push(("exceptions".into(), "XML".into()));
                query.push(("crs".into(), spatial_ref.to_string()));
            }
            WmsVersion::V1_1_1 => {
                query.push(("exceptions".into(), WMS_EXCEPTION_FORMAT.into()));
                query.push(("srs".into(), spatial_ref.to_string()));
            }
        }

        if let Some(time) = &request.time {
            query.push(("time".into(), time.clone()));
        }
        for (key, value) in &request.params {
            query.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
            query.push((key.clone(), value.clone()));
        }
        query
    }

    async fn fetch_image(
        &self,
        extent: &Extent,
        width: u32,
        height: u32,
        request: &GetImageRequest,
        spatial_ref: &str,
    ) -> ClientResult<RgbaImage> {
        let query = self.image_query(extent, width, height, request, spatial_ref);
        let response = self
            .transport
            .get(self.wms_url, &query, self.timeout)
            .await
            .map_err(|e| match e {
                TransportError::Timeout => ClientError::Timeout {
                    url: self.wms_url.to_string(),
                },
                other => ClientError::Image {
                    message: "The WMS service did not return a valid image".to_string(),
                    url: self.wms_url.to_string(),
                    source: Some(Box::new(other)),
                },
            })?;

        let expected = request.response_mime_type();
        let received = response.mime_type();
        if !received.eq_ignore_ascii_case(&expected) {
            let exception = XmlElement::parse(&response.body)
                .ok()
                .and_then(|root| service_exception_message(&root));
            return Err(match exception {
                Some(message) => ClientError::image(message, &response.url),
                None if received.contains(WMS_EXCEPTION_FORMAT) => {
                    ClientError::image("No service exception", &response.url)
                }
                // A failing server keeps its status rather than becoming an image error
                None if !response.is_success() => ClientError::HttpStatus {
                    status: response.status,
                    url: response.url.clone(),
                },
                None => ClientError::image(
                    format!("Unexpected image format {}: {}", received, expected),
                    &response.url,
                ),
            });
        }
        // Same for an error status sent with the image content type
        if !response.is_success() {
            return Err(ClientError::HttpStatus {
                status: response.status,
                url: response.url,
            });
        }

        // The PNG decoder expands a tRNS color key into alpha
        image::load_from_memory(&response.body)
            .map(|decoded| decoded.to_rgba8())
            .map_err(|e| ClientError::Image {
                message: "The WMS service did not return a valid image".to_string(),
                url: response.url.clone(),
                source: Some(Box::new(e)),
            })
    }
}
