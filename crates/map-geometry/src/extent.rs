//! Bounding boxes tied to a spatial reference.
//!
//! An [`Extent`] may be geographic (degrees) or Web Mercator (meters); the
//! anti-meridian, global-bounds and reprojection operations are only defined
//! for those two. `xmin > xmax` is a valid state describing an extent that
//! wraps across the anti-meridian.

use std::f64::consts::PI;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{GeometryError, GeometryResult, SpatialReference};

/// Radius of the sphere used by Web Mercator, in meters.
pub const EARTH_RADIUS: f64 = 6378137.0;

pub const GLOBAL_EXTENT_WEB_MERCATOR: [f64; 4] = [
    -20037508.342789244,
    -20037471.205137067,
    20037508.342789244,
    20037471.20513706,
];
pub const GLOBAL_EXTENT_WGS84: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

/// Geographic extent representable in Web Mercator.
pub const GLOBAL_EXTENT_WGS84_CORRECTED: [f64; 4] = [-180.0, -85.0511, 180.0, 85.0511];

/// Screen resolution assumed by scale computations.
pub const DPI: f64 = 96.0;
pub const INCHES_PER_METER: f64 = 39.37;
const METERS_PER_MILE: f64 = 1609.344;

/// The shape an extent was built from, replayed by [`Extent::as_original`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginalFormat {
    #[default]
    None,
    List,
    Dict,
}

#[derive(Debug, Clone, Default)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub spatial_reference: SpatialReference,
    original_format: OriginalFormat,
}

impl Extent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64, spatial_reference: SpatialReference) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            spatial_reference,
            original_format: OriginalFormat::None,
        }
    }

    /// Build from an ordered `[xmin, ymin, xmax, ymax]` sequence.
    pub fn from_list(coords: &[f64], spatial_reference: SpatialReference) -> GeometryResult<Self> {
        match coords {
            [xmin, ymin, xmax, ymax] => {
                if coords.iter().any(|c| !c.is_finite()) {
                    return Err(GeometryError::bad_extent("coordinates must be finite", format!("{:?}", coords)));
                }
                Ok(Self {
                    original_format: OriginalFormat::List,
                    ..Self::new(*xmin, *ymin, *xmax, *ymax, spatial_reference)
                })
            }
            _ => Err(GeometryError::bad_extent(
                "expected four coordinates",
                format!("{:?}", coords),
            )),
        }
    }

    /// Build from four textual coordinates, as found in XML attributes.
    pub fn from_strs(coords: [&str; 4], spatial_reference: SpatialReference) -> GeometryResult<Self> {
        let mut parsed = [0.0; 4];
        for (target, text) in parsed.iter_mut().zip(coords) {
            *target = parse_coordinate(text)?;
        }
        let mut extent = Self::from_list(&parsed, spatial_reference)?;
        extent.original_format = OriginalFormat::None;
        Ok(extent)
    }

    /// Build from a JSON-like value.
    ///
    /// Objects need `xmin`, `ymin`, `xmax`, `ymax` (keys matched
    /// case-insensitively) and a `spatial_reference`/`spatialReference`
    /// entry unless `default_sr` is given. Arrays must hold four numbers or
    /// numeric strings and use `default_sr` (or no CRS at all). Coordinates
    /// given as numeric strings are accepted.
    pub fn from_value(value: &Value, default_sr: Option<&SpatialReference>) -> GeometryResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map, default_sr),
            Value::Array(items) => {
                let coords = items
                    .iter()
                    .map(value_to_coordinate)
                    .collect::<GeometryResult<Vec<f64>>>()?;
                Self::from_list(&coords, default_sr.cloned().unwrap_or_default())
            }
            other => Err(GeometryError::bad_extent("unsupported extent type", other)),
        }
    }

    fn from_map(map: &Map<String, Value>, default_sr: Option<&SpatialReference>) -> GeometryResult<Self> {
        let find = |name: &str| {
            map.iter()
                .find(|(key, _)| key.replace('_', "").eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        };
        let coordinate = |name: &str| -> GeometryResult<f64> {
            let value = find(name).ok_or_else(|| {
                GeometryError::bad_extent(format!("missing {}", name), Value::Object(map.clone()))
            })?;
            value_to_coordinate(value)
        };

        let spatial_reference = match find("spatialreference") {
            Some(Value::Null) | None => default_sr.cloned().ok_or_else(|| {
                GeometryError::bad_extent("missing spatial reference", Value::Object(map.clone()))
            })?,
            Some(value) => SpatialReference::from_value(value)
                .map_err(|e| GeometryError::bad_extent(e.to_string(), value))?,
        };

        Ok(Self {
            original_format: OriginalFormat::Dict,
            ..Self::new(
                coordinate("xmin")?,
                coordinate("ymin")?,
                coordinate("xmax")?,
                coordinate("ymax")?,
                spatial_reference,
            )
        })
    }

    pub fn original_format(&self) -> OriginalFormat {
        self.original_format
    }

    /// Copy of this extent with new coordinates and the same spatial reference.
    pub fn with_coords(&self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            ..self.clone()
        }
    }

    fn with_reference(&self, coords: [f64; 4], spatial_reference: SpatialReference) -> Self {
        Self {
            spatial_reference,
            ..self.with_coords(coords[0], coords[1], coords[2], coords[3])
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Coordinates as a JSON object.
    ///
    /// The ESRI format uses a `spatialReference: {wkid}` key, the other a
    /// `spatial_reference: {srs}` key; each falls back to the spatial
    /// reference's own serialization when its preferred identifier is missing.
    pub fn as_dict(&self, esri_format: bool, precision: Option<u32>) -> Value {
        let sr = &self.spatial_reference;
        let (sr_key, sr_value) = if esri_format {
            let value = match sr.wkid {
                Some(wkid) => serde_json::json!({ "wkid": wkid }),
                None => sr.as_dict(),
            };
            ("spatialReference", value)
        } else {
            let value = match &sr.srs {
                Some(srs) => serde_json::json!({ "srs": srs }),
                None => sr.as_dict(),
            };
            ("spatial_reference", value)
        };

        let [xmin, ymin, xmax, ymax] = self.rounded(precision);
        let mut map = Map::new();
        map.insert("xmin".to_string(), Value::from(xmin));
        map.insert("ymin".to_string(), Value::from(ymin));
        map.insert("xmax".to_string(), Value::from(xmax));
        map.insert("ymax".to_string(), Value::from(ymax));
        map.insert(sr_key.to_string(), sr_value);
        Value::Object(map)
    }

    pub fn as_list(&self, precision: Option<u32>) -> Vec<f64> {
        self.rounded(precision).to_vec()
    }

    /// "xmin,ymin,xmax,ymax", the form of a WMS `BBOX` parameter.
    pub fn as_bbox_string(&self, precision: Option<u32>) -> String {
        self.rounded(precision)
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn as_json_string(&self, esri_format: bool, precision: Option<u32>) -> String {
        self.as_dict(esri_format, precision).to_string()
    }

    /// Replay the shape this extent was constructed from, if any.
    pub fn as_original(&self, esri_format: bool, precision: Option<u32>) -> Option<Value> {
        match self.original_format {
            OriginalFormat::Dict => Some(self.as_dict(esri_format, precision)),
            OriginalFormat::List => Some(Value::from(self.as_list(precision))),
            OriginalFormat::None => None,
        }
    }

    fn rounded(&self, precision: Option<u32>) -> [f64; 4] {
        let coords = [self.xmin, self.ymin, self.xmax, self.ymax];
        match precision {
            Some(digits) => {
                let factor = 10f64.powi(digits as i32);
                coords.map(|c| (c * factor).round() / factor)
            }
            None => coords,
        }
    }

    // ========================================================================
    // Dimensions
    // ========================================================================

    pub fn get_center(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }

    pub fn get_dimensions(&self) -> (f64, f64) {
        (self.xmax - self.xmin, self.ymax - self.ymin)
    }

    /// Units per pixel needed to show the whole extent in an image of the given size.
    pub fn get_image_resolution(&self, width: u32, height: u32) -> f64 {
        let (dx, dy) = self.get_dimensions();
        (dx / width as f64).max(dy / height as f64)
    }

    /// A copy of this extent grown about its center to the aspect ratio of a
    /// `width` x `height` image. Only the shorter side is expanded.
    pub fn fit_to_dimensions(&self, width: u32, height: u32) -> Extent {
        let (dx, dy) = self.get_dimensions();
        let image_ratio = width as f64 / height as f64;
        let extent_ratio = dx / dy;

        let mut fitted = self.clone();
        if image_ratio > extent_ratio {
            let grow = (dy * image_ratio - dx) / 2.0;
            fitted.xmin -= grow;
            fitted.xmax += grow;
        } else if image_ratio < extent_ratio {
            let grow = (dx / image_ratio - dy) / 2.0;
            fitted.ymin -= grow;
            fitted.ymax += grow;
        }
        fitted
    }

    /// Image dimensions matching this extent at `resolution`, which defaults
    /// to the resolution that fits the extent into `width` x `height`.
    ///
    /// Signs follow the extent: an extent with `ymin > ymax` yields a negative
    /// height, which callers treat as a vertical flip.
    pub fn fit_image_dimensions_to_extent(
        &self,
        width: u32,
        height: u32,
        resolution: Option<f64>,
    ) -> (i64, i64) {
        let resolution = resolution.unwrap_or_else(|| self.get_image_resolution(width, height));
        let (dx, dy) = self.get_dimensions();
        ((dx / resolution).round() as i64, (dy / resolution).round() as i64)
    }

    /// Human readable length of one screen inch, e.g. "350 km (220 miles)".
    ///
    /// The ground distance is taken at the extent's poleward edge, so a
    /// geographic extent and its Web Mercator projection give the same label.
    pub fn get_scale_string(&self, image_width: u32) -> GeometryResult<String> {
        let mercator = self.project_to_web_mercator()?;
        let geographic = mercator.project_to_geographic()?;

        let resolution = mercator.get_dimensions().0.abs() / image_width as f64;
        let latitude = geographic.ymin.abs().max(geographic.ymax.abs());
        let meters = resolution * latitude.to_radians().cos() * DPI;

        let km = extract_significant_digits(meters / 1000.0);
        let miles = extract_significant_digits(meters / METERS_PER_MILE);
        Ok(format!("{} km ({} miles)", format_label(km), format_label(miles)))
    }

    /// Degree labels of the geographic form of this extent:
    /// `("180.00°W", "85.05°S", "180.00°E", "85.05°N")`.
    pub fn get_geographic_labels(&self) -> GeometryResult<(String, String, String, String)> {
        let geographic = self.project_to_geographic()?;
        let label = |value: f64, negative: char, positive: char| {
            let hemisphere = if value < 0.0 { negative } else { positive };
            format!("{:.2}°{}", value.abs(), hemisphere)
        };
        Ok((
            label(geographic.xmin, 'W', 'E'),
            label(geographic.ymin, 'S', 'N'),
            label(geographic.xmax, 'W', 'E'),
            label(geographic.ymax, 'S', 'N'),
        ))
    }

    /// A Web Mercator extent centered where this one is, sized for an image
    /// of `width` x `height` pixels at the given map scale denominator.
    pub fn set_to_center_and_scale(&self, scale: f64, width: u32, height: u32) -> GeometryResult<Extent> {
        let mercator = self.project_to_web_mercator()?;
        let (center_x, center_y) = mercator.get_center();
        let resolution = scale / (INCHES_PER_METER * DPI);
        let half_width = resolution * width as f64 / 2.0;
        let half_height = resolution * height as f64 / 2.0;

        Ok(mercator.with_coords(
            center_x - half_width,
            center_y - half_height,
            center_x + half_width,
            center_y + half_height,
        ))
    }

    // ========================================================================
    // Global bounds and the anti-meridian
    // ========================================================================

    /// The whole-world bounds of this extent's CRS.
    pub fn global_extent(&self) -> GeometryResult<[f64; 4]> {
        if self.spatial_reference.is_web_mercator() {
            Ok(GLOBAL_EXTENT_WEB_MERCATOR)
        } else if self.spatial_reference.is_geographic() {
            Ok(GLOBAL_EXTENT_WGS84)
        } else {
            Err(GeometryError::UnsupportedProjection(self.spatial_reference.to_string()))
        }
    }

    fn global_width(&self) -> GeometryResult<f64> {
        let global = self.global_extent()?;
        Ok(global[2] - global[0])
    }

    /// True if the extent runs past either edge of the world, or is stored
    /// wrapped (`xmin > xmax`).
    pub fn crosses_anti_meridian(&self) -> GeometryResult<bool> {
        let global = self.global_extent()?;
        Ok(self.xmin > self.xmax || self.xmin < global[0] || self.xmax > global[2])
    }

    /// An equivalent extent with `xmin <= xmax`, extending east past the
    /// anti-meridian when it was stored wrapped.
    pub fn unwrapped(&self) -> GeometryResult<Extent> {
        let mut extent = self.clone();
        if extent.xmin > extent.xmax {
            extent.xmax += self.global_width()?;
        }
        Ok(extent)
    }

    /// True if part of the extent lies beyond the world's x bounds.
    pub fn has_negative_extent(&self) -> GeometryResult<bool> {
        let global = self.global_extent()?;
        Ok(self.xmin < global[0] || self.xmax > global[2])
    }

    /// The extent shifted one world width so that its out-of-bounds portion
    /// lands on the other side of the globe; `None` if nothing wraps.
    ///
    /// The shifted extent keeps the original width, so pixel columns of an
    /// image rendered for it line up with those of the original.
    pub fn get_negative_extent(&self) -> GeometryResult<Option<Extent>> {
        let global = self.global_extent()?;
        let width = global[2] - global[0];
        let shift = if self.xmin < global[0] {
            width
        } else if self.xmax > global[2] {
            -width
        } else {
            return Ok(None);
        };
        Ok(Some(self.with_coords(
            self.xmin + shift,
            self.ymin,
            self.xmax + shift,
            self.ymax,
        )))
    }

    /// Clamp all four coordinates to the world bounds.
    pub fn limit_to_global_extent(&self) -> GeometryResult<Extent> {
        let global = self.global_extent()?;
        Ok(self.with_coords(
            self.xmin.max(global[0]),
            self.ymin.max(global[1]),
            self.xmax.min(global[2]),
            self.ymax.min(global[3]),
        ))
    }

    /// Clamp only the x coordinates to the world bounds.
    pub fn limit_to_global_width(&self) -> GeometryResult<Extent> {
        let global = self.global_extent()?;
        Ok(self.with_coords(
            self.xmin.max(global[0]),
            self.ymin,
            self.xmax.min(global[2]),
            self.ymax,
        ))
    }

    // ========================================================================
    // Reprojection
    // ========================================================================

    /// This extent in WGS84 degrees.
    pub fn project_to_geographic(&self) -> GeometryResult<Extent> {
        let sr = &self.spatial_reference;
        if sr.is_geographic() {
            Ok(self.clone())
        } else if sr.is_web_mercator() {
            let (xmin, ymin) = mercator_to_geographic(self.xmin, self.ymin);
            let (xmax, ymax) = mercator_to_geographic(self.xmax, self.ymax);
            Ok(self.with_reference([xmin, ymin, xmax, ymax], SpatialReference::wgs84()))
        } else {
            Err(GeometryError::UnsupportedProjection(sr.to_string()))
        }
    }

    /// This extent in spherical Web Mercator meters.
    ///
    /// Geographic latitudes are clamped to the range Web Mercator can represent.
    pub fn project_to_web_mercator(&self) -> GeometryResult<Extent> {
        let sr = &self.spatial_reference;
        if sr.is_web_mercator() {
            Ok(self.clone())
        } else if sr.is_geographic() {
            let max_lat = GLOBAL_EXTENT_WGS84_CORRECTED[3];
            let clamp = |lat: f64| lat.clamp(-max_lat, max_lat);
            let (xmin, ymin) = geographic_to_mercator(self.xmin, clamp(self.ymin));
            let (xmax, ymax) = geographic_to_mercator(self.xmax, clamp(self.ymax));
            Ok(self.with_reference([xmin, ymin, xmax, ymax], SpatialReference::web_mercator()))
        } else {
            Err(GeometryError::UnsupportedProjection(sr.to_string()))
        }
    }
}

impl PartialEq for Extent {
    fn eq(&self, other: &Self) -> bool {
        self.xmin == other.xmin
            && self.ymin == other.ymin
            && self.xmax == other.xmax
            && self.ymax == other.ymax
            && self.spatial_reference == other.spatial_reference
    }
}

/// Renders the ESRI JSON form.
impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_json_string(true, None))
    }
}

impl Serialize for Extent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_dict(false, None).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Extent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Extent::from_value(&value, None).map_err(D::Error::custom)
    }
}

fn geographic_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

fn mercator_to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

fn parse_coordinate(text: &str) -> GeometryResult<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite())
        .ok_or_else(|| GeometryError::bad_extent("coordinate is not a number", text))
}

fn value_to_coordinate(value: &Value) -> GeometryResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| GeometryError::bad_extent("coordinate is not a number", value)),
        Value::String(s) => parse_coordinate(s),
        other => Err(GeometryError::bad_extent("coordinate is not a number", other)),
    }
}

fn format_label(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// Round to two significant digits for display: 444.3 -> 440, -4.321 -> -4.3.
pub fn extract_significant_digits(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let digits = value.abs().log10().floor() as i32 + 1;
    let places = 2 - digits;
    if places >= 0 {
        let factor = 10f64.powi(places);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-places);
        (value / factor).round() * factor
    }
}

/// The smallest extent containing every non-empty input, in the spatial
/// reference of the first one. `None` if there are no extents at all.
pub fn union_extent<'a, I>(extents: I) -> Option<Extent>
where
    I: IntoIterator<Item = Option<&'a Extent>>,
{
    let mut extents = extents.into_iter().flatten();
    let first = extents.next()?;
    let mut union = Extent::new(
        first.xmin,
        first.ymin,
        first.xmax,
        first.ymax,
        first.spatial_reference.clone(),
    );
    for extent in extents {
        union.xmin = union.xmin.min(extent.xmin);
        union.ymin = union.ymin.min(extent.ymin);
        union.xmax = union.xmax.max(extent.xmax);
        union.ymax = union.ymax.max(extent.ymax);
    }
    Some(union)
}
