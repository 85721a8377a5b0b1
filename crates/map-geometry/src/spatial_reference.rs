//! Coordinate reference system identification.
//!
//! A [`SpatialReference`] carries whatever identifying data a service gave us:
//! an ESRI/EPSG well-known ID, a "latest" WKID, an `AUTHORITY:CODE` string, or
//! a WKT definition. Classification (geographic, Web Mercator) works from any
//! of them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wkt::WktNode;
use crate::{GeometryError, GeometryResult};

/// EPSG codes (and historical aliases) of the spherical Web Mercator projection.
pub const WEB_MERCATOR_CODES: [u32; 4] = [3857, 3785, 900913, 102113];

/// Canonical `AUTHORITY:CODE` aliases of Web Mercator, as advertised by WMS services.
pub const WEB_MERCATOR_SRS: [&str; 4] = ["EPSG:3857", "EPSG:3785", "EPSG:900913", "EPSG:102113"];

/// Geographic (latitude/longitude) EPSG codes recognised without a WKT definition.
const GEOGRAPHIC_CODES: [u32; 8] = [4326, 4269, 4267, 4258, 4283, 4617, 4674, 4230];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<u32>,
    #[serde(
        default,
        rename = "latestWkid",
        alias = "latest_wkid",
        skip_serializing_if = "Option::is_none"
    )]
    pub latest_wkid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkt: Option<String>,
}

impl SpatialReference {
    pub fn from_wkid(wkid: u32) -> Self {
        Self {
            wkid: Some(wkid),
            latest_wkid: Some(wkid.to_string()),
            srs: Some(format!("EPSG:{}", wkid)),
            wkt: None,
        }
    }

    /// Build from an `AUTHORITY:CODE` string such as "EPSG:4326" or "CRS:84".
    ///
    /// The WKID is filled in when the string is an EPSG code.
    pub fn from_srs(srs: &str) -> Self {
        let srs = srs.trim();
        let wkid = parse_epsg(srs).filter(|_| srs.get(..5).is_some_and(|a| a.eq_ignore_ascii_case("EPSG:")));
        Self {
            wkid,
            latest_wkid: wkid.map(|w| w.to_string()),
            srs: Some(srs.to_string()),
            wkt: None,
        }
    }

    pub fn from_wkt(wkt: &str) -> Self {
        Self {
            wkt: Some(wkt.to_string()),
            ..Default::default()
        }
    }

    /// WGS84 geographic coordinates.
    pub fn wgs84() -> Self {
        Self::from_wkid(4326)
    }

    /// Spherical Web Mercator.
    pub fn web_mercator() -> Self {
        Self::from_wkid(3857)
    }

    /// Build from loosely-shaped service data: a number (WKID), a string
    /// (`AUTHORITY:CODE`, a numeric WKID or a WKT definition) or an object
    /// with any of `wkid`, `latestWkid`, `srs` and `wkt` (keys matched
    /// case-insensitively, snake or camel case).
    pub fn from_value(value: &Value) -> GeometryResult<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Self::from_wkid)
                .ok_or_else(|| GeometryError::BadSpatialReference(value.to_string())),
            Value::String(s) => Ok(Self::from_str_value(s)),
            Value::Object(map) => {
                let mut sr = SpatialReference::default();
                for (key, value) in map {
                    let key = key.replace('_', "").to_ascii_lowercase();
                    match key.as_str() {
                        "wkid" => sr.wkid = value_to_wkid(value),
                        "latestwkid" => {
                            sr.latest_wkid = match value {
                                Value::String(s) => Some(s.clone()),
                                Value::Number(n) => Some(n.to_string()),
                                _ => None,
                            }
                        }
                        "srs" | "crs" => sr.srs = value.as_str().map(|s| s.trim().to_string()),
                        "wkt" => sr.wkt = value.as_str().map(str::to_string),
                        _ => {}
                    }
                }
                if sr.is_empty() {
                    return Err(GeometryError::BadSpatialReference(value.to_string()));
                }
                Ok(sr)
            }
            _ => Err(GeometryError::BadSpatialReference(value.to_string())),
        }
    }

    fn from_str_value(s: &str) -> Self {
        let trimmed = s.trim();
        if let Ok(wkid) = trimmed.parse::<u32>() {
            Self::from_wkid(wkid)
        } else if trimmed.contains('[') {
            Self::from_wkt(trimmed)
        } else {
            Self::from_srs(trimmed)
        }
    }

    /// True when no identifying attribute is present.
    pub fn is_empty(&self) -> bool {
        self.wkid.is_none() && self.latest_wkid.is_none() && self.srs.is_none() && self.wkt.is_none()
    }

    /// Resolve an EPSG code from any identifying attribute.
    ///
    /// `CRS:84` resolves to 4326; ESRI's 102100 resolves through `latest_wkid`.
    pub fn epsg_code(&self) -> Option<u32> {
        self.wkid
            .or_else(|| self.latest_wkid.as_deref().and_then(|s| s.trim().parse().ok()))
            .or_else(|| self.srs.as_deref().and_then(parse_epsg))
            .or_else(|| self.parsed_wkt().and_then(|node| node.epsg_code()))
    }

    fn parsed_wkt(&self) -> Option<WktNode> {
        self.wkt.as_deref().and_then(|wkt| WktNode::parse(wkt).ok())
    }

    fn codes(&self) -> impl Iterator<Item = u32> + '_ {
        let latest = self.latest_wkid.as_deref().and_then(|s| s.trim().parse().ok());
        let srs = self.srs.as_deref().and_then(parse_epsg);
        self.wkid.into_iter().chain(latest).chain(srs)
    }

    /// True if the CRS is a latitude/longitude system.
    pub fn is_geographic(&self) -> bool {
        if self.codes().any(|code| GEOGRAPHIC_CODES.contains(&code)) {
            return true;
        }
        if let Some(srs) = self.srs.as_deref() {
            if ["CRS:84", "CRS:83", "CRS:27"]
                .iter()
                .any(|alias| srs.eq_ignore_ascii_case(alias))
            {
                return true;
            }
        }
        self.parsed_wkt().map(|node| node.is_geographic()).unwrap_or(false)
    }

    /// True if the CRS is one of the spherical Web Mercator aliases.
    pub fn is_web_mercator(&self) -> bool {
        if self.codes().any(|code| WEB_MERCATOR_CODES.contains(&code)) {
            return true;
        }
        self.parsed_wkt()
            .map(|node| {
                node.is_web_mercator()
                    || node.epsg_code().map(|c| WEB_MERCATOR_CODES.contains(&c)).unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// True if the projection definition can be used.
    ///
    /// A WKT definition must parse to a CRS node; a PROJ string must name a
    /// known `+proj` method; an identifier-only reference must resolve to an
    /// EPSG code.
    pub fn is_valid_projection(&self) -> bool {
        if let Some(wkt) = self.wkt.as_deref() {
            return WktNode::parse(wkt).map(|node| node.is_crs()).unwrap_or(false);
        }
        if let Some(srs) = self.srs.as_deref().map(str::trim) {
            if srs.starts_with('+') {
                return is_valid_proj_string(srs);
            }
        }
        self.epsg_code().is_some()
    }

    /// Serialize using the most specific identifier present: `wkid`, then `srs`, then `wkt`.
    pub fn as_dict(&self) -> Value {
        let mut map = Map::new();
        if let Some(wkid) = self.wkid {
            map.insert("wkid".to_string(), Value::from(wkid));
        } else if let Some(srs) = &self.srs {
            map.insert("srs".to_string(), Value::from(srs.clone()));
        } else if let Some(wkt) = &self.wkt {
            map.insert("wkt".to_string(), Value::from(wkt.clone()));
        }
        Value::Object(map)
    }

    pub fn as_json_string(&self) -> String {
        self.as_dict().to_string()
    }
}

/// Identifier equivalence: all Web Mercator aliases are equal to each other,
/// otherwise EPSG codes are compared, and WKT text as a last resort.
impl PartialEq for SpatialReference {
    fn eq(&self, other: &Self) -> bool {
        if self.is_web_mercator() && other.is_web_mercator() {
            return true;
        }
        match (self.epsg_code(), other.epsg_code()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (&self.wkt, &other.wkt) {
                (Some(a), Some(b)) => a.trim() == b.trim(),
                _ => self.srs == other.srs,
            },
            _ => false,
        }
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(srs) = &self.srs {
            write!(f, "{}", srs)
        } else if let Some(code) = self.epsg_code() {
            write!(f, "EPSG:{}", code)
        } else if self.wkt.is_some() {
            write!(f, "WKT")
        } else {
            write!(f, "unknown")
        }
    }
}

fn parse_epsg(srs: &str) -> Option<u32> {
    let (authority, code) = srs.trim().split_once(':')?;
    if authority.eq_ignore_ascii_case("EPSG") {
        code.trim().parse().ok()
    } else if authority.eq_ignore_ascii_case("CRS") && code.trim() == "84" {
        Some(4326)
    } else {
        None
    }
}

fn value_to_wkid(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Projection methods understood by PROJ (`proj -l`), plus the geographic
/// and geocentric pseudo-projections.
const PROJ_METHODS: &[&str] = &[
    "aea", "aeqd", "airy", "aitoff", "alsk", "apian", "august", "bacon", "bipc", "boggs", "bonne",
    "calcofi", "cass", "cc", "cea", "chamb", "collg", "comill", "crast", "denoy", "eck1", "eck2",
    "eck3", "eck4", "eck5", "eck6", "eqc", "eqdc", "eqearth", "etmerc", "euler", "fahey", "fouc",
    "fouc_s", "gall", "geocent", "geos", "gins8", "gn_sinu", "gnom", "goode", "gs48", "gs50",
    "gstmerc", "hammer", "hatano", "healpix", "igh", "imw_p", "isea", "kav5", "kav7", "krovak",
    "labrd", "laea", "lagrng", "larr", "lask", "latlon", "latlong", "lcc", "lcca", "leac", "lonlat",
    "longlat", "loxim", "lsat", "mbt_fps", "mbt_s", "mbtfpp", "mbtfpq", "mbtfps", "merc", "mil_os",
    "mill", "moll", "murd1", "murd2", "murd3", "natearth", "natearth2", "nell", "nell_h", "nicol",
    "nsper", "nzmg", "ob_tran", "ocea", "oea", "omerc", "ortel", "ortho", "patterson", "pconic",
    "poly", "putp1", "putp2", "putp3", "putp3p", "putp4p", "putp5", "putp5p", "putp6", "putp6p",
    "qsc", "qua_aut", "rhealpix", "robin", "rouss", "rpoly", "sch", "sinu", "somerc", "stere",
    "sterea", "tcc", "tcea", "times", "tissot", "tmerc", "tobmerc", "tpeqd", "tpers", "ups", "urm5",
    "urmfps", "utm", "vandg", "vandg2", "vandg3", "vandg4", "vitk1", "wag1", "wag2", "wag3", "wag4",
    "wag5", "wag6", "wag7", "webmerc", "weren", "wink1", "wink2", "wintri",
];

/// A PROJ string is a whitespace separated list of `+key` or `+key=value`
/// tokens, one of which must be `+proj=<name>`.
fn is_valid_proj_string(definition: &str) -> bool {
    let mut has_proj = false;
    for token in definition.split_whitespace() {
        let Some(token) = token.strip_prefix('+') else {
            return false;
        };
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (token, None),
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
        if key == "proj" {
            match value {
                Some(name) if PROJ_METHODS.contains(&name) => has_proj = true,
                _ => return false,
            }
        }
    }
    has_proj
}
