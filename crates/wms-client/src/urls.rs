//! Service URL handling.

use reqwest::Url;

use crate::{ClientError, ClientResult};

/// Query parameters owned by the client; stripped from caller URLs.
const RESERVED_PARAMS: [&str; 3] = ["service", "request", "version"];

/// A caller's service URL, reduced to what every request is sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUrl {
    /// Base URL plus any custom query parameters the caller supplied
    pub wms_url: String,
    /// The URL embeds a second absolute URL (a forwarding proxy)
    pub behind_proxy: bool,
    pub is_ncwms: bool,
}

impl ServiceUrl {
    pub fn parse(url: &str, token: Option<&str>) -> ClientResult<Self> {
        let mut parsed = Url::parse(url.trim()).map_err(|e| ClientError::Validation {
            message: format!("Invalid service URL ({})", e),
            url: url.to_string(),
        })?;

        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| !RESERVED_PARAMS.iter().any(|p| key.eq_ignore_ascii_case(p)))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        set_query(&mut parsed, &kept);

        let mut wms_url = parsed.to_string();
        if let Some(token) = token {
            wms_url = update_url_params(&wms_url, &[("token", token)]);
        }

        let path = parsed.path().to_ascii_lowercase();
        let is_ncwms = path.contains("/ncwms/") || path.ends_with(".nc");

        Ok(Self {
            behind_proxy: is_behind_proxy(&wms_url),
            is_ncwms,
            wms_url,
        })
    }
}

/// True when a second `http://` or `https://` appears after the start.
pub fn is_behind_proxy(url: &str) -> bool {
    url.rfind("http://").is_some_and(|i| i > 0) || url.rfind("https://").is_some_and(|i| i > 0)
}

/// `url` with `params` set, replacing existing parameters of the same name.
/// Unparsable URLs are returned unchanged.
pub fn update_url_params(url: &str, params: &[(&str, &str)]) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(p, _)| key.eq_ignore_ascii_case(p)))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    set_query(&mut parsed, &pairs);
    parsed.to_string()
}

/// Query parameters of `url`, in order.
pub fn query_params(url: &str) -> Vec<(String, String)> {
    Url::parse(url)
        .map(|parsed| {
            parsed
                .query_pairs()
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn set_query(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}
