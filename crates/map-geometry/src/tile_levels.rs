//! Zoom-level resolution pyramid for snapping extents to tile scales.

use once_cell::sync::Lazy;

use crate::{Extent, GeometryError, GeometryResult};

/// Resolution of zoom level 0 in the Google/OSM Web Mercator tiling scheme
/// (one 256 pixel tile covering the world).
pub const BASE_RESOLUTION: f64 = 156543.03392804097;

/// Highest zoom level of the standard pyramid.
pub const MAX_ZOOM: u32 = 22;

static WEB_MERCATOR_LEVELS: Lazy<TileLevels> = Lazy::new(|| TileLevels {
    resolutions: (0..=MAX_ZOOM)
        .map(|zoom| BASE_RESOLUTION / 2f64.powi(zoom as i32))
        .collect(),
});

/// Ordered (level, resolution) table with strictly decreasing resolutions.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLevels {
    resolutions: Vec<f64>,
}

impl TileLevels {
    pub fn new(resolutions: Vec<f64>) -> GeometryResult<Self> {
        if resolutions.is_empty() {
            return Err(GeometryError::InvalidTileLevels("no resolutions".to_string()));
        }
        if let Some(pair) = resolutions.windows(2).find(|pair| pair[1] >= pair[0]) {
            return Err(GeometryError::InvalidTileLevels(format!(
                "resolutions must strictly decrease ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self { resolutions })
    }

    /// The standard Web Mercator pyramid, levels 0 through 22.
    pub fn web_mercator() -> &'static TileLevels {
        &WEB_MERCATOR_LEVELS
    }

    pub fn resolutions(&self) -> &[f64] {
        &self.resolutions
    }

    pub fn levels(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.resolutions.iter().copied().enumerate()
    }

    /// Level whose resolution is closest to `resolution`. On a tie the
    /// coarser (lower) level wins.
    pub fn get_nearest_tile_level_and_resolution(&self, resolution: f64) -> (usize, f64) {
        let mut nearest = (0, self.resolutions[0]);
        for (level, candidate) in self.levels().skip(1) {
            if (candidate - resolution).abs() < (nearest.1 - resolution).abs() {
                nearest = (level, candidate);
            }
        }
        nearest
    }

    /// Resolutions within `[min_resolution, max_resolution]`, coarsest first.
    pub fn get_matching_resolutions(&self, min_resolution: f64, max_resolution: f64) -> Vec<f64> {
        self.resolutions
            .iter()
            .copied()
            .filter(|r| *r >= min_resolution && *r <= max_resolution)
            .collect()
    }

    /// Resize `extent` about its center so that a `width` x `height` image of
    /// it has exactly the nearest pyramid resolution. The result is in
    /// Web Mercator.
    pub fn snap_extent_to_nearest_tile_level(
        &self,
        extent: &Extent,
        width: u32,
        height: u32,
    ) -> GeometryResult<Extent> {
        let mercator = extent.project_to_web_mercator()?;
        let (_, resolution) =
            self.get_nearest_tile_level_and_resolution(mercator.get_image_resolution(width, height));

        let (center_x, center_y) = mercator.get_center();
        let half_width = resolution * width as f64 / 2.0;
        let half_height = resolution * height as f64 / 2.0;
        Ok(mercator.with_coords(
            center_x - half_width,
            center_y - half_height,
            center_x + half_width,
            center_y + half_height,
        ))
    }
}

impl Default for TileLevels {
    fn default() -> Self {
        WEB_MERCATOR_LEVELS.clone()
    }
}
