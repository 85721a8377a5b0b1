//! Spatial reference, extent and tile pyramid types shared by the map-service clients.

pub mod error;
pub mod extent;
pub mod spatial_reference;
pub mod tile_levels;
pub mod wkt;

pub use error::{GeometryError, GeometryResult};
pub use extent::{extract_significant_digits, union_extent, Extent, OriginalFormat};
pub use spatial_reference::SpatialReference;
pub use tile_levels::TileLevels;
