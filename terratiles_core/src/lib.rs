//! Tile index and geometry primitives shared by all terratiles crates.
//!
//! Contains the TMS tile coordinate type, geographic bounding boxes,
//! neighbor directions, heightmaps, meshes and resampling identifiers.

mod rescale;
pub mod types;

pub use rescale::*;
pub use types::*;

/// Edge length of the heightmap window every source tile is read at.
pub const TILE_SIZE: usize = 256;

/// Deepest zoom level supported by the WGS84 geographic tiling.
pub const MAX_ZOOM: u8 = 23;
