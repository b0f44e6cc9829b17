//! Value types: tile coordinates, bounding boxes, directions, heightmaps and meshes.

mod direction;
pub use direction::*;

mod geo_bbox;
pub use geo_bbox::*;

mod heightmap;
pub use heightmap::*;

mod mesh;
pub use mesh::*;

mod resampling;
pub use resampling::*;

mod tile_coord;
pub use tile_coord::*;
