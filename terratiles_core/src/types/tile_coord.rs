//! This module defines [`TileCoord`], a tile index on the WGS84 geographic
//! tiling (two root tiles, `EPSG:4326`). Coordinates follow the TMS
//! convention with the origin at the bottom-left; Cesium's wire convention
//! flips the y axis, which is converted exactly once at the HTTP boundary
//! via [`TileCoord::from_cesium`] / [`TileCoord::to_cesium`].
//!
//! # Examples
//!
//! ```
//! use terratiles_core::TileCoord;
//!
//! let coord = TileCoord::new(10, 1052, 802).unwrap();
//! assert_eq!(coord.z, 10);
//!
//! // Cesium flips y on the wire
//! let wire = coord.to_cesium();
//! assert_eq!(TileCoord::from_cesium(wire.0, wire.1, wire.2).unwrap(), coord);
//! ```

use crate::MAX_ZOOM;
use crate::types::{Direction, GeoBBox};
use anyhow::{Result, ensure};
use std::fmt::{self, Debug};

/// A TMS tile index on the WGS84 geographic 2×1 tiling.
///
/// Invariants (checked by [`TileCoord::new`]):
/// `z ≤ 23`, `x < 2·2^z`, `y < 2^z`.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct TileCoord {
	pub z: u8,
	pub x: u32,
	pub y: u32,
}

impl TileCoord {
	pub fn new(z: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(z <= MAX_ZOOM, "zoom level ({z}) must be <= {MAX_ZOOM}");
		ensure!(
			x < Self::max_x(z),
			"x ({x}) must be < {} at zoom {z}",
			Self::max_x(z)
		);
		ensure!(
			y < Self::max_y(z),
			"y ({y}) must be < {} at zoom {z}",
			Self::max_y(z)
		);
		Ok(TileCoord { z, x, y })
	}

	/// Number of tile columns at a zoom level (two root tiles wide).
	pub fn max_x(z: u8) -> u32 {
		2 * (1 << z)
	}

	/// Number of tile rows at a zoom level.
	pub fn max_y(z: u8) -> u32 {
		1 << z
	}

	/// Edge length of a tile in degrees at a zoom level.
	pub fn tile_span(z: u8) -> f64 {
		180.0 / f64::from(1u32 << z)
	}

	/// Convert an incoming Cesium tile index (flipped y) to TMS.
	pub fn from_cesium(z: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(z <= MAX_ZOOM, "zoom level ({z}) must be <= {MAX_ZOOM}");
		ensure!(y < Self::max_y(z), "y ({y}) out of range at zoom {z}");
		TileCoord::new(z, x, Self::max_y(z) - 1 - y)
	}

	/// Convert this TMS index to the Cesium wire convention (flipped y).
	pub fn to_cesium(&self) -> (u8, u32, u32) {
		(self.z, self.x, Self::max_y(self.z) - 1 - self.y)
	}

	/// Geographic bounds of this tile; the TMS origin is the bottom-left,
	/// so `y == 0` touches latitude -90.
	pub fn geo_bbox(&self) -> GeoBBox {
		let span = Self::tile_span(self.z);
		GeoBBox {
			x_min: -180.0 + f64::from(self.x) * span,
			y_min: -90.0 + f64::from(self.y) * span,
			x_max: -180.0 + f64::from(self.x + 1) * span,
			y_max: -90.0 + f64::from(self.y + 1) * span,
		}
	}

	/// The neighboring tile in a direction, if it exists.
	///
	/// x wraps around the anti-meridian; y clamps, so tiles on the top or
	/// bottom row have no north/south neighbor.
	pub fn neighbor(&self, direction: Direction) -> Option<TileCoord> {
		let (dx, dy) = direction.offset();
		let max_x = i64::from(Self::max_x(self.z));
		let x = (i64::from(self.x) + i64::from(dx)).rem_euclid(max_x) as u32;
		let y = i64::from(self.y) + i64::from(dy);
		if y < 0 || y >= i64::from(Self::max_y(self.z)) {
			return None;
		}
		Some(TileCoord { z: self.z, x, y: y as u32 })
	}

	/// All existing neighbors in N, NE, E, SE, S, SW, W, NW order.
	///
	/// Polar rows yield fewer than eight entries.
	pub fn neighbors(&self) -> Vec<TileCoord> {
		Direction::ALL
			.iter()
			.filter_map(|dir| self.neighbor(*dir))
			.collect()
	}
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("TileCoord({}, [{}, {}])", &self.z, &self.x, &self.y))
	}
}

impl fmt::Display for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("{}/{}/{}", self.z, self.x, self.y))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_validates_ranges() {
		assert!(TileCoord::new(0, 0, 0).is_ok());
		assert!(TileCoord::new(0, 1, 0).is_ok());
		assert!(TileCoord::new(0, 2, 0).is_err());
		assert!(TileCoord::new(0, 0, 1).is_err());
		assert!(TileCoord::new(24, 0, 0).is_err());
	}

	#[test]
	fn geo_bbox_of_root_tiles() {
		let west = TileCoord::new(0, 0, 0).unwrap().geo_bbox();
		assert_eq!(west.as_array(), [-180.0, -90.0, 0.0, 90.0]);
		let east = TileCoord::new(0, 1, 0).unwrap().geo_bbox();
		assert_eq!(east.as_array(), [0.0, -90.0, 180.0, 90.0]);
	}

	#[test]
	fn geo_bbox_is_bottom_origin() {
		let coord = TileCoord::new(1, 0, 0).unwrap();
		assert_eq!(coord.geo_bbox().as_array(), [-180.0, -90.0, -90.0, 0.0]);
		let coord = TileCoord::new(1, 0, 1).unwrap();
		assert_eq!(coord.geo_bbox().as_array(), [-180.0, 0.0, -90.0, 90.0]);
	}

	#[test]
	fn cesium_round_trip() {
		for z in [0u8, 1, 5, 10] {
			for (x, y) in [(0u32, 0u32), (1, 0), (2 * (1 << z) - 1, (1 << z) - 1)] {
				let coord = TileCoord::new(z, x, y).unwrap();
				let (cz, cx, cy) = coord.to_cesium();
				assert_eq!(TileCoord::from_cesium(cz, cx, cy).unwrap(), coord);
			}
		}
	}

	#[test]
	fn neighbors_in_the_middle() {
		let coord = TileCoord::new(2, 3, 2).unwrap();
		let neighbors = coord.neighbors();
		assert_eq!(neighbors.len(), 8);
		assert_eq!(neighbors[0], TileCoord::new(2, 3, 3).unwrap()); // N
		assert_eq!(neighbors[1], TileCoord::new(2, 4, 3).unwrap()); // NE
		assert_eq!(neighbors[2], TileCoord::new(2, 4, 2).unwrap()); // E
		assert_eq!(neighbors[3], TileCoord::new(2, 4, 1).unwrap()); // SE
		assert_eq!(neighbors[4], TileCoord::new(2, 3, 1).unwrap()); // S
		assert_eq!(neighbors[5], TileCoord::new(2, 2, 1).unwrap()); // SW
		assert_eq!(neighbors[6], TileCoord::new(2, 2, 2).unwrap()); // W
		assert_eq!(neighbors[7], TileCoord::new(2, 2, 3).unwrap()); // NW
	}

	#[test]
	fn neighbors_wrap_at_the_anti_meridian() {
		let coord = TileCoord::new(1, 0, 0).unwrap();
		let west = coord.neighbor(Direction::West).unwrap();
		assert_eq!(west.x, 3);
		let east = TileCoord::new(1, 3, 0).unwrap().neighbor(Direction::East).unwrap();
		assert_eq!(east.x, 0);
	}

	#[test]
	fn neighbors_clamp_at_the_poles() {
		let bottom = TileCoord::new(2, 1, 0).unwrap();
		assert!(bottom.neighbor(Direction::South).is_none());
		assert!(bottom.neighbor(Direction::SouthEast).is_none());
		assert!(bottom.neighbor(Direction::SouthWest).is_none());
		assert_eq!(bottom.neighbors().len(), 5);

		let top = TileCoord::new(2, 1, 3).unwrap();
		assert!(top.neighbor(Direction::North).is_none());
		assert_eq!(top.neighbors().len(), 5);
	}
}
