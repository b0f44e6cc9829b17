//! The empty terrain tile served when a source has no coverage.

use crate::{WGS84, generate_grid, geodetic_normals, quantized::encode_quantized_mesh, to_ecef};
use anyhow::Result;
use terratiles_core::{GeoBBox, TILE_SIZE, rescale_positions};

/// Lattice resolution of the empty tile.
const EMPTY_GRID_SIZE: u32 = 20;

/// Encode a flat tile at the fill height covering the given bounds.
///
/// Uses a coarse 20×20 grid. Geodetic surface normals (the ellipsoid
/// normal at every vertex) are included only when the client asked for
/// the normals extension, so the bytes are deterministic per
/// `(bounds, fill_height, with_normals)`.
pub fn empty_tile(bounds: GeoBBox, fill_height: f64, with_normals: bool) -> Result<Vec<u8>> {
	let template = generate_grid(
		TILE_SIZE as u32,
		TILE_SIZE as u32,
		EMPTY_GRID_SIZE,
		EMPTY_GRID_SIZE,
	);
	let vertices: Vec<[f64; 3]> = template
		.vertices
		.iter()
		.map(|v| [v[0], v[1], fill_height])
		.collect();

	let rescaled = rescale_positions(&vertices, bounds, false);
	let normals = if with_normals {
		let cartesian = to_ecef(&rescaled, &WGS84);
		Some(geodetic_normals(&cartesian))
	} else {
		None
	};

	encode_quantized_mesh(&rescaled, &template.triangles, normals.as_deref())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::quantized::decode_quantized_mesh;

	fn bounds() -> GeoBBox {
		GeoBBox::new(-180.0, -90.0, 0.0, 90.0).unwrap()
	}

	#[test]
	fn geometry_is_a_coarse_grid() {
		let bytes = empty_tile(bounds(), 0.0, false).unwrap();
		let tile = decode_quantized_mesh(&bytes).unwrap();
		assert_eq!(tile.vertex_count(), 21 * 21);
		assert_eq!(tile.triangles.len(), 20 * 20 * 2);
		assert_eq!(tile.min_height, 0.0);
		assert_eq!(tile.max_height, 0.0);
		assert!(tile.normal_bytes.is_none());
	}

	#[test]
	fn normals_present_iff_requested() {
		let with = empty_tile(bounds(), 0.0, true).unwrap();
		let tile = decode_quantized_mesh(&with).unwrap();
		assert!(tile.normal_bytes.is_some());
		let without = empty_tile(bounds(), 0.0, false).unwrap();
		assert!(decode_quantized_mesh(&without).unwrap().normal_bytes.is_none());
	}

	#[test]
	fn bytes_are_deterministic() {
		let first = empty_tile(bounds(), 0.0, true).unwrap();
		let second = empty_tile(bounds(), 0.0, true).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn fill_height_is_applied() {
		let bytes = empty_tile(bounds(), -32.5, false).unwrap();
		let tile = decode_quantized_mesh(&bytes).unwrap();
		assert_eq!(tile.min_height, -32.5);
		assert_eq!(tile.max_height, -32.5);
		for height in tile.heights() {
			assert_eq!(height, -32.5);
		}
	}
}
