//! Linear rescaling of pixel-space vertices into geographic bounds.

use crate::types::GeoBBox;

/// Linearly map pixel-space vertices (`x, y ∈ [0, tile_size]`) into the
/// geographic bounds of a tile, preserving heights.
///
/// The pixel extent is taken from the largest x/y coordinate among the
/// vertices, so a 20×20 grid over a 256 lattice and a 255-sized TIN both
/// rescale correctly. With `flip_y` the image-style top-origin y axis is
/// inverted while mapping.
pub fn rescale_positions(vertices: &[[f64; 3]], bounds: GeoBBox, flip_y: bool) -> Vec<[f64; 3]> {
	let tile_size = vertices
		.iter()
		.fold(0.0f64, |acc, v| acc.max(v[0]).max(v[1]));
	if tile_size == 0.0 {
		return vertices
			.iter()
			.map(|v| [bounds.x_min, if flip_y { bounds.y_max } else { bounds.y_min }, v[2]])
			.collect();
	}

	let x_scale = bounds.width() / tile_size;
	let y_scale = bounds.height() / tile_size;

	vertices
		.iter()
		.map(|v| {
			let x = bounds.x_min + v[0] * x_scale;
			let y = if flip_y {
				bounds.y_max - v[1] * y_scale
			} else {
				bounds.y_min + v[1] * y_scale
			};
			[x, y, v[2]]
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn corners_map_to_bounds() {
		let bounds = GeoBBox::new(4.0, 50.0, 6.0, 52.0).unwrap();
		let vertices = [
			[0.0, 0.0, 7.0],
			[255.0, 0.0, 8.0],
			[0.0, 255.0, 9.0],
			[255.0, 255.0, 10.0],
		];
		let out = rescale_positions(&vertices, bounds, false);
		assert_relative_eq!(out[0][0], 4.0);
		assert_relative_eq!(out[0][1], 50.0);
		assert_relative_eq!(out[3][0], 6.0);
		assert_relative_eq!(out[3][1], 52.0);
		// heights untouched
		assert_eq!(out[0][2], 7.0);
		assert_eq!(out[3][2], 10.0);
	}

	#[test]
	fn flip_y_inverts_the_axis() {
		let bounds = GeoBBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
		let vertices = [[0.0, 0.0, 0.0], [2.0, 2.0, 0.0]];
		let out = rescale_positions(&vertices, bounds, true);
		assert_relative_eq!(out[0][1], 1.0);
		assert_relative_eq!(out[1][1], 0.0);
	}
}
