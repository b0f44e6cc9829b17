//! Regular grid lattices used by the grid processor and empty tiles.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

/// A 2D lattice with its CCW triangulation, heights not yet applied.
#[derive(Clone, Debug, PartialEq)]
pub struct GridTemplate {
	pub vertices: Vec<[f64; 2]>,
	pub triangles: Vec<[u32; 3]>,
}

lazy_static! {
	static ref GRID_CACHE: Mutex<HashMap<(u32, u32, u32), GridTemplate>> = Mutex::new(HashMap::new());
}

/// Generate a grid of vertices and triangles over `[0, width] × [0, height]`.
///
/// Produces an `(num_rows + 1) × (num_cols + 1)` lattice of integer-floored
/// positions, each cell split into two counterclockwise triangles
/// `(tl, tr, bl), (bl, tr, br)`. Results are cached per
/// `(width, rows, cols)` since the same few lattices are requested for
/// every tile.
pub fn generate_grid(width: u32, height: u32, num_rows: u32, num_cols: u32) -> GridTemplate {
	let num_rows = num_rows.min(height);
	let num_cols = num_cols.min(width);

	let cache_key = (width, num_rows, num_cols);
	if let Some(template) = GRID_CACHE.lock().unwrap().get(&cache_key) {
		return template.clone();
	}

	let mut vertices = Vec::with_capacity(((num_rows + 1) * (num_cols + 1)) as usize);
	for row in 0..=num_rows {
		let y = (f64::from(row) * f64::from(height) / f64::from(num_rows)).floor();
		for col in 0..=num_cols {
			let x = (f64::from(col) * f64::from(width) / f64::from(num_cols)).floor();
			vertices.push([x, y]);
		}
	}

	let mut triangles = Vec::with_capacity((num_rows * num_cols * 2) as usize);
	for row in 0..num_rows {
		for col in 0..num_cols {
			let top_left = row * (num_cols + 1) + col;
			let top_right = top_left + 1;
			let bottom_left = (row + 1) * (num_cols + 1) + col;
			let bottom_right = bottom_left + 1;
			triangles.push([top_left, top_right, bottom_left]);
			triangles.push([bottom_left, top_right, bottom_right]);
		}
	}

	let template = GridTemplate { vertices, triangles };
	GRID_CACHE.lock().unwrap().insert(cache_key, template.clone());
	template
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counts_match_the_lattice() {
		let grid = generate_grid(255, 255, 20, 20);
		assert_eq!(grid.vertices.len(), 21 * 21);
		assert_eq!(grid.triangles.len(), 20 * 20 * 2);
	}

	#[test]
	fn corners_touch_the_extent() {
		let grid = generate_grid(255, 255, 20, 20);
		assert_eq!(grid.vertices[0], [0.0, 0.0]);
		assert_eq!(grid.vertices[20], [255.0, 0.0]);
		assert_eq!(*grid.vertices.last().unwrap(), [255.0, 255.0]);
	}

	#[test]
	fn oversized_requests_are_capped() {
		let grid = generate_grid(4, 4, 9, 9);
		assert_eq!(grid.vertices.len(), 5 * 5);
	}

	#[test]
	fn winding_is_counterclockwise() {
		let grid = generate_grid(255, 255, 2, 2);
		for tri in &grid.triangles {
			let a = grid.vertices[tri[0] as usize];
			let b = grid.vertices[tri[1] as usize];
			let c = grid.vertices[tri[2] as usize];
			let area2 = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
			assert!(area2 > 0.0, "triangle {tri:?} is not CCW");
		}
	}

	#[test]
	fn cached_result_is_identical() {
		let first = generate_grid(255, 255, 7, 7);
		let second = generate_grid(255, 255, 7, 7);
		assert_eq!(first, second);
	}
}
