//! Right-triangulated multiresolution TIN over a `2^n + 1` heightmap.
//!
//! The triangle hierarchy and error map are precomputed once per grid
//! size; extracting a mesh for a given max error is then a cheap
//! recursive walk. The grid must be `2^n + 1` pixels on each side, one
//! more than the regular tile window, which the reader provides via a
//! half-pixel buffer.

use anyhow::{Result, ensure};
use terratiles_core::{Heightmap, Mesh};

/// Precomputed triangle hierarchy for one grid size.
pub struct Martini {
	grid_size: usize,
	num_triangles: usize,
	num_parent_triangles: usize,
	/// Long-edge endpoints (ax, ay, bx, by) per triangle in the implicit
	/// binary tree.
	coords: Vec<u16>,
}

impl Martini {
	pub fn new(grid_size: usize) -> Result<Martini> {
		let tile_size = grid_size - 1;
		ensure!(
			tile_size & (tile_size - 1) == 0,
			"martini grid size must be 2^n + 1, got {grid_size}"
		);

		let num_triangles = tile_size * tile_size * 2 - 2;
		let num_parent_triangles = num_triangles - tile_size * tile_size;

		let mut coords = vec![0u16; num_triangles * 4];
		for i in 0..num_triangles {
			let mut id = i + 2;
			let (mut ax, mut ay, mut bx, mut by, mut cx, mut cy) = (0i32, 0, 0, 0, 0, 0);
			if id & 1 != 0 {
				// bottom-left triangle
				bx = tile_size as i32;
				by = tile_size as i32;
				cx = tile_size as i32;
			} else {
				// top-right triangle
				ax = tile_size as i32;
				ay = tile_size as i32;
				cy = tile_size as i32;
			}
			loop {
				id >>= 1;
				if id <= 1 {
					break;
				}
				let mx = (ax + bx) >> 1;
				let my = (ay + by) >> 1;
				if id & 1 != 0 {
					// left half
					bx = ax;
					by = ay;
					ax = cx;
					ay = cy;
				} else {
					// right half
					ax = bx;
					ay = by;
					bx = cx;
					by = cy;
				}
				cx = mx;
				cy = my;
			}
			coords[i * 4] = ax as u16;
			coords[i * 4 + 1] = ay as u16;
			coords[i * 4 + 2] = bx as u16;
			coords[i * 4 + 3] = by as u16;
		}

		Ok(Martini {
			grid_size,
			num_triangles,
			num_parent_triangles,
			coords,
		})
	}

	/// Compute the accumulated error map for one terrain grid.
	pub fn create_tile<'a>(&'a self, heights: &'a Heightmap) -> Result<MartiniTile<'a>> {
		MartiniTile::new(heights, self)
	}
}

/// Error map of one heightmap against the shared hierarchy.
pub struct MartiniTile<'a> {
	martini: &'a Martini,
	heights: &'a Heightmap,
	errors: Vec<f32>,
}

impl<'a> MartiniTile<'a> {
	fn new(heights: &'a Heightmap, martini: &'a Martini) -> Result<MartiniTile<'a>> {
		let size = martini.grid_size;
		ensure!(
			heights.width() == size && heights.height() == size,
			"heightmap is {}x{}, hierarchy expects {size}x{size}",
			heights.width(),
			heights.height()
		);

		let mut tile = MartiniTile {
			martini,
			heights,
			errors: vec![0.0; size * size],
		};
		tile.update();
		Ok(tile)
	}

	/// Walk all triangles smallest-first, writing each long-edge midpoint
	/// error and propagating children's errors into their parents.
	fn update(&mut self) {
		let size = self.martini.grid_size;
		let coords = &self.martini.coords;

		for i in (0..self.martini.num_triangles).rev() {
			let k = i * 4;
			let ax = coords[k] as usize;
			let ay = coords[k + 1] as usize;
			let bx = coords[k + 2] as usize;
			let by = coords[k + 3] as usize;
			let mx = (ax + bx) >> 1;
			let my = (ay + by) >> 1;
			let cx = mx + my - ay;
			let cy = my + ax - mx;

			let interpolated =
				(self.heights.get(ax, ay) + self.heights.get(bx, by)) / 2.0;
			let middle_index = my * size + mx;
			let middle_error = (interpolated - self.heights.get(mx, my)).abs();
			self.errors[middle_index] = self.errors[middle_index].max(middle_error);

			if i < self.martini.num_parent_triangles {
				let left_child = ((ay + cy) >> 1) * size + ((ax + cx) >> 1);
				let right_child = ((by + cy) >> 1) * size + ((bx + cx) >> 1);
				self.errors[middle_index] = self.errors[middle_index]
					.max(self.errors[left_child])
					.max(self.errors[right_child]);
			}
		}
	}

	/// Extract the mesh whose every triangle satisfies `max_error`.
	///
	/// Raster rows are top-origin; the returned vertices are flipped to
	/// the bottom-origin pixel space shared by the other processors.
	pub fn mesh(&self, max_error: f64) -> Mesh {
		let size = self.martini.grid_size;
		let max = size - 1;
		let mut indices = vec![0u32; size * size];
		let mut num_vertices = 0u32;
		let mut num_triangles = 0usize;

		self.count_elements(
			0, 0, max, max, max, 0, max_error, &mut indices, &mut num_vertices, &mut num_triangles,
		);
		self.count_elements(
			max, max, 0, 0, 0, max, max_error, &mut indices, &mut num_vertices, &mut num_triangles,
		);

		let mut vertices = vec![[0.0f64; 3]; num_vertices as usize];
		let mut triangles = Vec::with_capacity(num_triangles);

		self.emit_triangles(0, 0, max, max, max, 0, max_error, &indices, &mut vertices, &mut triangles);
		self.emit_triangles(max, max, 0, 0, 0, max, max_error, &indices, &mut vertices, &mut triangles);

		Mesh::new(vertices, triangles)
	}

	#[allow(clippy::too_many_arguments)]
	fn count_elements(
		&self,
		ax: usize,
		ay: usize,
		bx: usize,
		by: usize,
		cx: usize,
		cy: usize,
		max_error: f64,
		indices: &mut [u32],
		num_vertices: &mut u32,
		num_triangles: &mut usize,
	) {
		let size = self.martini.grid_size;
		let mx = (ax + bx) >> 1;
		let my = (ay + by) >> 1;

		if ax.abs_diff(cx) + ay.abs_diff(cy) > 1 && f64::from(self.errors[my * size + mx]) > max_error {
			self.count_elements(cx, cy, ax, ay, mx, my, max_error, indices, num_vertices, num_triangles);
			self.count_elements(bx, by, cx, cy, mx, my, max_error, indices, num_vertices, num_triangles);
		} else {
			for (x, y) in [(ax, ay), (bx, by), (cx, cy)] {
				if indices[y * size + x] == 0 {
					*num_vertices += 1;
					indices[y * size + x] = *num_vertices;
				}
			}
			*num_triangles += 1;
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn emit_triangles(
		&self,
		ax: usize,
		ay: usize,
		bx: usize,
		by: usize,
		cx: usize,
		cy: usize,
		max_error: f64,
		indices: &[u32],
		vertices: &mut [[f64; 3]],
		triangles: &mut Vec<[u32; 3]>,
	) {
		let size = self.martini.grid_size;
		let mx = (ax + bx) >> 1;
		let my = (ay + by) >> 1;

		if ax.abs_diff(cx) + ay.abs_diff(cy) > 1 && f64::from(self.errors[my * size + mx]) > max_error {
			self.emit_triangles(cx, cy, ax, ay, mx, my, max_error, indices, vertices, triangles);
			self.emit_triangles(bx, by, cx, cy, mx, my, max_error, indices, vertices, triangles);
		} else {
			let mut tri = [0u32; 3];
			for (slot, (x, y)) in [(ax, ay), (bx, by), (cx, cy)].into_iter().enumerate() {
				let index = indices[y * size + x] - 1;
				// flip raster rows into the shared bottom-origin y axis
				vertices[index as usize] = [
					x as f64,
					(size - 1 - y) as f64,
					f64::from(self.heights.get(x, y)),
				];
				tri[slot] = index;
			}
			// the row flip mirrors the hierarchy's native winding into CCW
			triangles.push(tri);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn constant(size: usize, value: f32) -> Heightmap {
		Heightmap::filled(size, size, value)
	}

	#[test]
	fn grid_size_must_be_power_of_two_plus_one() {
		assert!(Martini::new(257).is_ok());
		assert!(Martini::new(17).is_ok());
		assert!(Martini::new(256).is_err());
	}

	#[test]
	fn flat_terrain_collapses_to_two_triangles() {
		let martini = Martini::new(17).unwrap();
		let heights = constant(17, 5.0);
		let tile = martini.create_tile(&heights).unwrap();
		let mesh = tile.mesh(0.0);
		assert_eq!(mesh.vertex_count(), 4);
		assert_eq!(mesh.triangle_count(), 2);
		for v in &mesh.vertices {
			assert_eq!(v[2], 5.0);
		}
	}

	#[test]
	fn zero_error_reproduces_every_sample() {
		let mut heights = constant(9, 0.0);
		for row in 0..9 {
			for col in 0..9 {
				heights.set(col, row, (col * row) as f32);
			}
		}
		let martini = Martini::new(9).unwrap();
		let tile = martini.create_tile(&heights).unwrap();
		let mesh = tile.mesh(0.0);
		// every vertex carries its exact sample
		for v in &mesh.vertices {
			let col = v[0] as usize;
			let row = 8 - v[1] as usize;
			assert_eq!(v[2], f64::from(heights.get(col, row)));
		}
	}

	#[test]
	fn higher_error_budget_gives_smaller_meshes() {
		let mut heights = constant(17, 0.0);
		heights.set(7, 9, 30.0);
		heights.set(3, 4, -12.0);
		let martini = Martini::new(17).unwrap();
		let tile = martini.create_tile(&heights).unwrap();
		let fine = tile.mesh(0.1);
		let coarse = tile.mesh(50.0);
		assert!(fine.triangle_count() > coarse.triangle_count());
		assert_eq!(coarse.triangle_count(), 2);
	}

	#[test]
	fn triangles_wind_counterclockwise() {
		let mut heights = constant(9, 0.0);
		heights.set(4, 4, 10.0);
		let martini = Martini::new(9).unwrap();
		let tile = martini.create_tile(&heights).unwrap();
		let mesh = tile.mesh(0.5);
		for tri in &mesh.triangles {
			let a = mesh.vertices[tri[0] as usize];
			let b = mesh.vertices[tri[1] as usize];
			let c = mesh.vertices[tri[2] as usize];
			let area2 = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
			assert!(area2 > 0.0, "triangle {tri:?} is not CCW");
		}
	}
}
