//! A triangle mesh in tile-local pixel space.

use serde::{Deserialize, Serialize};

/// Triangulated surface produced by a mesh processor.
///
/// Vertices live in the tile's local pixel space: `x, y ∈ [0, tile_size]`
/// with y growing northwards, `z` is the height sample in meters.
/// Triangle indices wind counterclockwise. Normals, when present, are
/// unit vectors in ECEF space, one per vertex.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Mesh {
	pub vertices: Vec<[f64; 3]>,
	pub triangles: Vec<[u32; 3]>,
	pub normals: Option<Vec<[f64; 3]>>,
}

impl Mesh {
	pub fn new(vertices: Vec<[f64; 3]>, triangles: Vec<[u32; 3]>) -> Mesh {
		Mesh {
			vertices,
			triangles,
			normals: None,
		}
	}

	pub fn with_normals(mut self, normals: Option<Vec<[f64; 3]>>) -> Mesh {
		self.normals = normals;
		self
	}

	pub fn vertex_count(&self) -> usize {
		self.vertices.len()
	}

	pub fn triangle_count(&self) -> usize {
		self.triangles.len()
	}
}
