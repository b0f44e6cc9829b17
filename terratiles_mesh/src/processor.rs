//! Mesh processors: one tagged variant per meshing strategy.

use crate::{Martini, WGS84, calculate_normals, delatin_mesh, generate_grid, to_ecef};
use anyhow::{Result, bail, ensure};
use std::collections::HashMap;
use terratiles_core::{GeoBBox, Heightmap, Mesh, TILE_SIZE, rescale_positions};

/// Largest grid size accepted for the grid processor.
pub const MAX_GRID_SIZE: u32 = 255;

/// Parameters of the grid processor.
#[derive(Clone, Debug, PartialEq)]
pub struct GridParams {
	pub default_grid_size: u32,
	pub zoom_grid_sizes: HashMap<u8, u32>,
}

impl Default for GridParams {
	fn default() -> Self {
		GridParams {
			default_grid_size: 20,
			zoom_grid_sizes: HashMap::new(),
		}
	}
}

impl GridParams {
	pub fn grid_size(&self, zoom: u8) -> u32 {
		self
			.zoom_grid_sizes
			.get(&zoom)
			.copied()
			.unwrap_or(self.default_grid_size)
			.min(MAX_GRID_SIZE)
	}
}

/// Parameters of the TIN processors (delatin and martini).
#[derive(Clone, Debug, PartialEq)]
pub struct TinParams {
	pub default_max_error: f64,
	pub zoom_max_errors: HashMap<u8, f64>,
}

impl Default for TinParams {
	fn default() -> Self {
		TinParams {
			default_max_error: 4.0,
			zoom_max_errors: HashMap::new(),
		}
	}
}

impl TinParams {
	pub fn max_error(&self, zoom: u8) -> f64 {
		self
			.zoom_max_errors
			.get(&zoom)
			.copied()
			.unwrap_or(self.default_max_error)
	}
}

/// The meshing strategy of a request, with its parameters.
///
/// Replaces the processor/generator class hierarchy of older terrain
/// servers with one tagged variant: each case knows how to turn a
/// heightmap into a mesh and (see `stitch`) how to merge it with its
/// neighbors.
#[derive(Clone, Debug, PartialEq)]
pub enum MeshingMethod {
	Grid(GridParams),
	Delatin(TinParams),
	Martini(TinParams),
}

impl MeshingMethod {
	/// The cache-key fragment naming this method.
	pub fn name(&self) -> &'static str {
		match self {
			MeshingMethod::Grid(_) => "grid",
			MeshingMethod::Delatin(_) => "delatin",
			MeshingMethod::Martini(_) => "martini",
		}
	}

	/// Extra read window in pixels the reader must add on each side.
	///
	/// Martini needs a `2^n + 1` grid, one pixel more than the tile
	/// window, obtained by half a pixel on each side.
	pub fn buffer(&self) -> f64 {
		match self {
			MeshingMethod::Martini(_) => 0.5,
			_ => 0.0,
		}
	}

	/// Pixel-space edge length of meshes this method produces.
	pub fn tile_size(&self) -> f64 {
		match self {
			MeshingMethod::Martini(_) => TILE_SIZE as f64,
			_ => (TILE_SIZE - 1) as f64,
		}
	}

	/// Mesh a heightmap window.
	///
	/// `generate_normals` computes ECEF vertex normals, which requires the
	/// tile's geographic bounds.
	pub fn process(
		&self,
		heights: &Heightmap,
		zoom: u8,
		bounds: GeoBBox,
		generate_normals: bool,
	) -> Result<Mesh> {
		let mut mesh = match self {
			MeshingMethod::Grid(params) => {
				ensure!(
					heights.width() == TILE_SIZE && heights.height() == TILE_SIZE,
					"grid meshing expects a {TILE_SIZE}x{TILE_SIZE} window, got {}x{}",
					heights.width(),
					heights.height()
				);
				let size = params.grid_size(zoom);
				let template = generate_grid(MAX_GRID_SIZE, MAX_GRID_SIZE, size, size);
				let vertices = template
					.vertices
					.iter()
					.map(|v| [v[0], v[1], f64::from(heights.sample(v[0], v[1]))])
					.collect();
				Mesh::new(vertices, template.triangles)
			}
			MeshingMethod::Delatin(params) => delatin_mesh(heights, params.max_error(zoom))?,
			MeshingMethod::Martini(params) => {
				let martini = Martini::new(heights.width())?;
				let tile = martini.create_tile(heights)?;
				tile.mesh(params.max_error(zoom))
			}
		};

		if generate_normals {
			let rescaled = rescale_positions(&mesh.vertices, bounds, false);
			let cartesian = to_ecef(&rescaled, &WGS84);
			mesh.normals = Some(calculate_normals(&cartesian, &mesh.triangles));
		}

		Ok(mesh)
	}
}

impl std::str::FromStr for MeshingMethod {
	type Err = anyhow::Error;

	/// Parse a method name into its variant with default parameters.
	fn from_str(value: &str) -> Result<Self> {
		Ok(match value.to_lowercase().as_str() {
			"grid" => MeshingMethod::Grid(GridParams::default()),
			"delatin" => MeshingMethod::Delatin(TinParams::default()),
			"martini" => MeshingMethod::Martini(TinParams::default()),
			_ => bail!("unknown meshing method: \"{value}\""),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bounds() -> GeoBBox {
		GeoBBox::new(4.0, 50.0, 4.175, 50.175).unwrap()
	}

	#[test]
	fn grid_processor_counts() {
		let heights = Heightmap::filled(256, 256, 12.0);
		let method = MeshingMethod::Grid(GridParams::default());
		let mesh = method.process(&heights, 10, bounds(), false).unwrap();
		assert_eq!(mesh.vertex_count(), 21 * 21);
		assert_eq!(mesh.triangle_count(), 20 * 20 * 2);
		assert!(mesh.normals.is_none());
		assert!(mesh.vertices.iter().all(|v| v[2] == 12.0));
	}

	#[test]
	fn grid_size_per_zoom_overrides_default() {
		let params = GridParams {
			default_grid_size: 20,
			zoom_grid_sizes: HashMap::from([(17, 30u32)]),
		};
		assert_eq!(params.grid_size(17), 30);
		assert_eq!(params.grid_size(12), 20);
		// capped
		let params = GridParams {
			default_grid_size: 400,
			zoom_grid_sizes: HashMap::new(),
		};
		assert_eq!(params.grid_size(5), 255);
	}

	#[test]
	fn max_error_per_zoom_overrides_default() {
		let params = TinParams {
			default_max_error: 4.0,
			zoom_max_errors: HashMap::from([(18, 2.0)]),
		};
		assert_eq!(params.max_error(18), 2.0);
		assert_eq!(params.max_error(10), 4.0);
	}

	#[test]
	fn normals_are_generated_on_request() {
		let heights = Heightmap::filled(256, 256, 0.0);
		let method = MeshingMethod::Grid(GridParams::default());
		let mesh = method.process(&heights, 10, bounds(), true).unwrap();
		let normals = mesh.normals.unwrap();
		assert_eq!(normals.len(), mesh.vertices.len());
		for normal in &normals {
			let length = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
			assert!((length - 1.0).abs() < 1e-9);
		}
	}

	#[test]
	fn martini_requires_a_buffered_window() {
		let heights = Heightmap::filled(256, 256, 0.0);
		let method = MeshingMethod::Martini(TinParams::default());
		assert!(method.process(&heights, 10, bounds(), false).is_err());

		let heights = Heightmap::filled(257, 257, 0.0);
		assert!(method.process(&heights, 10, bounds(), false).is_ok());
		assert_eq!(method.buffer(), 0.5);
	}

	#[test]
	fn names_round_trip() {
		for name in ["grid", "delatin", "martini"] {
			let method: MeshingMethod = name.parse().unwrap();
			assert_eq!(method.name(), name);
		}
		assert!("voronoi".parse::<MeshingMethod>().is_err());
	}
}
