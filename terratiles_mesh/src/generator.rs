//! Terrain generators: stitch a tile with its neighbors and encode it.

use crate::{
	MeshingMethod, empty_tile,
	quantized::encode_quantized_mesh,
	stitch::{
		average_shared_vertices, remesh_with_neighbors, transformed_edge_vertices,
		transformed_edge_vertices_with_normals,
	},
};
use anyhow::Result;
use terratiles_core::{Direction, Heightmap, Mesh, TileCoord, rescale_positions};

/// One completed source tile handed to the generator: the raw heightmap
/// window and the processed mesh.
#[derive(Clone, Copy)]
pub struct StitchSource<'a> {
	pub heights: &'a Heightmap,
	pub mesh: &'a Mesh,
}

/// Stitch `main` with its neighbors and encode the quantized-mesh tile.
///
/// `neighbors` holds the eight neighbor payloads in [`Direction::ALL`]
/// order; out-of-bounds or missing neighbors are `None`. A missing main
/// payload produces the empty tile at the fill height.
pub fn generate_tile(
	method: &MeshingMethod,
	coord: TileCoord,
	main: Option<StitchSource>,
	neighbors: &[Option<StitchSource>; 8],
	generate_normals: bool,
	fill_height: f64,
) -> Result<Vec<u8>> {
	let Some(main) = main else {
		return empty_tile(coord.geo_bbox(), fill_height, generate_normals);
	};

	let mesh = match method {
		MeshingMethod::Grid(_) => stitch_by_averaging(method, main, neighbors),
		MeshingMethod::Delatin(_) | MeshingMethod::Martini(_) => {
			stitch_by_remeshing(method, coord, main, neighbors, generate_normals)?
		}
	};

	let rescaled = rescale_positions(&mesh.vertices, coord.geo_bbox(), false);
	encode_quantized_mesh(&rescaled, &mesh.triangles, mesh.normals.as_deref())
}

/// Grid stitching: shared lattice positions only need their heights and
/// normals averaged.
fn stitch_by_averaging(
	method: &MeshingMethod,
	main: StitchSource,
	neighbors: &[Option<StitchSource>; 8],
) -> Mesh {
	let mut mesh = main.mesh.clone();
	let neighbor_meshes: [Option<&Mesh>; 8] =
		std::array::from_fn(|i| neighbors[i].map(|n| n.mesh));
	let (vertices, normals) = collect_edges(&neighbor_meshes, method.tile_size());
	average_shared_vertices(&mut mesh, &vertices, normals.as_deref());
	mesh
}

/// TIN stitching: every tile of the 3×3 block is remeshed with its own
/// available neighbors' edge vertices, then the (possibly new) shared
/// vertices are averaged like in the grid case.
fn stitch_by_remeshing(
	method: &MeshingMethod,
	coord: TileCoord,
	main: StitchSource,
	neighbors: &[Option<StitchSource>; 8],
	generate_normals: bool,
) -> Result<Mesh> {
	let ts = method.tile_size();

	let source_at = |pos: (i32, i32)| -> Option<StitchSource> {
		if pos == (0, 0) {
			return Some(main);
		}
		Direction::ALL
			.iter()
			.position(|d| d.offset() == pos)
			.and_then(|i| neighbors[i])
	};

	let remesh_at = |pos: (i32, i32)| -> Result<Option<Mesh>> {
		let Some(source) = source_at(pos) else {
			return Ok(None);
		};
		let sub_refs: [Option<&Mesh>; 8] = std::array::from_fn(|i| {
			let offset = Direction::ALL[i].offset();
			source_at((pos.0 + offset.0, pos.1 + offset.1)).map(|s| s.mesh)
		});

		let bounds = if pos == (0, 0) {
			coord.geo_bbox()
		} else {
			let direction = *Direction::ALL
				.iter()
				.find(|d| d.offset() == pos)
				.expect("positions come from direction offsets");
			match coord.neighbor(direction) {
				Some(neighbor_coord) => neighbor_coord.geo_bbox(),
				None => return Ok(None),
			}
		};

		remesh_with_neighbors(source.heights, source.mesh, &sub_refs, ts, bounds, generate_normals)
			.map(Some)
	};

	let mut main_mesh = remesh_at((0, 0))?.expect("main source is present");

	let mut remeshed_neighbors: [Option<Mesh>; 8] = std::array::from_fn(|_| None);
	for (slot, direction) in remeshed_neighbors.iter_mut().zip(Direction::ALL.iter()) {
		*slot = remesh_at(direction.offset())?;
	}

	let neighbor_refs: [Option<&Mesh>; 8] = std::array::from_fn(|i| remeshed_neighbors[i].as_ref());
	let (vertices, normals) = collect_edges(&neighbor_refs, ts);
	average_shared_vertices(&mut main_mesh, &vertices, normals.as_deref());

	Ok(main_mesh)
}

/// Concatenate all neighbors' transformed shared-edge vertices; normals
/// are returned only when every contributing mesh carries them, so the
/// two lists always stay index-aligned.
fn collect_edges(
	neighbors: &[Option<&Mesh>; 8],
	tile_size: f64,
) -> (Vec<[f64; 3]>, Option<Vec<[f64; 3]>>) {
	let all_have_normals = neighbors
		.iter()
		.flatten()
		.all(|mesh| mesh.normals.is_some());
	let any_present = neighbors.iter().any(|n| n.is_some());

	let mut vertices = Vec::new();
	let mut normals = Vec::new();
	for (direction, neighbor) in Direction::ALL.iter().zip(neighbors.iter()) {
		let Some(mesh) = neighbor else { continue };
		if all_have_normals {
			let (v, n) = transformed_edge_vertices_with_normals(mesh, *direction, tile_size);
			vertices.extend(v);
			normals.extend(n);
		} else {
			vertices.extend(transformed_edge_vertices(mesh, *direction, tile_size));
		}
	}

	let normals = (any_present && all_have_normals).then_some(normals);
	(vertices, normals)
}
