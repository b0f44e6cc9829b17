//! Selecting a neighbor's facing-edge vertices and moving them into the
//! main tile's pixel frame.

use terratiles_core::{Direction, Mesh};

/// Offset that moves a neighbor's local pixel coordinates into the main
/// tile's frame, given the neighbor's direction seen from the main tile.
pub fn neighbor_offset(direction: Direction, tile_size: f64) -> (f64, f64) {
	let ts = tile_size;
	match direction {
		Direction::North => (0.0, ts),
		Direction::NorthEast => (ts, ts),
		Direction::East => (ts, 0.0),
		Direction::SouthEast => (ts, -ts),
		Direction::South => (0.0, -ts),
		Direction::SouthWest => (-ts, -ts),
		Direction::West => (-ts, 0.0),
		Direction::NorthWest => (-ts, ts),
	}
}

/// True when a transformed vertex lies on the edge (or corner) shared
/// with the main tile.
pub fn on_shared_edge(direction: Direction, tile_size: f64, x: f64, y: f64) -> bool {
	let ts = tile_size;
	match direction {
		Direction::North => y == ts,
		Direction::NorthEast => x == ts && y == ts,
		Direction::East => x == ts,
		Direction::SouthEast => x == ts && y == 0.0,
		Direction::South => y == 0.0,
		Direction::SouthWest => x == 0.0 && y == 0.0,
		Direction::West => x == 0.0,
		Direction::NorthWest => x == 0.0 && y == ts,
	}
}

/// The neighbor's shared-edge vertices transformed into the main frame.
pub fn transformed_edge_vertices(mesh: &Mesh, direction: Direction, tile_size: f64) -> Vec<[f64; 3]> {
	let (dx, dy) = neighbor_offset(direction, tile_size);
	mesh
		.vertices
		.iter()
		.filter_map(|v| {
			let x = v[0] + dx;
			let y = v[1] + dy;
			on_shared_edge(direction, tile_size, x, y).then_some([x, y, v[2]])
		})
		.collect()
}

/// Shared-edge vertices with their normals, aligned index-to-index.
///
/// Returns empty lists when the mesh carries no normals.
pub fn transformed_edge_vertices_with_normals(
	mesh: &Mesh,
	direction: Direction,
	tile_size: f64,
) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
	let Some(normals) = &mesh.normals else {
		return (transformed_edge_vertices(mesh, direction, tile_size), Vec::new());
	};
	let (dx, dy) = neighbor_offset(direction, tile_size);
	let mut vertices = Vec::new();
	let mut edge_normals = Vec::new();
	for (v, n) in mesh.vertices.iter().zip(normals.iter()) {
		let x = v[0] + dx;
		let y = v[1] + dy;
		if on_shared_edge(direction, tile_size, x, y) {
			vertices.push([x, y, v[2]]);
			edge_normals.push(*n);
		}
	}
	(vertices, edge_normals)
}
