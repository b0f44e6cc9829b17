//! Retriangulation-based stitching for the TIN processors.
//!
//! A tile's mesh is rebuilt together with its neighbors' transformed edge
//! vertices: the union is deduplicated, Delaunay-triangulated in 2D, and
//! every vertex height is resampled from the tile's own heightmap. The
//! averaging pass afterwards reconciles the vertices both sides share.

use crate::{WGS84, calculate_normals, to_ecef};
use anyhow::{Result, anyhow};
use spade::{DelaunayTriangulation, Point2, Triangulation};
use std::collections::HashSet;
use terratiles_core::{Direction, GeoBBox, Heightmap, Mesh, rescale_positions};

use super::transformed_edge_vertices;

/// Rebuild a tile's mesh with its neighbors' edge vertices merged in.
///
/// `neighbors` holds up to eight meshes in [`Direction::ALL`] order.
/// New vertices introduced on the edges get their height from `heights`,
/// the tile's own raster window, as do all existing vertices, so the
/// surface stays consistent with the source.
pub fn remesh_with_neighbors(
	heights: &Heightmap,
	mesh: &Mesh,
	neighbors: &[Option<&Mesh>; 8],
	tile_size: f64,
	bounds: GeoBBox,
	generate_normals: bool,
) -> Result<Mesh> {
	let mut merged: Vec<[f64; 2]> = Vec::with_capacity(mesh.vertex_count());
	let mut seen: HashSet<(u64, u64)> = HashSet::new();

	let push = |merged: &mut Vec<[f64; 2]>, seen: &mut HashSet<(u64, u64)>, x: f64, y: f64| {
		if seen.insert((x.to_bits(), y.to_bits())) {
			merged.push([x, y]);
		}
	};

	for v in &mesh.vertices {
		push(&mut merged, &mut seen, v[0], v[1]);
	}
	for (direction, neighbor) in Direction::ALL.iter().zip(neighbors.iter()) {
		if let Some(neighbor) = neighbor {
			for v in transformed_edge_vertices(neighbor, *direction, tile_size) {
				push(&mut merged, &mut seen, v[0], v[1]);
			}
		}
	}

	let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
	for point in &merged {
		triangulation
			.insert(Point2::new(point[0], point[1]))
			.map_err(|e| anyhow!("remesh triangulation failed at {point:?}: {e:?}"))?;
	}

	let vertices: Vec<[f64; 3]> = merged
		.iter()
		.map(|p| [p[0], p[1], f64::from(heights.sample(p[0], p[1]))])
		.collect();

	let triangles: Vec<[u32; 3]> = triangulation
		.inner_faces()
		.map(|face| {
			let handles = face.vertices();
			[
				handles[0].fix().index() as u32,
				handles[1].fix().index() as u32,
				handles[2].fix().index() as u32,
			]
		})
		.collect();

	let normals = if generate_normals {
		let rescaled = rescale_positions(&vertices, bounds, false);
		let cartesian = to_ecef(&rescaled, &WGS84);
		Some(calculate_normals(&cartesian, &triangles))
	} else {
		None
	};

	Ok(Mesh::new(vertices, triangles).with_normals(normals))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bounds() -> GeoBBox {
		GeoBBox::new(0.0, 0.0, 1.0, 1.0).unwrap()
	}

	fn corner_mesh(ts: f64, height: f64) -> Mesh {
		Mesh::new(
			vec![
				[0.0, 0.0, height],
				[ts, 0.0, height],
				[0.0, ts, height],
				[ts, ts, height],
			],
			vec![[0, 1, 2], [2, 1, 3]],
		)
	}

	#[test]
	fn no_neighbors_keeps_the_vertex_set() {
		let heights = Heightmap::filled(256, 256, 5.0);
		let mesh = corner_mesh(255.0, 5.0);
		let remeshed =
			remesh_with_neighbors(&heights, &mesh, &[None; 8], 255.0, bounds(), false).unwrap();
		assert_eq!(remeshed.vertex_count(), 4);
		assert_eq!(remeshed.triangle_count(), 2);
		assert!(remeshed.vertices.iter().all(|v| v[2] == 5.0));
	}

	#[test]
	fn neighbor_edge_vertices_are_merged_in() {
		let heights = Heightmap::filled(256, 256, 0.0);
		let mesh = corner_mesh(255.0, 0.0);
		// east neighbor has an extra vertex halfway up its west edge
		let east = Mesh::new(
			vec![
				[0.0, 0.0, 1.0],
				[0.0, 128.0, 2.0],
				[0.0, 255.0, 3.0],
				[255.0, 0.0, 4.0],
			],
			vec![[0, 3, 1], [1, 3, 2]],
		);
		let mut neighbors: [Option<&Mesh>; 8] = [None; 8];
		neighbors[2] = Some(&east); // Direction::East
		let remeshed =
			remesh_with_neighbors(&heights, &mesh, &neighbors, 255.0, bounds(), false).unwrap();
		// 4 corners + 1 new edge vertex (corners dedup against main)
		assert_eq!(remeshed.vertex_count(), 5);
		assert!(
			remeshed
				.vertices
				.iter()
				.any(|v| v[0] == 255.0 && v[1] == 128.0)
		);
	}

	#[test]
	fn heights_come_from_the_main_raster() {
		let mut heights = Heightmap::filled(256, 256, 0.0);
		// bottom-origin (255, 128) is raster row 256 - 1 - 128 = 127
		heights.set(255, 127, 42.0);
		let mesh = corner_mesh(255.0, 0.0);
		let east = Mesh::new(
			vec![[0.0, 128.0, 7.0], [0.0, 0.0, 7.0], [255.0, 64.0, 7.0]],
			vec![[0, 1, 2]],
		);
		let mut neighbors: [Option<&Mesh>; 8] = [None; 8];
		neighbors[2] = Some(&east);
		let remeshed =
			remesh_with_neighbors(&heights, &mesh, &neighbors, 255.0, bounds(), false).unwrap();
		let merged = remeshed
			.vertices
			.iter()
			.find(|v| v[0] == 255.0 && v[1] == 128.0)
			.expect("merged edge vertex");
		// resampled from the main heightmap, not the neighbor's mesh
		assert_eq!(merged[2], 42.0);
	}

	#[test]
	fn normals_are_recomputed_when_requested() {
		let heights = Heightmap::filled(256, 256, 0.0);
		let mesh = corner_mesh(255.0, 0.0);
		let remeshed =
			remesh_with_neighbors(&heights, &mesh, &[None; 8], 255.0, bounds(), true).unwrap();
		let vertex_count = remeshed.vertex_count();
		let normals = remeshed.normals.unwrap();
		assert_eq!(normals.len(), vertex_count);
	}
}
