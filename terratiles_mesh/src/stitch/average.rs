//! Averaging pass that reconciles vertices shared between tiles.

use std::collections::HashMap;
use terratiles_core::Mesh;

fn position_key(x: f64, y: f64) -> (u64, u64) {
	(x.to_bits(), y.to_bits())
}

/// Average shared-edge heights (and normals) into the main mesh, in place.
///
/// For every main vertex, all neighbor vertices at the same `(x, y)` in
/// the main frame contribute to the mean of the height and, when both
/// sides carry normals, of the normal. Both tiles of a shared edge run
/// this with the same participant set, so they converge to identical
/// values.
pub fn average_shared_vertices(
	mesh: &mut Mesh,
	neighbor_vertices: &[[f64; 3]],
	neighbor_normals: Option<&[[f64; 3]]>,
) {
	if neighbor_vertices.is_empty() {
		return;
	}

	let mut by_position: HashMap<(u64, u64), Vec<usize>> = HashMap::new();
	for (index, v) in neighbor_vertices.iter().enumerate() {
		by_position.entry(position_key(v[0], v[1])).or_default().push(index);
	}

	let Mesh {
		vertices, normals, ..
	} = mesh;
	let mut own_normals = normals.as_deref_mut();

	for (index, vertex) in vertices.iter_mut().enumerate() {
		let Some(matches) = by_position.get(&position_key(vertex[0], vertex[1])) else {
			continue;
		};

		let mut height_sum = 0.0;
		for &m in matches {
			height_sum += neighbor_vertices[m][2];
		}
		vertex[2] = (height_sum + vertex[2]) / (matches.len() + 1) as f64;

		if let (Some(own_normals), Some(their_normals)) = (own_normals.as_deref_mut(), neighbor_normals)
		{
			let normal = &mut own_normals[index];
			let mut sum = *normal;
			for &m in matches {
				sum[0] += their_normals[m][0];
				sum[1] += their_normals[m][1];
				sum[2] += their_normals[m][2];
			}
			let count = (matches.len() + 1) as f64;
			*normal = [sum[0] / count, sum[1] / count, sum[2] / count];
		}
	}
}
