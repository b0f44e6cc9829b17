//! Quantized-Mesh 1.0 writer.

use super::{EXTENSION_VERTEX_NORMALS, QUANTIZED_MAX, oct_encode};
use crate::{WGS84, to_ecef};
use anyhow::{Result, ensure};
use byteorder::{LittleEndian, WriteBytesExt};
use terratiles_core::GeoBBox;

/// Vertex counts above this force 32-bit triangle indices.
const MAX_SHORT_VERTICES: usize = 65536;

/// Encode a terrain tile as Quantized-Mesh 1.0 bytes.
///
/// `positions` are geographic `[lon, lat, height]` vertices; `normals`,
/// when given, become the OctVertexNormals extension. Vertices are
/// re-ordered by first use in the triangle list, which the
/// high-water-mark index encoding requires.
pub fn encode_quantized_mesh(
	positions: &[[f64; 3]],
	triangles: &[[u32; 3]],
	normals: Option<&[[f64; 3]]>,
) -> Result<Vec<u8>> {
	ensure!(!positions.is_empty(), "cannot encode an empty tile mesh");
	if let Some(normals) = normals {
		ensure!(
			normals.len() == positions.len(),
			"normals ({}) must match vertices ({})",
			normals.len(),
			positions.len()
		);
	}
	for tri in triangles {
		for &index in tri {
			ensure!(
				(index as usize) < positions.len(),
				"triangle index {index} out of range ({} vertices)",
				positions.len()
			);
		}
	}

	let (positions, triangles, normals) = reorder_by_first_use(positions, triangles, normals);

	let bounds = position_bounds(&positions);
	let (min_height, max_height) = height_bounds(&positions);

	let ecef = to_ecef(&positions, &WGS84);
	let (ecef_min, ecef_max) = ecef_bounds(&ecef);
	let center = [
		(ecef_min[0] + ecef_max[0]) / 2.0,
		(ecef_min[1] + ecef_max[1]) / 2.0,
		(ecef_min[2] + ecef_max[2]) / 2.0,
	];
	let radius = distance(ecef_max, center);
	let occlusion = horizon_occlusion_point(&ecef, center);

	let mut out: Vec<u8> = Vec::new();

	// header
	for value in center {
		out.write_f64::<LittleEndian>(value)?;
	}
	out.write_f32::<LittleEndian>(min_height as f32)?;
	out.write_f32::<LittleEndian>(max_height as f32)?;
	for value in center {
		out.write_f64::<LittleEndian>(value)?;
	}
	out.write_f64::<LittleEndian>(radius)?;
	for value in occlusion {
		out.write_f64::<LittleEndian>(value)?;
	}

	// vertex data: zig-zag deltas of quantized u, v, h
	let quantize = |value: f64, low: f64, high: f64| -> u16 {
		let range = high - low;
		if range <= 0.0 {
			return 0;
		}
		((value - low) / range * QUANTIZED_MAX).round() as u16
	};
	let us: Vec<u16> = positions
		.iter()
		.map(|p| quantize(p[0], bounds.x_min, bounds.x_max))
		.collect();
	let vs: Vec<u16> = positions
		.iter()
		.map(|p| quantize(p[1], bounds.y_min, bounds.y_max))
		.collect();
	let hs: Vec<u16> = positions
		.iter()
		.map(|p| quantize(p[2], min_height, max_height))
		.collect();

	out.write_u32::<LittleEndian>(positions.len() as u32)?;
	for series in [&us, &vs, &hs] {
		let mut previous = 0i32;
		for &value in series.iter() {
			let delta = i32::from(value) - previous;
			out.write_u16::<LittleEndian>(zigzag_encode(delta))?;
			previous = i32::from(value);
		}
	}

	// index data, high-water-mark encoded
	let long_indices = positions.len() > MAX_SHORT_VERTICES;
	if long_indices {
		while out.len() % 4 != 0 {
			out.push(0);
		}
	}
	out.write_u32::<LittleEndian>((triangles.len() * 3) as u32)?;
	let mut highest = 0u32;
	for tri in &triangles {
		for &index in tri {
			let code = highest - index;
			if long_indices {
				out.write_u32::<LittleEndian>(code)?;
			} else {
				out.write_u16::<LittleEndian>(code as u16)?;
			}
			if code == 0 {
				highest += 1;
			}
		}
	}

	// edge vertex lists
	let edge = |pick: &dyn Fn(u16, u16) -> bool| -> Vec<u32> {
		us.iter()
			.zip(vs.iter())
			.enumerate()
			.filter(|&(_, (&u, &v))| pick(u, v))
			.map(|(i, _)| i as u32)
			.collect()
	};
	let max = QUANTIZED_MAX as u16;
	let edges = [
		edge(&|u, _| u == 0),   // west
		edge(&|_, v| v == 0),   // south
		edge(&|u, _| u == max), // east
		edge(&|_, v| v == max), // north
	];
	for list in &edges {
		out.write_u32::<LittleEndian>(list.len() as u32)?;
		for &index in list {
			if long_indices {
				out.write_u32::<LittleEndian>(index)?;
			} else {
				out.write_u16::<LittleEndian>(index as u16)?;
			}
		}
	}

	// extensions
	if let Some(normals) = &normals {
		let mut payload = Vec::with_capacity(normals.len() * 2);
		for normal in normals.iter() {
			payload.extend_from_slice(&oct_encode(*normal));
		}
		out.write_u8(EXTENSION_VERTEX_NORMALS)?;
		out.write_u32::<LittleEndian>(payload.len() as u32)?;
		out.extend_from_slice(&payload);
	}

	Ok(out)
}

/// Re-order vertices so their first appearance in the index buffer is
/// strictly increasing; unreferenced vertices keep their relative order
/// at the end.
fn reorder_by_first_use(
	positions: &[[f64; 3]],
	triangles: &[[u32; 3]],
	normals: Option<&[[f64; 3]]>,
) -> (Vec<[f64; 3]>, Vec<[u32; 3]>, Option<Vec<[f64; 3]>>) {
	let mut remap = vec![u32::MAX; positions.len()];
	let mut order: Vec<usize> = Vec::with_capacity(positions.len());

	for tri in triangles {
		for &index in tri {
			if remap[index as usize] == u32::MAX {
				remap[index as usize] = order.len() as u32;
				order.push(index as usize);
			}
		}
	}
	for index in 0..positions.len() {
		if remap[index] == u32::MAX {
			remap[index] = order.len() as u32;
			order.push(index);
		}
	}

	let new_positions = order.iter().map(|&i| positions[i]).collect();
	let new_normals = normals.map(|normals| order.iter().map(|&i| normals[i]).collect());
	let new_triangles = triangles
		.iter()
		.map(|tri| [remap[tri[0] as usize], remap[tri[1] as usize], remap[tri[2] as usize]])
		.collect();

	(new_positions, new_triangles, new_normals)
}

fn zigzag_encode(value: i32) -> u16 {
	((value << 1) ^ (value >> 31)) as u16
}

fn position_bounds(positions: &[[f64; 3]]) -> GeoBBox {
	let mut bounds = GeoBBox {
		x_min: f64::INFINITY,
		y_min: f64::INFINITY,
		x_max: f64::NEG_INFINITY,
		y_max: f64::NEG_INFINITY,
	};
	for p in positions {
		bounds.x_min = bounds.x_min.min(p[0]);
		bounds.y_min = bounds.y_min.min(p[1]);
		bounds.x_max = bounds.x_max.max(p[0]);
		bounds.y_max = bounds.y_max.max(p[1]);
	}
	bounds
}

fn height_bounds(positions: &[[f64; 3]]) -> (f64, f64) {
	let mut min = f64::INFINITY;
	let mut max = f64::NEG_INFINITY;
	for p in positions {
		min = min.min(p[2]);
		max = max.max(p[2]);
	}
	(min, max)
}

fn ecef_bounds(ecef: &[[f64; 3]]) -> ([f64; 3], [f64; 3]) {
	let mut min = [f64::INFINITY; 3];
	let mut max = [f64::NEG_INFINITY; 3];
	for p in ecef {
		for axis in 0..3 {
			min[axis] = min[axis].min(p[axis]);
			max[axis] = max[axis].max(p[axis]);
		}
	}
	(min, max)
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
	let dx = a[0] - b[0];
	let dy = a[1] - b[1];
	let dz = a[2] - b[2];
	(dx * dx + dy * dy + dz * dz).sqrt()
}

/// Horizon occlusion point in the ellipsoid-scaled frame.
///
/// Each position contributes `1 / (cos α · cos β − sin α · sin β)` where
/// α is the angle between the position's direction and the direction to
/// the bounding center and β derives from the scaled magnitude; zero
/// denominators are clamped to machine epsilon.
fn horizon_occlusion_point(ecef: &[[f64; 3]], bounding_center: [f64; 3]) -> [f64; 3] {
	let radii = WGS84.radii();
	let scale = |p: [f64; 3]| [p[0] / radii[0], p[1] / radii[1], p[2] / radii[2]];

	let scaled_center = scale(bounding_center);
	let center_length = (scaled_center[0] * scaled_center[0]
		+ scaled_center[1] * scaled_center[1]
		+ scaled_center[2] * scaled_center[2])
		.sqrt();
	if center_length == 0.0 {
		return [0.0, 0.0, 0.0];
	}
	let direction = [
		scaled_center[0] / center_length,
		scaled_center[1] / center_length,
		scaled_center[2] / center_length,
	];

	let mut max_magnitude = 0.0f64;
	for p in ecef {
		let scaled = scale(*p);
		let magnitude_squared =
			(scaled[0] * scaled[0] + scaled[1] * scaled[1] + scaled[2] * scaled[2]).max(1.0);
		let magnitude = magnitude_squared.sqrt();
		let point_direction = [
			scaled[0] / magnitude,
			scaled[1] / magnitude,
			scaled[2] / magnitude,
		];

		let cos_alpha = point_direction[0] * direction[0]
			+ point_direction[1] * direction[1]
			+ point_direction[2] * direction[2];
		let cross = [
			point_direction[1] * direction[2] - point_direction[2] * direction[1],
			point_direction[2] * direction[0] - point_direction[0] * direction[2],
			point_direction[0] * direction[1] - point_direction[1] * direction[0],
		];
		let sin_alpha = (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt();
		let cos_beta = 1.0 / magnitude;
		let sin_beta = (magnitude_squared - 1.0).sqrt() * cos_beta;

		let mut denominator = cos_alpha * cos_beta - sin_alpha * sin_beta;
		if denominator == 0.0 {
			denominator = f64::EPSILON;
		}
		max_magnitude = max_magnitude.max(1.0 / denominator);
	}

	[
		direction[0] * max_magnitude,
		direction[1] * max_magnitude,
		direction[2] * max_magnitude,
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zigzag_is_the_standard_mapping() {
		assert_eq!(zigzag_encode(0), 0);
		assert_eq!(zigzag_encode(-1), 1);
		assert_eq!(zigzag_encode(1), 2);
		assert_eq!(zigzag_encode(-2), 3);
		assert_eq!(zigzag_encode(16383), 32766);
	}

	#[test]
	fn reorder_follows_first_use() {
		let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0]];
		let triangles = vec![[2u32, 0, 3]];
		let (new_positions, new_triangles, _) = reorder_by_first_use(&positions, &triangles, None);
		assert_eq!(new_triangles, vec![[0u32, 1, 2]]);
		assert_eq!(new_positions[0], [2.0, 0.0, 0.0]);
		assert_eq!(new_positions[1], [0.0, 0.0, 0.0]);
		assert_eq!(new_positions[2], [3.0, 0.0, 0.0]);
		// unreferenced vertex 1 lands at the end
		assert_eq!(new_positions[3], [1.0, 0.0, 0.0]);
	}

	#[test]
	fn empty_mesh_is_rejected() {
		assert!(encode_quantized_mesh(&[], &[], None).is_err());
	}

	#[test]
	fn out_of_range_index_is_rejected() {
		let positions = vec![[0.0, 0.0, 0.0]];
		assert!(encode_quantized_mesh(&positions, &[[0, 0, 7]], None).is_err());
	}

	#[test]
	fn occlusion_point_is_outside_the_ellipsoid() {
		let positions = vec![
			[5.0, 51.0, 0.0],
			[5.1, 51.0, 120.0],
			[5.0, 51.1, 80.0],
		];
		let ecef = to_ecef(&positions, &WGS84);
		let (min, max) = ecef_bounds(&ecef);
		let center = [
			(min[0] + max[0]) / 2.0,
			(min[1] + max[1]) / 2.0,
			(min[2] + max[2]) / 2.0,
		];
		let point = horizon_occlusion_point(&ecef, center);
		let length = (point[0] * point[0] + point[1] * point[1] + point[2] * point[2]).sqrt();
		// in the scaled frame the ellipsoid surface is the unit sphere
		assert!(length > 1.0);
	}
}
