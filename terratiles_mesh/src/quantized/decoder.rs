//! Quantized-Mesh 1.0 reader, the inverse of the encoder.

use super::{EXTENSION_VERTEX_NORMALS, QUANTIZED_MAX, oct_decode};
use anyhow::{Result, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use terratiles_core::GeoBBox;

/// Vertex counts above this force 32-bit triangle indices.
const MAX_SHORT_VERTICES: usize = 65536;

/// A decoded terrain tile.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizedMeshTile {
	pub center: [f64; 3],
	pub min_height: f32,
	pub max_height: f32,
	pub sphere_center: [f64; 3],
	pub sphere_radius: f64,
	pub horizon_occlusion: [f64; 3],
	/// Quantized vertex attributes in `[0, 32767]`.
	pub u: Vec<u16>,
	pub v: Vec<u16>,
	pub h: Vec<u16>,
	pub triangles: Vec<[u32; 3]>,
	pub west: Vec<u32>,
	pub south: Vec<u32>,
	pub east: Vec<u32>,
	pub north: Vec<u32>,
	/// Raw oct-encoded normal bytes, when the extension is present.
	pub normal_bytes: Option<Vec<u8>>,
}

impl QuantizedMeshTile {
	pub fn vertex_count(&self) -> usize {
		self.u.len()
	}

	/// Heights in meters, un-quantized against the header range.
	pub fn heights(&self) -> Vec<f64> {
		let low = f64::from(self.min_height);
		let range = f64::from(self.max_height) - low;
		self
			.h
			.iter()
			.map(|&h| low + f64::from(h) / QUANTIZED_MAX * range)
			.collect()
	}

	/// Geographic positions, un-quantized against the given tile bounds.
	pub fn positions(&self, bounds: GeoBBox) -> Vec<[f64; 3]> {
		let heights = self.heights();
		self
			.u
			.iter()
			.zip(self.v.iter())
			.zip(heights)
			.map(|((&u, &v), height)| {
				[
					bounds.x_min + f64::from(u) / QUANTIZED_MAX * bounds.width(),
					bounds.y_min + f64::from(v) / QUANTIZED_MAX * bounds.height(),
					height,
				]
			})
			.collect()
	}

	/// Decoded unit normals, when the extension is present.
	pub fn normals(&self) -> Option<Vec<[f64; 3]>> {
		self.normal_bytes.as_ref().map(|bytes| {
			bytes
				.chunks_exact(2)
				.map(|pair| oct_decode([pair[0], pair[1]]))
				.collect()
		})
	}
}

/// Decode a Quantized-Mesh 1.0 tile.
pub fn decode_quantized_mesh(bytes: &[u8]) -> Result<QuantizedMeshTile> {
	let mut cursor = Cursor::new(bytes);

	let read_vec3 = |cursor: &mut Cursor<&[u8]>| -> Result<[f64; 3]> {
		Ok([
			cursor.read_f64::<LittleEndian>()?,
			cursor.read_f64::<LittleEndian>()?,
			cursor.read_f64::<LittleEndian>()?,
		])
	};

	let center = read_vec3(&mut cursor)?;
	let min_height = cursor.read_f32::<LittleEndian>()?;
	let max_height = cursor.read_f32::<LittleEndian>()?;
	let sphere_center = read_vec3(&mut cursor)?;
	let sphere_radius = cursor.read_f64::<LittleEndian>()?;
	let horizon_occlusion = read_vec3(&mut cursor)?;

	let vertex_count = cursor.read_u32::<LittleEndian>()? as usize;
	ensure!(vertex_count > 0, "tile has no vertices");

	let read_series = |cursor: &mut Cursor<&[u8]>| -> Result<Vec<u16>> {
		let mut series = Vec::with_capacity(vertex_count);
		let mut value = 0i32;
		for _ in 0..vertex_count {
			value += zigzag_decode(cursor.read_u16::<LittleEndian>()?);
			ensure!(
				(0..=QUANTIZED_MAX as i32).contains(&value),
				"quantized value {value} out of range"
			);
			series.push(value as u16);
		}
		Ok(series)
	};
	let u = read_series(&mut cursor)?;
	let v = read_series(&mut cursor)?;
	let h = read_series(&mut cursor)?;

	let long_indices = vertex_count > MAX_SHORT_VERTICES;
	if long_indices {
		while cursor.position() % 4 != 0 {
			cursor.read_u8()?;
		}
	}

	let index_count = cursor.read_u32::<LittleEndian>()? as usize;
	ensure!(index_count % 3 == 0, "index count {index_count} is not a triangle list");
	let read_index = |cursor: &mut Cursor<&[u8]>| -> Result<u32> {
		Ok(if long_indices {
			cursor.read_u32::<LittleEndian>()?
		} else {
			u32::from(cursor.read_u16::<LittleEndian>()?)
		})
	};

	// high-water-mark decoding
	let mut highest = 0u32;
	let mut indices = Vec::with_capacity(index_count);
	for _ in 0..index_count {
		let code = read_index(&mut cursor)?;
		ensure!(code <= highest, "high-water-mark code {code} exceeds {highest}");
		indices.push(highest - code);
		if code == 0 {
			highest += 1;
		}
	}
	let triangles = indices
		.chunks_exact(3)
		.map(|tri| [tri[0], tri[1], tri[2]])
		.collect();

	let read_edge = |cursor: &mut Cursor<&[u8]>| -> Result<Vec<u32>> {
		let count = cursor.read_u32::<LittleEndian>()? as usize;
		let mut list = Vec::with_capacity(count);
		for _ in 0..count {
			let index = if long_indices {
				cursor.read_u32::<LittleEndian>()?
			} else {
				u32::from(cursor.read_u16::<LittleEndian>()?)
			};
			ensure!((index as usize) < vertex_count, "edge index {index} out of range");
			list.push(index);
		}
		Ok(list)
	};
	let west = read_edge(&mut cursor)?;
	let south = read_edge(&mut cursor)?;
	let east = read_edge(&mut cursor)?;
	let north = read_edge(&mut cursor)?;

	let mut normal_bytes = None;
	while (cursor.position() as usize) < bytes.len() {
		let extension_id = cursor.read_u8()?;
		let length = cursor.read_u32::<LittleEndian>()? as usize;
		let start = cursor.position() as usize;
		ensure!(start + length <= bytes.len(), "extension {extension_id} runs past the tile");
		match extension_id {
			EXTENSION_VERTEX_NORMALS => {
				ensure!(
					length == vertex_count * 2,
					"vertex normals extension has {length} bytes for {vertex_count} vertices"
				);
				normal_bytes = Some(bytes[start..start + length].to_vec());
			}
			_ => bail!("unknown extension id {extension_id}"),
		}
		cursor.set_position((start + length) as u64);
	}

	Ok(QuantizedMeshTile {
		center,
		min_height,
		max_height,
		sphere_center,
		sphere_radius,
		horizon_occlusion,
		u,
		v,
		h,
		triangles,
		west,
		south,
		east,
		north,
		normal_bytes,
	})
}

fn zigzag_decode(value: u16) -> i32 {
	(i32::from(value) >> 1) ^ -(i32::from(value) & 1)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::quantized::encode_quantized_mesh;
	use approx::assert_relative_eq;

	fn sample_positions() -> (Vec<[f64; 3]>, Vec<[u32; 3]>) {
		let bounds = GeoBBox::new(4.0, 50.0, 6.0, 52.0).unwrap();
		let mut positions = Vec::new();
		for row in 0..=4u32 {
			for col in 0..=4u32 {
				positions.push([
					bounds.x_min + f64::from(col) / 4.0 * bounds.width(),
					bounds.y_min + f64::from(row) / 4.0 * bounds.height(),
					f64::from(col * 10 + row),
				]);
			}
		}
		let mut triangles = Vec::new();
		for row in 0..4u32 {
			for col in 0..4u32 {
				let tl = row * 5 + col;
				let bl = (row + 1) * 5 + col;
				triangles.push([tl, tl + 1, bl]);
				triangles.push([bl, tl + 1, bl + 1]);
			}
		}
		(positions, triangles)
	}

	#[test]
	fn round_trip_geometry() {
		let (positions, triangles) = sample_positions();
		let bytes = encode_quantized_mesh(&positions, &triangles, None).unwrap();
		let tile = decode_quantized_mesh(&bytes).unwrap();

		assert_eq!(tile.vertex_count(), 25);
		assert_eq!(tile.triangles.len(), 32);
		assert_eq!(tile.min_height, 0.0);
		assert_eq!(tile.max_height, 44.0);
		assert!(tile.normal_bytes.is_none());

		// heights survive within one quantization step
		let bounds = GeoBBox::new(4.0, 50.0, 6.0, 52.0).unwrap();
		let decoded = tile.positions(bounds);
		let step = 44.0 / QUANTIZED_MAX;
		// vertices were re-ordered; compare as sets on (lon, lat)
		for original in &positions {
			let matched = decoded.iter().find(|p| {
				(p[0] - original[0]).abs() < 1e-4 && (p[1] - original[1]).abs() < 1e-4
			});
			let matched = matched.expect("vertex lost in round trip");
			assert_relative_eq!(matched[2], original[2], epsilon = step);
		}
	}

	#[test]
	fn round_trip_preserves_triangle_shape() {
		let (positions, triangles) = sample_positions();
		let bytes = encode_quantized_mesh(&positions, &triangles, None).unwrap();
		let tile = decode_quantized_mesh(&bytes).unwrap();
		// the index buffer decodes into valid triangles
		for tri in &tile.triangles {
			for &index in tri {
				assert!((index as usize) < tile.vertex_count());
			}
		}
	}

	#[test]
	fn edge_lists_cover_the_rim() {
		let (positions, triangles) = sample_positions();
		let bytes = encode_quantized_mesh(&positions, &triangles, None).unwrap();
		let tile = decode_quantized_mesh(&bytes).unwrap();
		assert_eq!(tile.west.len(), 5);
		assert_eq!(tile.south.len(), 5);
		assert_eq!(tile.east.len(), 5);
		assert_eq!(tile.north.len(), 5);
		for &index in &tile.west {
			assert_eq!(tile.u[index as usize], 0);
		}
		for &index in &tile.east {
			assert_eq!(tile.u[index as usize], QUANTIZED_MAX as u16);
		}
	}

	#[test]
	fn normals_extension_round_trips() {
		let (positions, triangles) = sample_positions();
		let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
		let bytes = encode_quantized_mesh(&positions, &triangles, Some(&normals)).unwrap();
		let tile = decode_quantized_mesh(&bytes).unwrap();
		let decoded = tile.normals().unwrap();
		assert_eq!(decoded.len(), positions.len());
		for normal in decoded {
			assert!(normal[2] > 0.999);
		}
	}

	#[test]
	fn encoding_is_deterministic() {
		let (positions, triangles) = sample_positions();
		let first = encode_quantized_mesh(&positions, &triangles, None).unwrap();
		let second = encode_quantized_mesh(&positions, &triangles, None).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn truncated_tile_fails() {
		let (positions, triangles) = sample_positions();
		let bytes = encode_quantized_mesh(&positions, &triangles, None).unwrap();
		assert!(decode_quantized_mesh(&bytes[..50]).is_err());
	}
}
