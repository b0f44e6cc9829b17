//! The cached value per source tile.

use serde::{Deserialize, Serialize};
use terratiles_core::{Heightmap, Mesh};

/// Raw and processed data of one source tile.
///
/// `out_of_bounds` marks tiles the source has no coverage for; read
/// failures are folded into the same state so terrain rendering degrades
/// to empty tiles instead of erroring.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SourceTilePayload {
	pub heights: Option<Heightmap>,
	pub mesh: Option<Mesh>,
	pub out_of_bounds: bool,
}

impl SourceTilePayload {
	pub fn new(heights: Heightmap, mesh: Mesh) -> SourceTilePayload {
		SourceTilePayload {
			heights: Some(heights),
			mesh: Some(mesh),
			out_of_bounds: false,
		}
	}

	pub fn out_of_bounds() -> SourceTilePayload {
		SourceTilePayload {
			heights: None,
			mesh: None,
			out_of_bounds: true,
		}
	}

	/// True when the payload carries usable data.
	pub fn is_available(&self) -> bool {
		!self.out_of_bounds && self.heights.is_some() && self.mesh.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn availability() {
		let payload = SourceTilePayload::new(
			Heightmap::filled(2, 2, 0.0),
			Mesh::new(vec![[0.0; 3]], vec![]),
		);
		assert!(payload.is_available());
		assert!(!SourceTilePayload::out_of_bounds().is_available());
	}

	#[test]
	fn serializes_for_the_file_backend() {
		let payload = SourceTilePayload::new(
			Heightmap::filled(2, 2, 1.5),
			Mesh::new(vec![[0.0, 1.0, 2.0]], vec![]),
		);
		let bytes = bincode::serialize(&payload).unwrap();
		let back: SourceTilePayload = bincode::deserialize(&bytes).unwrap();
		assert_eq!(back, payload);
	}
}
