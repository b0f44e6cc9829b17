//! One terrain request and the source tiles it wants.

use crate::{SourceTileKey, TerrainKey, new_terrain_key};
use anyhow::Result;
use terratiles_core::{Direction, Resampling, TileCoord};
use terratiles_mesh::MeshingMethod;
use tokio::sync::oneshot;

/// Parameters shared by a terrain request and its source-tile reads.
#[derive(Clone, Debug)]
pub struct TerrainOptions {
	/// Canonical dataset path or URL.
	pub source: String,
	pub method: MeshingMethod,
	pub resampling: Resampling,
	/// Emit the oct-encoded vertex normals extension.
	pub generate_normals: bool,
	/// Height written where the source has no data.
	pub nodata_fill: f32,
}

impl TerrainOptions {
	pub fn new(source: &str, method: MeshingMethod) -> TerrainOptions {
		TerrainOptions {
			source: source.to_string(),
			method,
			resampling: Resampling::default(),
			generate_normals: false,
			nodata_fill: 0.0,
		}
	}

	pub fn source_tile_key(&self, coord: TileCoord) -> SourceTileKey {
		SourceTileKey::new(&self.source, self.method.name(), coord)
	}
}

/// A transient request for one terrain tile.
///
/// Lives in the factory's pending map from creation until its inputs are
/// complete; the result is delivered exactly once through the oneshot
/// channel handed out at construction.
pub struct TerrainRequest {
	pub key: TerrainKey,
	pub coord: TileCoord,
	pub options: TerrainOptions,
	/// The source tiles this request needs: the tile itself plus its
	/// existing neighbors, deduplicated (at zoom 0 the east and west
	/// neighbor are both the other root tile).
	pub wanted_keys: Vec<SourceTileKey>,
	pub(crate) result_tx: Option<oneshot::Sender<Result<Vec<u8>>>>,
}

impl TerrainRequest {
	pub fn new(
		coord: TileCoord,
		options: TerrainOptions,
	) -> (TerrainRequest, oneshot::Receiver<Result<Vec<u8>>>) {
		let mut wanted_keys = vec![options.source_tile_key(coord)];
		for neighbor in coord.neighbors() {
			let key = options.source_tile_key(neighbor);
			if !wanted_keys.contains(&key) {
				wanted_keys.push(key);
			}
		}

		let (result_tx, result_rx) = oneshot::channel();
		(
			TerrainRequest {
				key: new_terrain_key(),
				coord,
				options,
				wanted_keys,
				result_tx: Some(result_tx),
			},
			result_rx,
		)
	}

	/// The key of the main source tile.
	pub fn main_key(&self) -> &SourceTileKey {
		&self.wanted_keys[0]
	}

	/// The key of the neighbor tile in a direction, if that tile exists.
	pub fn neighbor_key(&self, direction: Direction) -> Option<SourceTileKey> {
		self
			.coord
			.neighbor(direction)
			.map(|coord| self.options.source_tile_key(coord))
	}
}
