//! The seam between the terrain factory and the raster layer.

use anyhow::Result;
use async_trait::async_trait;
use terratiles_core::{Heightmap, Resampling, TileCoord};

/// Everything one source-tile read needs to know.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceTileRead {
	/// Canonical path or URL of the dataset.
	pub source: String,
	pub coord: TileCoord,
	pub resampling: Resampling,
	/// Extra window in output pixels added on each side (martini: 0.5).
	pub buffer: f64,
	/// Height written wherever the source has no data.
	pub nodata_fill: f32,
}

impl SourceTileRead {
	pub fn new(source: &str, coord: TileCoord) -> SourceTileRead {
		SourceTileRead {
			source: source.to_string(),
			coord,
			resampling: Resampling::default(),
			buffer: 0.0,
			nodata_fill: 0.0,
		}
	}

	pub fn with_resampling(mut self, resampling: Resampling) -> SourceTileRead {
		self.resampling = resampling;
		self
	}

	pub fn with_buffer(mut self, buffer: f64) -> SourceTileRead {
		self.buffer = buffer;
		self
	}

	pub fn with_nodata_fill(mut self, nodata_fill: f32) -> SourceTileRead {
		self.nodata_fill = nodata_fill;
		self
	}
}

/// A provider of heightmap windows for terrain tiles.
///
/// `Ok(None)` means the source has no coverage for the tile (or refuses
/// the read); the factory turns that into an empty terrain tile.
/// Implemented by [`crate::CogReaderPool`]; tests use counting mocks.
#[async_trait]
pub trait TerrainSource: Send + Sync {
	async fn read(&self, read: &SourceTileRead) -> Result<Option<Heightmap>>;
}
