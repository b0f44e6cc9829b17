//! Cache and request identifiers.

use std::fmt::{self, Display};
use terratiles_core::TileCoord;
use uuid::Uuid;

/// Fingerprint of one cacheable source tile:
/// `(source, mesh method, z, x, y)`.
///
/// The source string is the canonical dataset path or URL and is treated
/// opaquely; two spellings of the same dataset are two cache entries.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceTileKey {
	pub source: String,
	pub method: String,
	pub coord: TileCoord,
}

impl SourceTileKey {
	pub fn new(source: &str, method: &str, coord: TileCoord) -> SourceTileKey {
		SourceTileKey {
			source: source.to_string(),
			method: method.to_string(),
			coord,
		}
	}

	/// The flat string form used by the cache backends.
	pub fn as_cache_key(&self) -> String {
		self.to_string()
	}
}

impl Display for SourceTileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!(
			"{}_{}_{}_{}_{}",
			self.source, self.method, self.coord.z, self.coord.x, self.coord.y
		))
	}
}

/// One-shot identifier of an in-flight terrain request. Never cached.
pub type TerrainKey = Uuid;

/// A fresh terrain key.
pub fn new_terrain_key() -> TerrainKey {
	Uuid::new_v4()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cache_key_contains_all_parts() {
		let key = SourceTileKey::new("/data/alps.tif", "grid", TileCoord::new(10, 5, 7).unwrap());
		assert_eq!(key.as_cache_key(), "/data/alps.tif_grid_10_5_7");
	}

	#[test]
	fn keys_are_value_equal() {
		let coord = TileCoord::new(3, 1, 2).unwrap();
		assert_eq!(
			SourceTileKey::new("a.tif", "grid", coord),
			SourceTileKey::new("a.tif", "grid", coord)
		);
		assert_ne!(
			SourceTileKey::new("a.tif", "grid", coord),
			SourceTileKey::new("a.tif", "delatin", coord)
		);
	}

	#[test]
	fn terrain_keys_are_unique() {
		assert_ne!(new_terrain_key(), new_terrain_key());
	}
}
