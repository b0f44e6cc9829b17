//! On-disk cache of encoded terrain tiles.
//!
//! Layout: `{root}/{hex(source)}/{method}/{z}/{x}/{y}.terrain` with y in
//! the Cesium wire convention, so the cache can be seeded or inspected
//! with the same indices clients request.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use terratiles_core::TileCoord;

fn hex_encode(text: &str) -> String {
	let mut out = String::with_capacity(text.len() * 2);
	for byte in text.as_bytes() {
		out.push_str(&format!("{byte:02x}"));
	}
	out
}

/// Directory holding one dataset + meshing method combination.
pub fn method_root(root: &Path, source: &str, method: &str) -> PathBuf {
	root.join(hex_encode(source)).join(method)
}

/// Full path of one cached tile.
pub fn tile_path(root: &Path, source: &str, method: &str, coord: TileCoord) -> PathBuf {
	let (z, x, y) = coord.to_cesium();
	method_root(root, source, method)
		.join(z.to_string())
		.join(x.to_string())
		.join(format!("{y}.terrain"))
}

/// Read a cached tile, if present.
pub async fn read_tile(root: &Path, source: &str, method: &str, coord: TileCoord) -> Option<Vec<u8>> {
	let path = tile_path(root, source, method, coord);
	match tokio::fs::read(&path).await {
		Ok(bytes) => Some(bytes),
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
		Err(error) => {
			log::warn!("reading cached tile {path:?} failed: {error}");
			None
		}
	}
}

/// Write a tile, creating the directory chain as needed.
pub async fn write_tile(
	root: &Path,
	source: &str,
	method: &str,
	coord: TileCoord,
	bytes: &[u8],
) -> Result<()> {
	let path = tile_path(root, source, method, coord);
	let dir = path.parent().context("tile path has no parent")?;
	tokio::fs::create_dir_all(dir)
		.await
		.with_context(|| format!("creating {dir:?}"))?;
	tokio::fs::write(&path, bytes)
		.await
		.with_context(|| format!("writing {path:?}"))?;
	Ok(())
}
