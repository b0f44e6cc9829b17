//! Cloud-Optimized GeoTIFF readers and the pooled reader layer.
//!
//! A [`CogReader`] crops and resamples a raster window for one tile;
//! a [`MosaicReader`] composites several COGs listed in a JSON mosaic
//! definition. Open readers are recycled per source through the
//! [`CogReaderPool`], which also implements the [`TerrainSource`] seam
//! the terrain factory builds against.

mod geotiff;
mod mosaic;
mod pool;
mod resample;
mod source;
pub mod testing;

pub use geotiff::*;
pub use mosaic::*;
pub use pool::*;
pub use resample::*;
pub use source::*;

/// Dataset flavors the pool can open, decided by file extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DatasetType {
	Cog,
	Mosaic,
}

/// Classify a source path or URL by its extension.
pub fn dataset_type(source: &str) -> DatasetType {
	let path = source.split('?').next().unwrap_or(source);
	match path.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
		Some(ext) if ext == "json" || ext == "mosaic" => DatasetType::Mosaic,
		_ => DatasetType::Cog,
	}
}
