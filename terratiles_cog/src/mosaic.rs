//! Mosaic definitions: a JSON list of child COGs with their extents.

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;
use terratiles_core::GeoBBox;

/// Mosaic reads touching more children than this are refused unless
/// unsafe reads are enabled.
pub const MAX_MOSAIC_CHILDREN: usize = 10;

#[derive(Debug, Deserialize)]
struct RawMosaic {
	extent: Vec<f64>,
	datasets: Vec<RawChild>,
}

#[derive(Debug, Deserialize)]
struct RawChild {
	path: String,
	extent: Vec<f64>,
}

/// One child dataset of a mosaic.
#[derive(Clone, Debug)]
pub struct MosaicChild {
	/// Absolute path or URL, resolved against the definition location.
	pub path: String,
	pub extent: GeoBBox,
}

/// A parsed mosaic definition.
///
/// The reader itself holds no file handles; child rasters are opened
/// through the pool on demand, so a mosaic "reader" is cheap to clone
/// and pool.
#[derive(Clone, Debug)]
pub struct MosaicReader {
	source: String,
	pub extent: GeoBBox,
	pub children: Vec<MosaicChild>,
}

impl MosaicReader {
	/// Load a mosaic definition from a local file or an http(s) URL.
	/// Blocking.
	pub fn open(source: &str) -> Result<MosaicReader> {
		let raw: RawMosaic = if is_url(source) {
			reqwest::blocking::get(source)
				.and_then(reqwest::blocking::Response::error_for_status)
				.with_context(|| format!("fetching mosaic {source}"))?
				.json()
				.with_context(|| format!("parsing mosaic {source}"))?
		} else {
			let text = std::fs::read_to_string(source).with_context(|| format!("reading mosaic {source}"))?;
			serde_json::from_str(&text).with_context(|| format!("parsing mosaic {source}"))?
		};

		ensure!(!raw.datasets.is_empty(), "mosaic {source} lists no datasets");

		let children = raw
			.datasets
			.into_iter()
			.map(|child| {
				Ok(MosaicChild {
					path: resolve_child_path(source, &child.path),
					extent: GeoBBox::from_array(&child.extent)?,
				})
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(MosaicReader {
			source: source.to_string(),
			extent: GeoBBox::from_array(&raw.extent)?,
			children,
		})
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	/// Children whose extent intersects the given bounds, in definition
	/// order.
	pub fn intersecting_children(&self, bounds: &GeoBBox) -> Vec<&MosaicChild> {
		self
			.children
			.iter()
			.filter(|child| child.extent.intersects(bounds))
			.collect()
	}

	pub fn tile_exists(&self, bounds: &GeoBBox) -> bool {
		self.extent.intersects(bounds)
	}
}

fn is_url(source: &str) -> bool {
	source.starts_with("http://") || source.starts_with("https://")
}

/// Children are listed relative to the definition: siblings for file
/// paths, same-host paths for URLs.
fn resolve_child_path(mosaic_source: &str, child: &str) -> String {
	if is_url(child) || Path::new(child).is_absolute() {
		return child.to_string();
	}
	if is_url(mosaic_source) {
		match mosaic_source.rfind('/') {
			Some(slash) => format!("{}/{}", &mosaic_source[..slash], child),
			None => child.to_string(),
		}
	} else {
		Path::new(mosaic_source)
			.parent()
			.map_or_else(|| child.to_string(), |dir| dir.join(child).to_string_lossy().into_owned())
	}
}
