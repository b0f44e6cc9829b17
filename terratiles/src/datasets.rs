//! Named dataset configuration: stored query parameter defaults.

use crate::server::params::TerrainParams;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawConfig {
	datasets: Vec<RawDataset>,
}

#[derive(Debug, Deserialize)]
struct RawDataset {
	name: String,
	#[serde(default)]
	options: TerrainParams,
}

/// Datasets loaded from the config file, by name.
///
/// Each entry is a bundle of default query parameters; the terrain
/// handler overlays the request's own parameters on top.
#[derive(Debug, Default)]
pub struct DatasetConfig {
	datasets: HashMap<String, TerrainParams>,
}

impl DatasetConfig {
	/// Load a config file. A missing file yields an empty config (the
	/// server then only serves dynamic requests); a malformed file is an
	/// error.
	pub fn load(path: &Path) -> Result<DatasetConfig> {
		if !path.exists() {
			log::warn!("dataset config {path:?} not found, serving no named datasets");
			return Ok(DatasetConfig::default());
		}

		let text = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
		let raw: RawConfig = serde_json::from_str(&text).with_context(|| format!("parsing {path:?}"))?;

		let mut datasets = HashMap::new();
		for dataset in raw.datasets {
			ensure!(!dataset.name.is_empty(), "dataset names must not be empty");
			ensure!(
				dataset.name != "dynamic",
				"\"dynamic\" is reserved for the dynamic endpoints"
			);
			datasets.insert(dataset.name, dataset.options);
		}
		log::info!("loaded {} named datasets from {path:?}", datasets.len());
		Ok(DatasetConfig { datasets })
	}

	pub fn get(&self, name: &str) -> Option<&TerrainParams> {
		self.datasets.get(name)
	}

	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.datasets.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}
}
