//! Terrain request query parameters and their resolution.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use terratiles_core::Resampling;
use terratiles_factory::TerrainOptions;
use terratiles_mesh::{GridParams, MeshingMethod, TinParams};

/// Raw query parameters of a terrain or layer.json request.
///
/// The same shape appears in the dataset config: a named dataset is a
/// stored set of these, and request parameters override them field by
/// field.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TerrainParams {
	pub cog: Option<String>,
	pub min_zoom: Option<u8>,
	pub max_zoom: Option<u8>,
	pub resampling_method: Option<String>,
	/// grid, delatin or martini.
	pub meshing_method: Option<String>,
	pub skip_cache: Option<bool>,
	pub default_grid_size: Option<u32>,
	/// JSON map of zoom level to grid size.
	pub zoom_grid_sizes: Option<String>,
	pub default_max_error: Option<f64>,
	/// JSON map of zoom level to max error in meters.
	pub zoom_max_errors: Option<String>,
	/// Dash-separated extension list, e.g. "octvertexnormals".
	pub extensions: Option<String>,
	pub no_data: Option<f32>,
}

impl TerrainParams {
	/// Fill unset fields from a dataset's stored defaults.
	pub fn overlaid_on(mut self, defaults: &TerrainParams) -> TerrainParams {
		self.cog = self.cog.or_else(|| defaults.cog.clone());
		self.min_zoom = self.min_zoom.or(defaults.min_zoom);
		self.max_zoom = self.max_zoom.or(defaults.max_zoom);
		self.resampling_method = self
			.resampling_method
			.or_else(|| defaults.resampling_method.clone());
		self.meshing_method = self.meshing_method.or_else(|| defaults.meshing_method.clone());
		self.skip_cache = self.skip_cache.or(defaults.skip_cache);
		self.default_grid_size = self.default_grid_size.or(defaults.default_grid_size);
		self.zoom_grid_sizes = self.zoom_grid_sizes.or_else(|| defaults.zoom_grid_sizes.clone());
		self.default_max_error = self.default_max_error.or(defaults.default_max_error);
		self.zoom_max_errors = self.zoom_max_errors.or_else(|| defaults.zoom_max_errors.clone());
		self.extensions = self.extensions.or_else(|| defaults.extensions.clone());
		self.no_data = self.no_data.or(defaults.no_data);
		self
	}

	/// Resolve into factory options and zoom limits.
	///
	/// `accept_normals` is the `Accept` header's vote; either it or the
	/// `extensions` parameter enables the normals extension.
	pub fn resolve(&self, accept_normals: bool) -> Result<ResolvedParams> {
		let Some(source) = self.cog.clone() else {
			bail!("missing required parameter \"cog\"");
		};

		let resampling = match &self.resampling_method {
			Some(name) => name.parse::<Resampling>()?,
			None => Resampling::default(),
		};

		let method = match self.meshing_method.as_deref().unwrap_or("grid") {
			"grid" => MeshingMethod::Grid(GridParams {
				default_grid_size: self.default_grid_size.unwrap_or(20),
				zoom_grid_sizes: match &self.zoom_grid_sizes {
					Some(text) => parse_zoom_map(text).context("parsing zoomGridSizes")?,
					None => default_zoom_grid_sizes(),
				},
			}),
			name @ ("delatin" | "martini") => {
				let params = TinParams {
					default_max_error: self.default_max_error.unwrap_or(4.0),
					zoom_max_errors: match &self.zoom_max_errors {
						Some(text) => parse_zoom_map(text).context("parsing zoomMaxErrors")?,
						None => default_zoom_max_errors(),
					},
				};
				if name == "delatin" {
					MeshingMethod::Delatin(params)
				} else {
					MeshingMethod::Martini(params)
				}
			}
			other => bail!("unknown meshing method: \"{other}\""),
		};

		let generate_normals = accept_normals
			|| self
				.extensions
				.as_deref()
				.is_some_and(|list| list.split('-').any(|ext| ext == "octvertexnormals"));

		let mut options = TerrainOptions::new(&source, method);
		options.resampling = resampling;
		options.generate_normals = generate_normals;
		options.nodata_fill = self.no_data.unwrap_or(0.0);

		Ok(ResolvedParams {
			source,
			min_zoom: self.min_zoom.unwrap_or(1),
			max_zoom: self.max_zoom.unwrap_or(18),
			skip_cache: self.skip_cache.unwrap_or(false),
			options,
		})
	}
}

/// A terrain request ready for the factory.
#[derive(Clone, Debug)]
pub struct ResolvedParams {
	pub source: String,
	pub min_zoom: u8,
	pub max_zoom: u8,
	pub skip_cache: bool,
	pub options: TerrainOptions,
}

fn parse_zoom_map<T>(text: &str) -> Result<HashMap<u8, T>>
where
	T: serde::de::DeserializeOwned,
{
	let raw: HashMap<String, T> = serde_json::from_str(text)?;
	raw
		.into_iter()
		.map(|(zoom, value)| Ok((zoom.parse::<u8>()?, value)))
		.collect()
}

fn default_zoom_grid_sizes() -> HashMap<u8, u32> {
	HashMap::from([
		(15, 25),
		(16, 25),
		(17, 30),
		(18, 35),
		(19, 35),
		(20, 35),
		(21, 35),
		(22, 35),
	])
}

fn default_zoom_max_errors() -> HashMap<u8, f64> {
	HashMap::from([
		(15, 8.0),
		(16, 5.0),
		(17, 3.0),
		(18, 2.0),
		(19, 1.0),
		(20, 0.5),
		(21, 0.3),
		(22, 0.1),
	])
}
