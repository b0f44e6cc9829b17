//! Runtime settings: command-line flags with environment fallbacks.

use clap::Parser;
use std::path::PathBuf;

/// Terratiles — an on-demand Cesium quantized-mesh terrain server.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Settings {
	/// Root of the on-disk terrain tile cache; omit to disable disk caching.
	#[arg(long, env = "TERRATILES_TILE_CACHE_PATH")]
	pub tile_cache_path: Option<PathBuf>,

	/// JSON file of named datasets with their default query parameters.
	#[arg(long, env = "TERRATILES_DATASET_CONFIG_PATH", default_value = "./config/datasets.json")]
	pub dataset_config_path: PathBuf,

	/// Disable the dynamic endpoints; only named datasets are served.
	#[arg(long, env = "TERRATILES_NO_DYNAMIC")]
	pub no_dynamic: bool,

	/// Load tiles even when a source has too few overviews or a mosaic
	/// read touches too many children.
	#[arg(long = "unsafe", env = "TERRATILES_UNSAFE")]
	pub unsafe_reads: bool,

	/// Source-tile cache store: a sqlite file path, or ":memory:".
	#[arg(long, env = "TERRATILES_DB_NAME", default_value = "factory_cache.db")]
	pub db_name: String,

	/// Logging level (error, warn, info, debug, trace).
	#[arg(long, env = "TERRATILES_LOGGING_LEVEL", default_value = "info")]
	pub logging_level: log::LevelFilter,

	/// Port to serve on.
	#[arg(long, env = "TERRATILES_PORT", default_value_t = 5000)]
	pub port: u16,

	/// Allowed CORS origins; "*" allows any.
	#[arg(long, env = "TERRATILES_CORS_ALLOW_ORIGINS", value_delimiter = ',')]
	pub cors_allow_origins: Vec<String>,

	/// Seconds an unpinned source tile stays in the factory cache.
	#[arg(long, env = "TERRATILES_FACTORY_CACHE_TTL", default_value_t = 15)]
	pub factory_cache_ttl: u64,
}

impl Settings {
	/// Defaults without touching the process arguments, for tests and
	/// embedding.
	pub fn for_testing() -> Settings {
		Settings {
			tile_cache_path: None,
			dataset_config_path: PathBuf::from("./config/datasets.json"),
			no_dynamic: false,
			unsafe_reads: false,
			db_name: ":memory:".to_string(),
			logging_level: log::LevelFilter::Info,
			port: 5000,
			cors_allow_origins: Vec::new(),
			factory_cache_ttl: 15,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_the_documented_values() {
		let settings = Settings::parse_from(["terratiles"]);
		assert_eq!(settings.port, 5000);
		assert_eq!(settings.factory_cache_ttl, 15);
		assert_eq!(settings.db_name, "factory_cache.db");
		assert!(!settings.no_dynamic);
		assert!(!settings.unsafe_reads);
		assert!(settings.tile_cache_path.is_none());
	}

	#[test]
	fn flags_override_defaults() {
		let settings = Settings::parse_from([
			"terratiles",
			"--port",
			"8080",
			"--unsafe",
			"--no-dynamic",
			"--factory-cache-ttl",
			"30",
			"--cors-allow-origins",
			"https://a.example,https://b.example",
		]);
		assert_eq!(settings.port, 8080);
		assert!(settings.unsafe_reads);
		assert!(settings.no_dynamic);
		assert_eq!(settings.factory_cache_ttl, 30);
		assert_eq!(
			settings.cors_allow_origins,
			vec!["https://a.example", "https://b.example"]
		);
	}
}
