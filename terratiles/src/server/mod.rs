//! The HTTP server: lifecycle and composition.
//!
//! `routes` wires the handlers into an axum `Router`; `handlers` hold
//! the request logic; `params` define the query surface. This module
//! owns lifecycle only: building the shared state, CORS, listening and
//! graceful shutdown.

mod handlers;
pub mod params;
mod routes;

use crate::{Settings, datasets::DatasetConfig};
use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use terratiles_cog::{CogReaderPool, DEFAULT_MAX_READERS, TerrainSource};
use terratiles_factory::{CacheBackend, FactoryOptions, SqliteBackend, TerrainFactory};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Everything the handlers share.
pub struct ServerState {
	pub settings: Settings,
	pub datasets: DatasetConfig,
	pub factory: Arc<TerrainFactory>,
	pub started: OffsetDateTime,
}

/// The terratiles HTTP server.
pub struct TerrainServer {
	state: Arc<ServerState>,
}

impl TerrainServer {
	/// Build the server: dataset config, reader pool, source-tile cache
	/// backend and the terrain factory. Must run inside a tokio runtime
	/// (the factory spawns its event loop and sweeper).
	pub fn new(settings: Settings) -> Result<TerrainServer> {
		let datasets = DatasetConfig::load(&settings.dataset_config_path)?;

		let pool: Arc<dyn TerrainSource> =
			Arc::new(CogReaderPool::new(settings.unsafe_reads, DEFAULT_MAX_READERS));

		let backend: Arc<dyn CacheBackend> = if settings.db_name == ":memory:" {
			Arc::new(SqliteBackend::open_in_memory()?)
		} else {
			Arc::new(SqliteBackend::open(&settings.db_name)?)
		};

		let factory_options = FactoryOptions {
			cache_ttl: Duration::from_secs(settings.factory_cache_ttl),
			..FactoryOptions::default()
		};
		let factory = TerrainFactory::new(pool, backend, &factory_options);

		Ok(TerrainServer {
			state: Arc::new(ServerState {
				settings,
				datasets,
				factory,
				started: OffsetDateTime::now_utc(),
			}),
		})
	}

	/// The composed router, also used directly by the tests.
	pub fn router(&self) -> Router {
		routes::build_router(Arc::clone(&self.state)).layer(cors_layer(&self.state.settings))
	}

	/// Bind and serve until ctrl-c.
	pub async fn serve(self) -> Result<()> {
		let address = format!("0.0.0.0:{}", self.state.settings.port);
		let listener = TcpListener::bind(&address)
			.await
			.with_context(|| format!("binding {address}"))?;
		log::info!("terratiles listening on http://{address}");

		axum::serve(listener, self.router())
			.with_graceful_shutdown(async {
				let _ = tokio::signal::ctrl_c().await;
				log::info!("shutting down");
			})
			.await
			.context("serving failed")
	}
}

/// CORS from `--cors-allow-origins`: exact origins, or `Any` when the
/// list is empty or contains `*`.
fn cors_layer(settings: &Settings) -> CorsLayer {
	let origins = &settings.cors_allow_origins;
	if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
		return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
	}
	let parsed: Vec<HeaderValue> = origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(value) => Some(value),
			Err(error) => {
				log::warn!("ignoring invalid CORS origin {origin:?}: {error}");
				None
			}
		})
		.collect();
	CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
}
