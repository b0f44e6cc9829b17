//! HTTP handlers: terrain tiles, layer.json, status and the index page.

use super::ServerState;
use super::params::TerrainParams;
use crate::{layer::generate_layer_json, tile_cache};
use anyhow::Result;
use axum::{
	body::Body,
	extract::{Query, State},
	http::{HeaderMap, Uri, header},
	response::Response,
};
use std::sync::Arc;
use terratiles_core::{GeoBBox, TileCoord};
use terratiles_mesh::empty_tile;

/// Entry point for everything under `/tiles/`.
///
/// Understood shapes:
/// - `/tiles/{dataset}/layer.json`
/// - `/tiles/{dataset}/{z}/{x}/{y}.terrain`
///
/// where `{dataset}` is a configured name or `dynamic` (parameters from
/// the query string).
pub async fn serve_tiles(
	State(state): State<Arc<ServerState>>,
	uri: Uri,
	headers: HeaderMap,
	Query(params): Query<TerrainParams>,
) -> Response<Body> {
	log::debug!("handle tile request: {}", uri.path());

	let path = uri.path().trim_start_matches("/tiles/");
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	let Some((&name, rest)) = segments.split_first() else {
		return error_404();
	};

	let merged = if name == "dynamic" {
		if state.settings.no_dynamic {
			log::debug!("dynamic endpoints are disabled");
			return error_404();
		}
		params
	} else {
		let Some(defaults) = state.datasets.get(name) else {
			log::debug!("unknown dataset {name:?}");
			return error_404();
		};
		params.overlaid_on(defaults)
	};
	let dynamic = name == "dynamic";

	match rest {
		["layer.json"] => serve_layer_json(&state, &merged, dynamic).await,
		[z, x, y_terrain] => serve_terrain(&state, &merged, &headers, z, x, y_terrain).await,
		_ => error_404(),
	}
}

async fn serve_terrain(
	state: &Arc<ServerState>,
	params: &TerrainParams,
	headers: &HeaderMap,
	z: &str,
	x: &str,
	y_terrain: &str,
) -> Response<Body> {
	let resolved = match params.resolve(accept_wants_normals(headers)) {
		Ok(resolved) => resolved,
		Err(error) => return error_400(&format!("{error:#}")),
	};

	let Some(y) = y_terrain.strip_suffix(".terrain") else {
		return error_404();
	};
	let (Ok(z), Ok(x), Ok(y)) = (z.parse::<u8>(), x.parse::<u32>(), y.parse::<u32>()) else {
		return error_400("tile indices must be integers");
	};
	// Cesium's wire convention flips y; converted exactly once, here
	let coord = match TileCoord::from_cesium(z, x, y) {
		Ok(coord) => coord,
		Err(error) => return error_400(&format!("{error:#}")),
	};

	if z < resolved.min_zoom || z > resolved.max_zoom {
		return match empty_tile(
			coord.geo_bbox(),
			f64::from(resolved.options.nodata_fill),
			resolved.options.generate_normals,
		) {
			Ok(bytes) => ok_terrain(bytes),
			Err(error) => {
				log::error!("encoding empty tile failed: {error:#}");
				error_500()
			}
		};
	}

	let method = resolved.options.method.name();
	if !resolved.skip_cache {
		if let Some(root) = &state.settings.tile_cache_path {
			if let Some(bytes) = tile_cache::read_tile(root, &resolved.source, method, coord).await {
				log::debug!("disk cache hit for {coord}");
				return ok_terrain(bytes);
			}
		}
	}

	match state.factory.handle(coord, resolved.options.clone()).await {
		Ok(bytes) => {
			if let Some(root) = &state.settings.tile_cache_path {
				let root = root.clone();
				let source = resolved.source.clone();
				let bytes_out = bytes.clone();
				// fire-and-forget write-through; concurrent writers for the
				// same path cannot happen because uncached builds coalesce
				tokio::spawn(async move {
					if let Err(error) =
						tile_cache::write_tile(&root, &source, method, coord, &bytes_out).await
					{
						log::warn!("tile cache write failed: {error:#}");
					}
				});
			}
			ok_terrain(bytes)
		}
		Err(error) => {
			log::warn!("terrain request {coord} failed: {error:#}");
			error_500()
		}
	}
}

async fn serve_layer_json(
	state: &Arc<ServerState>,
	params: &TerrainParams,
	dynamic: bool,
) -> Response<Body> {
	let resolved = match params.resolve(false) {
		Ok(resolved) => resolved,
		Err(error) => return error_400(&format!("{error:#}")),
	};

	let source = resolved.source.clone();
	let bounds = tokio::task::spawn_blocking(move || dataset_bounds(&source)).await;
	let bounds = match bounds {
		Ok(Ok(bounds)) => bounds,
		Ok(Err(error)) => {
			log::warn!("probing {} failed: {error:#}", resolved.source);
			return error_500();
		}
		Err(error) => {
			log::error!("probe task panicked: {error}");
			return error_500();
		}
	};

	let tile_query = if dynamic {
		format!("&cog={}", resolved.source)
	} else {
		String::new()
	};
	match generate_layer_json(bounds, resolved.max_zoom, &tile_query) {
		Ok(layer) => ok_json(&layer.to_string()),
		Err(error) => {
			log::error!("layer.json generation failed: {error:#}");
			error_500()
		}
	}
}

/// Geographic bounds of a dataset, COG or mosaic.
fn dataset_bounds(source: &str) -> Result<GeoBBox> {
	match terratiles_cog::dataset_type(source) {
		terratiles_cog::DatasetType::Cog => Ok(terratiles_cog::probe_cog(source)?.bounds),
		terratiles_cog::DatasetType::Mosaic => Ok(terratiles_cog::MosaicReader::open(source)?.extent),
	}
}

/// `Accept: application/vnd.quantized-mesh;extensions=octvertexnormals`
fn accept_wants_normals(headers: &HeaderMap) -> bool {
	headers.get_all(header::ACCEPT).iter().any(|value| {
		value
			.to_str()
			.is_ok_and(|text| text.contains("extensions=octvertexnormals"))
	})
}

pub async fn status(State(state): State<Arc<ServerState>>) -> Response<Body> {
	let now = time::OffsetDateTime::now_utc();
	let started = state
		.started
		.format(&time::format_description::well_known::Rfc3339)
		.unwrap_or_default();
	let uptime = (now - state.started).whole_seconds();
	ok_json(&format!("{{\"started\":\"{started}\",\"uptime_seconds\":{uptime}}}"))
}

pub async fn index(State(state): State<Arc<ServerState>>) -> Response<Body> {
	let mut rows = String::new();
	for name in state.datasets.names() {
		rows.push_str(&format!(
			"<li><a href=\"/tiles/{name}/layer.json\">{name}</a></li>"
		));
	}
	let body = format!(
		"<!doctype html><html><head><title>terratiles</title></head><body>\
		<h1>terratiles</h1><ul>{rows}</ul>\
		<p><a href=\"/status\">status</a></p></body></html>"
	);
	Response::builder()
		.status(200)
		.header(header::CONTENT_TYPE, "text/html; charset=utf-8")
		.body(Body::from(body))
		.expect("failed to build index response")
}

// --- small helpers -----------------------------------------------------------

fn ok_terrain(bytes: Vec<u8>) -> Response<Body> {
	Response::builder()
		.status(200)
		.header(header::CONTENT_TYPE, "application/octet-stream")
		.body(Body::from(bytes))
		.expect("failed to build terrain response")
}

fn ok_json(json: &str) -> Response<Body> {
	Response::builder()
		.status(200)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(json.to_string()))
		.expect("failed to build json response")
}

fn error_with(status: u16, message: &str) -> Response<Body> {
	Response::builder()
		.status(status)
		.header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
		.body(Body::from(message.as_bytes().to_vec()))
		.expect("failed to build error response")
}

fn error_400(message: &str) -> Response<Body> {
	error_with(400, message)
}

fn error_404() -> Response<Body> {
	error_with(404, "Not Found")
}

fn error_500() -> Response<Body> {
	error_with(500, "Internal Server Error")
}
