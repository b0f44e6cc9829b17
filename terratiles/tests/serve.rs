//! End-to-end tests driving the router with in-process requests.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use std::path::PathBuf;
use tempfile::TempDir;
use terratiles::{Settings, TerrainServer};
use terratiles_cog::testing::write_test_cog;
use terratiles_core::{GeoBBox, TileCoord};
use terratiles_mesh::empty_tile;
use terratiles_mesh::quantized::{QuantizedMeshTile, decode_quantized_mesh};
use tower::ServiceExt;

struct Fixture {
	dir: TempDir,
	server: TerrainServer,
	cog: String,
}

fn fixture_with(settings_fn: impl FnOnce(&mut Settings, &TempDir)) -> Fixture {
	let dir = TempDir::new().unwrap();
	let cog_path = dir.path().join("test_cog.tif");
	// heights rise northwards: row r (top-origin) has height (63 - r) * 2
	write_test_cog(
		&cog_path,
		64,
		64,
		GeoBBox::new(4.0, 50.0, 6.0, 52.0).unwrap(),
		Some(-9999.0),
		|_, y| ((63 - y) * 2) as f32,
	)
	.unwrap();
	let cog = cog_path.to_str().unwrap().to_string();

	let config_path = dir.path().join("datasets.json");
	std::fs::write(
		&config_path,
		format!(
			r#"{{ "datasets": [ {{ "name": "alps", "options": {{ "cog": "{cog}", "maxZoom": 16 }} }} ] }}"#
		),
	)
	.unwrap();

	let mut settings = Settings::for_testing();
	settings.dataset_config_path = config_path;
	settings_fn(&mut settings, &dir);

	let server = TerrainServer::new(settings).unwrap();
	Fixture { dir, server, cog }
}

fn fixture() -> Fixture {
	fixture_with(|_, _| {})
}

async fn get(fixture: &Fixture, uri: &str) -> (StatusCode, Vec<u8>) {
	get_with_accept(fixture, uri, None).await
}

async fn get_with_accept(fixture: &Fixture, uri: &str, accept: Option<&str>) -> (StatusCode, Vec<u8>) {
	let mut request = Request::builder().uri(uri);
	if let Some(accept) = accept {
		request = request.header(header::ACCEPT, accept);
	}
	let response = fixture
		.server
		.router()
		.oneshot(request.body(Body::empty()).unwrap())
		.await
		.unwrap();
	let status = response.status();
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	(status, bytes.to_vec())
}

async fn get_tile(fixture: &Fixture, uri: &str) -> QuantizedMeshTile {
	let (status, bytes) = get(fixture, uri).await;
	assert_eq!(status, StatusCode::OK, "GET {uri}");
	decode_quantized_mesh(&bytes).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn status_endpoint_reports_uptime() {
	let fixture = fixture();
	let (status, body) = get(&fixture, "/status").await;
	assert_eq!(status, StatusCode::OK);
	let text = String::from_utf8(body).unwrap();
	assert!(text.contains("\"started\""));
	assert!(text.contains("\"uptime_seconds\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn index_lists_the_datasets() {
	let fixture = fixture();
	let (status, body) = get(&fixture, "/").await;
	assert_eq!(status, StatusCode::OK);
	assert!(String::from_utf8(body).unwrap().contains("/tiles/alps/layer.json"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dynamic_grid_tile_has_the_requested_lattice() {
	let fixture = fixture();
	// TMS (8, 263, 200) is inside the dataset; cesium y = 255 - 200 = 55
	let uri = format!(
		"/tiles/dynamic/8/263/55.terrain?cog={}&defaultGridSize=20",
		fixture.cog
	);
	let tile = get_tile(&fixture, &uri).await;

	assert_eq!(tile.vertex_count(), 21 * 21);
	assert_eq!(tile.triangles.len(), 20 * 20 * 2);
	// source heights span 0..126; the window is a slice of that
	assert!(tile.min_height >= 0.0);
	assert!(tile.max_height <= 126.0);
	assert!(tile.max_height > tile.min_height);
	assert!(tile.normal_bytes.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn accept_header_toggles_the_normals_extension() {
	let fixture = fixture();
	let uri = format!("/tiles/dynamic/8/263/55.terrain?cog={}", fixture.cog);

	let (status, bytes) = get_with_accept(
		&fixture,
		&uri,
		Some("application/vnd.quantized-mesh;extensions=octvertexnormals"),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let tile = decode_quantized_mesh(&bytes).unwrap();
	assert!(tile.normal_bytes.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn below_min_zoom_serves_the_empty_tile_deterministically() {
	let fixture = fixture();
	let uri = format!("/tiles/dynamic/0/0/0.terrain?cog={}", fixture.cog);

	let (status, first) = get(&fixture, &uri).await;
	assert_eq!(status, StatusCode::OK);
	let (_, second) = get(&fixture, &uri).await;
	assert_eq!(first, second);

	let coord = TileCoord::from_cesium(0, 0, 0).unwrap();
	let expected = empty_tile(coord.geo_bbox(), 0.0, false).unwrap();
	assert_eq!(first, expected);

	let tile = decode_quantized_mesh(&first).unwrap();
	assert_eq!(tile.vertex_count(), 21 * 21);
	assert_eq!(tile.min_height, 0.0);
	assert_eq!(tile.max_height, 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn tiles_outside_the_dataset_are_empty_not_errors() {
	let fixture = fixture();
	// far away over the Pacific
	let uri = format!("/tiles/dynamic/8/40/55.terrain?cog={}", fixture.cog);
	let tile = get_tile(&fixture, &uri).await;
	assert_eq!(tile.min_height, 0.0);
	assert_eq!(tile.max_height, 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn named_dataset_uses_its_configured_source() {
	let fixture = fixture();
	let tile = get_tile(&fixture, "/tiles/alps/8/263/55.terrain").await;
	assert!(tile.max_height > 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_dataset_is_404() {
	let fixture = fixture();
	let (status, _) = get(&fixture, "/tiles/nowhere/8/263/55.terrain").await;
	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn no_dynamic_disables_the_dynamic_endpoints() {
	let fixture = fixture_with(|settings, _| settings.no_dynamic = true);
	let uri = format!("/tiles/dynamic/8/263/55.terrain?cog={}", fixture.cog);
	let (status, _) = get(&fixture, &uri).await;
	assert_eq!(status, StatusCode::NOT_FOUND);

	// named datasets still work
	let (status, _) = get(&fixture, "/tiles/alps/8/263/55.terrain").await;
	assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_requests_are_400() {
	let fixture = fixture();
	let (status, _) = get(&fixture, "/tiles/alps/8/abc/55.terrain").await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	let (status, _) = get(&fixture, "/tiles/dynamic/8/263/55.terrain").await;
	assert_eq!(status, StatusCode::BAD_REQUEST, "dynamic without cog");

	let uri = format!(
		"/tiles/dynamic/8/263/55.terrain?cog={}&meshingMethod=voronoi",
		fixture.cog
	);
	let (status, _) = get(&fixture, &uri).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn layer_json_describes_the_dataset() {
	let fixture = fixture();
	let (status, body) = get(&fixture, "/tiles/alps/layer.json").await;
	assert_eq!(status, StatusCode::OK);
	let layer: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(layer["format"], "quantized-mesh-1.0");
	assert_eq!(layer["schema"], "tms");
	assert_eq!(layer["cogBounds"], serde_json::json!([4.0, 50.0, 6.0, 52.0]));
	// maxZoom 16 from the dataset config: zooms 0..=16
	assert_eq!(layer["available"].as_array().unwrap().len(), 17);
}

#[tokio::test(flavor = "multi_thread")]
async fn disk_cache_persists_generated_tiles() {
	let fixture = fixture_with(|settings, dir| {
		settings.tile_cache_path = Some(dir.path().join("tile_cache"));
	});
	let uri = format!("/tiles/dynamic/8/263/55.terrain?cog={}", fixture.cog);

	let (status, first) = get(&fixture, &uri).await;
	assert_eq!(status, StatusCode::OK);

	// the write-through is fire-and-forget; give it a moment
	let mut cached: Option<PathBuf> = None;
	for _ in 0..50 {
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		let root = fixture.dir.path().join("tile_cache");
		if let Some(path) = find_terrain_file(&root) {
			cached = Some(path);
			break;
		}
	}
	let cached = cached.expect("tile was written to the disk cache");
	assert_eq!(std::fs::read(&cached).unwrap(), first);
	assert!(cached.ends_with("8/263/55.terrain"));

	// second request is served (from disk) with identical bytes
	let (_, second) = get(&fixture, &uri).await;
	assert_eq!(first, second);
}

fn find_terrain_file(root: &std::path::Path) -> Option<PathBuf> {
	let entries = std::fs::read_dir(root).ok()?;
	for entry in entries.flatten() {
		let path = entry.path();
		if path.is_dir() {
			if let Some(found) = find_terrain_file(&path) {
				return Some(found);
			}
		} else if path.extension().is_some_and(|ext| ext == "terrain") {
			return Some(path);
		}
	}
	None
}

#[tokio::test(flavor = "multi_thread")]
async fn adjacent_tiles_agree_on_their_shared_edge() {
	let fixture = fixture();
	// TMS (9, 524, 401) and (9, 525, 401), both inside the dataset;
	// cesium y = 511 - 401 = 110
	let left = get_tile(
		&fixture,
		&format!("/tiles/dynamic/9/524/110.terrain?cog={}", fixture.cog),
	)
	.await;
	let right = get_tile(
		&fixture,
		&format!("/tiles/dynamic/9/525/110.terrain?cog={}", fixture.cog),
	)
	.await;

	// the terrain only varies with latitude, so both tiles quantize over
	// the same height range and shared-edge heights match bit-exactly
	assert_eq!(left.min_height, right.min_height);
	assert_eq!(left.max_height, right.max_height);
	assert!(!left.east.is_empty());
	for &east_index in &left.east {
		let v = left.v[east_index as usize];
		let west_index = *right
			.west
			.iter()
			.find(|&&index| right.v[index as usize] == v)
			.expect("matching vertex on the neighbor's west edge");
		assert_eq!(
			left.h[east_index as usize],
			right.h[west_index as usize],
			"heights diverge at v={v}"
		);
	}
}
