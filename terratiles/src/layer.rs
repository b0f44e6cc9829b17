//! layer.json generation for Cesium terrain providers.

use anyhow::Result;
use serde_json::{Value, json};
use terratiles_core::{GeoBBox, TileCoord};

/// Nudge applied at dataset edges so a bound lying exactly on a tile
/// border does not claim the next tile over.
const EDGE_EPSILON: f64 = 1e-11;

/// Build the layer.json document for one dataset.
///
/// `tile_query` is appended to the tile URL template (empty for named
/// datasets, `&cog=…` for dynamic requests). `available` lists one tile
/// range per zoom with y already flipped to Cesium's wire convention;
/// zoom 0 always advertises both root tiles because Cesium expects them
/// regardless of coverage.
pub fn generate_layer_json(
	bounds: GeoBBox,
	max_zoom: u8,
	tile_query: &str,
) -> Result<Value> {
	let mut available = vec![json!([{ "startX": 0, "startY": 0, "endX": 1, "endY": 0 }])];
	for zoom in 1..=max_zoom {
		available.push(json!([available_range(bounds, zoom)]));
	}

	Ok(json!({
		"tilejson": "2.1.0",
		"name": "Terratiles",
		"description": "On-demand Cesium quantized-mesh terrain",
		"version": "1.1.0",
		"format": "quantized-mesh-1.0",
		"attribution": "",
		"schema": "tms",
		"extensions": ["octvertexnormals"],
		"tiles": [format!("{{z}}/{{x}}/{{y}}.terrain?v={{version}}{tile_query}")],
		"projection": "EPSG:4326",
		"bounds": [0.0, -90.0, 180.0, 90.0],
		"cogBounds": bounds.as_array(),
		"minzoom": 0,
		"maxzoom": max_zoom,
		"available": available,
	}))
}

/// The Cesium-convention tile index range covering `bounds` at a zoom.
fn available_range(bounds: GeoBBox, zoom: u8) -> Value {
	let span = TileCoord::tile_span(zoom);
	let max_x = f64::from(TileCoord::max_x(zoom) - 1);
	let max_y = f64::from(TileCoord::max_y(zoom) - 1);

	let tile_at = |value: f64, origin: f64, max: f64| -> u32 {
		(((value - origin) / span).floor().clamp(0.0, max)) as u32
	};

	let start_x = tile_at(bounds.x_min + EDGE_EPSILON, -180.0, max_x);
	let end_x = tile_at(bounds.x_max - EDGE_EPSILON, -180.0, max_x);
	// TMS rows, then flipped for Cesium
	let south_row = tile_at(bounds.y_min + EDGE_EPSILON, -90.0, max_y);
	let north_row = tile_at(bounds.y_max - EDGE_EPSILON, -90.0, max_y);
	let flip = TileCoord::max_y(zoom) - 1;

	json!({
		"startX": start_x,
		"startY": flip - north_row,
		"endX": end_x,
		"endY": flip - south_row,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn bounds() -> GeoBBox {
		GeoBBox::new(4.0, 50.0, 6.0, 52.0).unwrap()
	}

	#[test]
	fn document_shape() {
		let layer = generate_layer_json(bounds(), 4, "&cog=/data/alps.tif").unwrap();
		assert_eq!(layer["format"], "quantized-mesh-1.0");
		assert_eq!(layer["schema"], "tms");
		assert_eq!(layer["projection"], "EPSG:4326");
		assert_eq!(layer["extensions"], json!(["octvertexnormals"]));
		assert_eq!(
			layer["tiles"],
			json!(["{z}/{x}/{y}.terrain?v={version}&cog=/data/alps.tif"])
		);
		assert_eq!(layer["bounds"], json!([0.0, -90.0, 180.0, 90.0]));
		assert_eq!(layer["cogBounds"], json!([4.0, 50.0, 6.0, 52.0]));
		assert_eq!(layer["available"].as_array().unwrap().len(), 5);
	}

	#[test]
	fn zoom_zero_advertises_both_root_tiles() {
		let layer = generate_layer_json(bounds(), 2, "").unwrap();
		assert_eq!(
			layer["available"][0],
			json!([{ "startX": 0, "startY": 0, "endX": 1, "endY": 0 }])
		);
	}

	#[test]
	fn ranges_cover_the_dataset() {
		// z=1: span 90°, 4x2 tiles; [4,50..6,52] sits in tile x=2, TMS y=1
		let layer = generate_layer_json(bounds(), 1, "").unwrap();
		assert_eq!(
			layer["available"][1],
			json!([{ "startX": 2, "startY": 0, "endX": 2, "endY": 0 }])
		);
	}

	#[test]
	fn y_axis_is_flipped_for_cesium() {
		// z=2: span 45°; lat [50, 52] is TMS row 3 of 4 -> cesium row 0
		let layer = generate_layer_json(bounds(), 2, "").unwrap();
		let range = &layer["available"][2][0];
		assert_eq!(range["startY"], 0);
		assert_eq!(range["endY"], 0);
		// lon [4, 6] is column 4 of 8
		assert_eq!(range["startX"], 4);
		assert_eq!(range["endX"], 4);
	}

	#[test]
	fn edge_aligned_bounds_stay_in_their_tile() {
		// a dataset ending exactly on a tile border at z=1 (90°): [0,-90,90,0]
		let aligned = GeoBBox::new(0.0, -90.0, 90.0, 0.0).unwrap();
		let layer = generate_layer_json(aligned, 1, "").unwrap();
		assert_eq!(
			layer["available"][1],
			json!([{ "startX": 2, "startY": 1, "endX": 2, "endY": 1 }])
		);
	}
}
