//! Helpers for writing small GeoTIFF fixtures in tests.

use anyhow::Result;
use std::fs::File;
use std::path::Path;
use terratiles_core::GeoBBox;
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

/// Write a single-band float GeoTIFF with pixel-scale/tie-point
/// georeferencing and an optional GDAL nodata tag.
///
/// `height_fn(x, y)` produces the sample for pixel column `x`, row `y`
/// (top-origin, like the raster itself).
pub fn write_test_cog(
	path: &Path,
	width: u32,
	height: u32,
	bounds: GeoBBox,
	nodata: Option<f64>,
	height_fn: impl Fn(u32, u32) -> f32,
) -> Result<()> {
	let mut data = Vec::with_capacity((width * height) as usize);
	for y in 0..height {
		for x in 0..width {
			data.push(height_fn(x, y));
		}
	}

	let scale_x = bounds.width() / f64::from(width);
	let scale_y = bounds.height() / f64::from(height);

	let file = File::create(path)?;
	let mut encoder = TiffEncoder::new(file)?;
	let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
	image
		.encoder()
		.write_tag(Tag::ModelPixelScaleTag, &[scale_x, scale_y, 0.0][..])?;
	image.encoder().write_tag(
		Tag::ModelTiepointTag,
		&[0.0, 0.0, 0.0, bounds.x_min, bounds.y_max, 0.0][..],
	)?;
	if let Some(nodata) = nodata {
		image.encoder().write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
	}
	image.write_data(&data)?;
	Ok(())
}

/// Write a mosaic definition JSON next to its children.
pub fn write_test_mosaic(path: &Path, extent: GeoBBox, children: &[(String, GeoBBox)]) -> Result<()> {
	let datasets: Vec<serde_json::Value> = children
		.iter()
		.map(|(child_path, child_extent)| {
			serde_json::json!({
				"path": child_path,
				"extent": child_extent.as_array(),
			})
		})
		.collect();
	let definition = serde_json::json!({
		"extent": extent.as_array(),
		"datasets": datasets,
	});
	std::fs::write(path, serde_json::to_vec_pretty(&definition)?)?;
	Ok(())
}
