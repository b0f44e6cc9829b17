//! Reading tile windows out of a Cloud-Optimized GeoTIFF.

use crate::resample::{SourceWindow, Warp, resample_window};
use anyhow::{Context, Result, bail, ensure};
use std::fs::File;
use std::io::BufReader;
use terratiles_core::{GeoBBox, Heightmap, MAX_ZOOM, Resampling, TILE_SIZE, TileCoord};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

/// Tiles are refused below the safe level when a read would need more
/// than this many downsampled chunks.
const SAFE_CHUNK_BUDGET: f64 = 4.0;

/// Static facts about an opened dataset.
#[derive(Clone, Debug)]
pub struct CogInfo {
	pub bounds: GeoBBox,
	pub width: u32,
	pub height: u32,
	/// Downsampling factors of the overview images, base image excluded.
	pub overview_factors: Vec<u32>,
	pub nodata: Option<f64>,
}

#[derive(Clone, Copy, Debug)]
struct ImageLevel {
	ifd: usize,
	width: u32,
	height: u32,
}

/// A reader for one Cloud-Optimized GeoTIFF.
///
/// Opening parses the IFD chain once (georeferencing, overview levels,
/// nodata) and computes the safe zoom level. Readers are meant to be
/// pooled: see [`crate::CogReaderPool`].
pub struct CogReader {
	source: String,
	decoder: Decoder<BufReader<File>>,
	info: CogInfo,
	levels: Vec<ImageLevel>,
	safe_level: u8,
	unsafe_reads: bool,
}

impl CogReader {
	/// Open a GeoTIFF and parse its structure. Blocking.
	pub fn open(source: &str, unsafe_reads: bool) -> Result<CogReader> {
		let file = File::open(source).with_context(|| format!("opening {source}"))?;
		let mut decoder = Decoder::new(BufReader::new(file))
			.with_context(|| format!("parsing {source} as TIFF"))?
			.with_limits(Limits::unlimited());

		let (width, height) = decoder.dimensions()?;

		let scale = decoder
			.get_tag_f64_vec(Tag::ModelPixelScaleTag)
			.with_context(|| format!("{source} has no ModelPixelScale tag"))?;
		ensure!(scale.len() >= 2, "ModelPixelScale needs at least 2 values");
		let (scale_x, scale_y) = (scale[0], scale[1].abs());

		let tie = decoder
			.get_tag_f64_vec(Tag::ModelTiepointTag)
			.with_context(|| format!("{source} has no ModelTiepoint tag"))?;
		ensure!(tie.len() >= 6, "ModelTiepoint needs at least 6 values");
		let origin_x = tie[3] - tie[0] * scale_x;
		let origin_y = tie[4] + tie[1] * scale_y;

		let bounds = GeoBBox::new(
			origin_x,
			origin_y - f64::from(height) * scale_y,
			origin_x + f64::from(width) * scale_x,
			origin_y,
		)?;

		let nodata = decoder
			.get_tag_ascii_string(Tag::GdalNodata)
			.ok()
			.and_then(|text| text.trim().parse::<f64>().ok());

		// walk the IFD chain: reduced-resolution subfiles are overviews
		let mut levels = vec![ImageLevel { ifd: 0, width, height }];
		let mut overview_factors = Vec::new();
		let mut ifd = 1;
		while decoder.seek_to_image(ifd).is_ok() {
			let (w, h) = decoder.dimensions()?;
			levels.push(ImageLevel { ifd, width: w, height: h });
			overview_factors.push((f64::from(width) / f64::from(w)).round() as u32);
			ifd += 1;
		}
		decoder.seek_to_image(0)?;

		let info = CogInfo {
			bounds,
			width,
			height,
			overview_factors,
			nodata,
		};
		let safe_level = compute_safe_level(&info);

		Ok(CogReader {
			source: source.to_string(),
			decoder,
			info,
			levels,
			safe_level,
			unsafe_reads,
		})
	}

	pub fn info(&self) -> &CogInfo {
		&self.info
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	/// The minimum zoom at which a tile read stays within the chunk
	/// budget of the coarsest overview.
	pub fn safe_level(&self) -> u8 {
		self.safe_level
	}

	/// True iff the tile overlaps the dataset bounds.
	pub fn tile_exists(&self, coord: TileCoord) -> bool {
		coord.geo_bbox().intersects(&self.info.bounds)
	}

	/// Crop and resample the source for one tile. Blocking.
	///
	/// Returns a `(256 + 2·buffer)²` heightmap with nodata rewritten to
	/// `nodata_fill`, or `None` when the tile has no coverage, the zoom
	/// is below the safe level, or the read fails (failures are logged
	/// and swallowed so terrain rendering degrades to empty tiles).
	pub fn read_tile(
		&mut self,
		coord: TileCoord,
		resampling: Resampling,
		buffer: f64,
		nodata_fill: f32,
	) -> Option<Heightmap> {
		if !self.tile_exists(coord) {
			return None;
		}

		if coord.z < self.safe_level {
			if self.unsafe_reads {
				log::warn!(
					"loading unsafe tile {} {coord}, consider generating more overviews",
					self.source
				);
			} else {
				log::warn!(
					"skipping unsafe tile {} {coord}, generate more overviews or run with --unsafe to load anyway",
					self.source
				);
				return None;
			}
		}

		match self.read_tile_inner(coord, resampling, buffer, nodata_fill) {
			Ok(heights) => Some(heights),
			Err(error) => {
				log::warn!("failed to read {} {coord}: {error:#}", self.source);
				None
			}
		}
	}

	fn read_tile_inner(
		&mut self,
		coord: TileCoord,
		resampling: Resampling,
		buffer: f64,
		nodata_fill: f32,
	) -> Result<Heightmap> {
		let out_size = TILE_SIZE + (2.0 * buffer).round() as usize;
		let tile_bbox = coord.geo_bbox();
		let out_step = tile_bbox.width() / TILE_SIZE as f64;
		let window = GeoBBox {
			x_min: tile_bbox.x_min - buffer * out_step,
			y_min: tile_bbox.y_min - buffer * out_step,
			x_max: tile_bbox.x_max + buffer * out_step,
			y_max: tile_bbox.y_max + buffer * out_step,
		};

		let level = self.pick_level(window.width() / out_size as f64);
		self.decoder.seek_to_image(level.ifd)?;

		let src_step_x = self.info.bounds.width() / f64::from(level.width);
		let src_step_y = self.info.bounds.height() / f64::from(level.height);

		// source pixel coordinates of the first output pixel center
		let first_x = window.x_min + out_step / 2.0;
		let first_y = window.y_max - out_step / 2.0;
		let warp = Warp {
			src_x0: (first_x - self.info.bounds.x_min) / src_step_x - 0.5,
			src_y0: (self.info.bounds.y_max - first_y) / src_step_y - 0.5,
			step_x: out_step / src_step_x,
			step_y: out_step / src_step_y,
		};

		let sentinel = self.info.nodata.map_or(f32::NAN, |v| v as f32);

		let margin = 3.0_f64.max(warp.step_x / 2.0 + 1.0).max(warp.step_y / 2.0 + 1.0);
		let x_lo = ((warp.src_x0 - margin).floor() as i64).max(0);
		let x_hi = ((warp.src_x0 + warp.step_x * (out_size - 1) as f64 + margin).ceil() as i64)
			.min(i64::from(level.width) - 1);
		let y_lo = ((warp.src_y0 - margin).floor() as i64).max(0);
		let y_hi = ((warp.src_y0 + warp.step_y * (out_size - 1) as f64 + margin).ceil() as i64)
			.min(i64::from(level.height) - 1);
		ensure!(x_lo <= x_hi && y_lo <= y_hi, "window does not touch the dataset");

		let source = self.read_window(level, x_lo, y_lo, x_hi, y_hi, sentinel)?;

		let mut data = resample_window(&source, &warp, out_size, out_size, resampling);
		for value in &mut data {
			if value.is_nan() || *value == sentinel {
				*value = nodata_fill;
			}
		}

		Heightmap::new(out_size, out_size, data)
	}

	/// The coarsest image level that still resolves the requested
	/// degrees-per-pixel.
	fn pick_level(&self, required: f64) -> ImageLevel {
		let mut best = self.levels[0];
		let mut best_step = self.info.bounds.width() / f64::from(best.width);
		for level in &self.levels[1..] {
			let step = self.info.bounds.width() / f64::from(level.width);
			if step <= required && step > best_step {
				best = *level;
				best_step = step;
			}
		}
		best
	}

	/// Read a rectangle of source pixels (inclusive bounds) from the
	/// currently seeked image into a [`SourceWindow`].
	fn read_window(
		&mut self,
		level: ImageLevel,
		x_lo: i64,
		y_lo: i64,
		x_hi: i64,
		y_hi: i64,
		fill: f32,
	) -> Result<SourceWindow> {
		let width = (x_hi - x_lo + 1) as usize;
		let height = (y_hi - y_lo + 1) as usize;
		let mut data = vec![fill; width * height];

		let (chunk_w, chunk_h) = self.decoder.chunk_dimensions();
		let chunks_across = (level.width + chunk_w - 1) / chunk_w;

		let chunk_x_lo = x_lo as u32 / chunk_w;
		let chunk_x_hi = x_hi as u32 / chunk_w;
		let chunk_y_lo = y_lo as u32 / chunk_h;
		let chunk_y_hi = y_hi as u32 / chunk_h;

		for chunk_y in chunk_y_lo..=chunk_y_hi {
			for chunk_x in chunk_x_lo..=chunk_x_hi {
				let index = chunk_y * chunks_across + chunk_x;
				let samples = decode_samples(self.decoder.read_chunk(index)?)?;
				let (data_w, data_h) = self.decoder.chunk_data_dimensions(index);

				let origin_x = i64::from(chunk_x * chunk_w);
				let origin_y = i64::from(chunk_y * chunk_h);
				for row in 0..i64::from(data_h) {
					let src_y = origin_y + row;
					if src_y < y_lo || src_y > y_hi {
						continue;
					}
					for col in 0..i64::from(data_w) {
						let src_x = origin_x + col;
						if src_x < x_lo || src_x > x_hi {
							continue;
						}
						let value = samples[(row * i64::from(data_w) + col) as usize];
						data[((src_y - y_lo) as usize) * width + (src_x - x_lo) as usize] = value;
					}
				}
			}
		}

		Ok(SourceWindow {
			x0: x_lo,
			y0: y_lo,
			width,
			height,
			data,
			fill,
		})
	}
}

/// First band of a decoded chunk as `f32` samples.
fn decode_samples(result: DecodingResult) -> Result<Vec<f32>> {
	Ok(match result {
		DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
		DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
		DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
		DecodingResult::U64(v) => v.into_iter().map(|s| s as f32).collect(),
		DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
		DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
		DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
		DecodingResult::I64(v) => v.into_iter().map(|s| s as f32).collect(),
		DecodingResult::F32(v) => v,
		DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
		_ => bail!("unsupported TIFF sample format"),
	})
}

/// The lowest zoom at which one tile read needs at most
/// [`SAFE_CHUNK_BUDGET`] chunks of the coarsest overview.
///
/// This is an estimate: sources with few overviews would otherwise force
/// reading most of the dataset for low-zoom tiles.
fn compute_safe_level(info: &CogInfo) -> u8 {
	let pixels_per_degree = f64::from(info.width) / info.bounds.width();
	let max_factor = info.overview_factors.iter().copied().max().unwrap_or(1);
	let pixels_per_downsampled_chunk = f64::from(256 * max_factor);

	for z in 0..=MAX_ZOOM {
		let span = TileCoord::tile_span(z).min(info.bounds.width());
		let pixels_needed = span * pixels_per_degree;
		let chunks_needed = (pixels_needed / pixels_per_downsampled_chunk).ceil();
		if chunks_needed <= SAFE_CHUNK_BUDGET {
			return z;
		}
	}
	MAX_ZOOM
}

/// Open a reader just long enough to answer `info()`.
pub fn probe_cog(source: &str) -> Result<CogInfo> {
	CogReader::open(source, true).map(|reader| reader.info().clone())
}
