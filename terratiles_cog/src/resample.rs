//! Resampling kernels used to warp a source window onto the tile lattice.

use terratiles_core::Resampling;

/// A rectangular excerpt of one source image, in source pixel space.
///
/// Taps outside the excerpt return `fill` (the nodata sentinel), so
/// tiles reaching over the dataset edge degrade to nodata instead of
/// clamping.
#[derive(Clone, Debug)]
pub struct SourceWindow {
	pub x0: i64,
	pub y0: i64,
	pub width: usize,
	pub height: usize,
	pub data: Vec<f32>,
	pub fill: f32,
}

impl SourceWindow {
	pub fn get(&self, x: i64, y: i64) -> f32 {
		let x = x - self.x0;
		let y = y - self.y0;
		if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
			return self.fill;
		}
		self.data[y as usize * self.width + x as usize]
	}
}

/// Affine mapping from output pixel centers to source pixel coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Warp {
	/// Source pixel coordinates of the center of output pixel (0, 0).
	pub src_x0: f64,
	pub src_y0: f64,
	/// Source pixels advanced per output pixel.
	pub step_x: f64,
	pub step_y: f64,
}

impl Warp {
	fn source_position(&self, col: usize, row: usize) -> (f64, f64) {
		(
			self.src_x0 + self.step_x * col as f64,
			self.src_y0 + self.step_y * row as f64,
		)
	}
}

/// Warp a source window onto an `out_w × out_h` grid with the requested
/// resampling method.
pub fn resample_window(
	window: &SourceWindow,
	warp: &Warp,
	out_w: usize,
	out_h: usize,
	method: Resampling,
) -> Vec<f32> {
	let mut out = Vec::with_capacity(out_w * out_h);
	for row in 0..out_h {
		for col in 0..out_w {
			let (sx, sy) = warp.source_position(col, row);
			out.push(sample(window, sx, sy, warp, method));
		}
	}
	out
}

fn sample(window: &SourceWindow, sx: f64, sy: f64, warp: &Warp, method: Resampling) -> f32 {
	match method {
		Resampling::Nearest => window.get(sx.round() as i64, sy.round() as i64),
		Resampling::Bilinear => bilinear(window, sx, sy),
		Resampling::Cubic => separable(window, sx, sy, 2, catmull_rom),
		Resampling::CubicSpline => separable(window, sx, sy, 2, b_spline),
		Resampling::Lanczos => separable(window, sx, sy, 3, lanczos3),
		Resampling::Average => footprint(window, sx, sy, warp, |values| {
			values.iter().sum::<f64>() / values.len() as f64
		}),
		Resampling::Rms => footprint(window, sx, sy, warp, |values| {
			(values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
		}),
		Resampling::Mode => footprint(window, sx, sy, warp, mode),
		Resampling::Gauss => gauss(window, sx, sy, warp),
	}
}

fn bilinear(window: &SourceWindow, sx: f64, sy: f64) -> f32 {
	let x0 = sx.floor();
	let y0 = sy.floor();
	let fx = sx - x0;
	let fy = sy - y0;
	let x0 = x0 as i64;
	let y0 = y0 as i64;

	let v00 = f64::from(window.get(x0, y0));
	let v10 = f64::from(window.get(x0 + 1, y0));
	let v01 = f64::from(window.get(x0, y0 + 1));
	let v11 = f64::from(window.get(x0 + 1, y0 + 1));

	let top = v00 * (1.0 - fx) + v10 * fx;
	let bottom = v01 * (1.0 - fx) + v11 * fx;
	(top * (1.0 - fy) + bottom * fy) as f32
}

/// Catmull-Rom cubic kernel (GDAL's "cubic").
fn catmull_rom(t: f64) -> f64 {
	let t = t.abs();
	if t < 1.0 {
		1.5 * t * t * t - 2.5 * t * t + 1.0
	} else if t < 2.0 {
		-0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
	} else {
		0.0
	}
}

/// Cubic B-spline kernel (GDAL's "cubicspline").
fn b_spline(t: f64) -> f64 {
	let t = t.abs();
	if t < 1.0 {
		(4.0 + t * t * (3.0 * t - 6.0)) / 6.0
	} else if t < 2.0 {
		let u = 2.0 - t;
		u * u * u / 6.0
	} else {
		0.0
	}
}

fn lanczos3(t: f64) -> f64 {
	let t = t.abs();
	if t < 1e-12 {
		return 1.0;
	}
	if t >= 3.0 {
		return 0.0;
	}
	let pi_t = std::f64::consts::PI * t;
	3.0 * (pi_t.sin() * (pi_t / 3.0).sin()) / (pi_t * pi_t)
}

/// Separable convolution with a kernel of the given radius.
fn separable(
	window: &SourceWindow,
	sx: f64,
	sy: f64,
	radius: i64,
	kernel: fn(f64) -> f64,
) -> f32 {
	let x0 = sx.floor() as i64;
	let y0 = sy.floor() as i64;
	let mut sum = 0.0f64;
	let mut weight_sum = 0.0f64;
	for dy in (1 - radius)..=radius {
		let y = y0 + dy;
		let wy = kernel(sy - y as f64);
		if wy == 0.0 {
			continue;
		}
		for dx in (1 - radius)..=radius {
			let x = x0 + dx;
			let wx = kernel(sx - x as f64);
			if wx == 0.0 {
				continue;
			}
			sum += f64::from(window.get(x, y)) * wx * wy;
			weight_sum += wx * wy;
		}
	}
	if weight_sum == 0.0 {
		return window.get(sx.round() as i64, sy.round() as i64);
	}
	(sum / weight_sum) as f32
}

/// Collect the source pixels under one output pixel and reduce them.
///
/// Falls back to nearest when the footprint covers no pixel center
/// (upsampling).
fn footprint(
	window: &SourceWindow,
	sx: f64,
	sy: f64,
	warp: &Warp,
	reduce: impl Fn(&[f64]) -> f64,
) -> f32 {
	let half_x = (warp.step_x.abs() / 2.0).max(0.0);
	let half_y = (warp.step_y.abs() / 2.0).max(0.0);
	let mut values = Vec::new();
	let x_min = (sx - half_x).ceil() as i64;
	let x_max = (sx + half_x).floor() as i64;
	let y_min = (sy - half_y).ceil() as i64;
	let y_max = (sy + half_y).floor() as i64;
	for y in y_min..=y_max {
		for x in x_min..=x_max {
			values.push(f64::from(window.get(x, y)));
		}
	}
	if values.is_empty() {
		return window.get(sx.round() as i64, sy.round() as i64);
	}
	reduce(&values) as f32
}

fn mode(values: &[f64]) -> f64 {
	let mut counts: Vec<(u64, usize)> = Vec::new();
	for &value in values {
		let key = value.to_bits();
		match counts.iter_mut().find(|(k, _)| *k == key) {
			Some((_, count)) => *count += 1,
			None => counts.push((key, 1)),
		}
	}
	let (key, _) = counts
		.iter()
		.max_by_key(|(_, count)| *count)
		.expect("mode of a non-empty slice");
	f64::from_bits(*key)
}

fn gauss(window: &SourceWindow, sx: f64, sy: f64, warp: &Warp) -> f32 {
	let sigma = (warp.step_x.abs().max(warp.step_y.abs()) / 2.0).max(0.5);
	let radius = (2.0 * sigma).ceil() as i64;
	let x0 = sx.round() as i64;
	let y0 = sy.round() as i64;
	let mut sum = 0.0f64;
	let mut weight_sum = 0.0f64;
	for dy in -radius..=radius {
		for dx in -radius..=radius {
			let x = x0 + dx;
			let y = y0 + dy;
			let ddx = sx - x as f64;
			let ddy = sy - y as f64;
			let weight = (-(ddx * ddx + ddy * ddy) / (2.0 * sigma * sigma)).exp();
			sum += f64::from(window.get(x, y)) * weight;
			weight_sum += weight;
		}
	}
	(sum / weight_sum) as f32
}
