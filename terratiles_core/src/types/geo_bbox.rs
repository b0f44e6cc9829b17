//! A geographic bounding box in degrees.

use anyhow::{Result, ensure};
use std::fmt::{self, Debug};

/// A geographic bounding box defined by minimum and maximum
/// longitude (x) and latitude (y) in degrees.
#[derive(Clone, Copy, PartialEq)]
pub struct GeoBBox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl GeoBBox {
	pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<GeoBBox> {
		ensure!(x_min <= x_max, "x_min ({x_min}) must be <= x_max ({x_max})");
		ensure!(y_min <= y_max, "y_min ({y_min}) must be <= y_max ({y_max})");
		Ok(GeoBBox {
			x_min,
			y_min,
			x_max,
			y_max,
		})
	}

	/// Build from a `[minx, miny, maxx, maxy]` array, e.g. mosaic extents.
	pub fn from_array(bounds: &[f64]) -> Result<GeoBBox> {
		ensure!(bounds.len() == 4, "bounds must have 4 entries, got {}", bounds.len());
		GeoBBox::new(bounds[0], bounds[1], bounds[2], bounds[3])
	}

	pub fn as_array(&self) -> [f64; 4] {
		[self.x_min, self.y_min, self.x_max, self.y_max]
	}

	pub fn width(&self) -> f64 {
		self.x_max - self.x_min
	}

	pub fn height(&self) -> f64 {
		self.y_max - self.y_min
	}

	/// True if the two boxes share any area or touch.
	///
	/// Tests for separation and exits early instead of testing containment.
	pub fn intersects(&self, other: &GeoBBox) -> bool {
		!(self.x_min > other.x_max
			|| self.x_max < other.x_min
			|| self.y_min > other.y_max
			|| self.y_max < other.y_min)
	}
}

impl Debug for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!(
			"GeoBBox({}, {}, {}, {})",
			&self.x_min, &self.y_min, &self.x_max, &self.y_max
		))
	}
}
