//! Resampling methods offered when warping a source window to a tile.

use anyhow::{Result, bail};
use std::fmt::{self, Display};
use std::str::FromStr;

/// How a source raster window is resampled onto the tile lattice.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Resampling {
	Nearest,
	#[default]
	Bilinear,
	Cubic,
	CubicSpline,
	Lanczos,
	Average,
	Mode,
	Gauss,
	Rms,
}

impl Resampling {
	pub fn as_str(&self) -> &'static str {
		match self {
			Resampling::Nearest => "nearest",
			Resampling::Bilinear => "bilinear",
			Resampling::Cubic => "cubic",
			Resampling::CubicSpline => "cubic_spline",
			Resampling::Lanczos => "lanczos",
			Resampling::Average => "average",
			Resampling::Mode => "mode",
			Resampling::Gauss => "gauss",
			Resampling::Rms => "rms",
		}
	}
}

impl FromStr for Resampling {
	type Err = anyhow::Error;

	fn from_str(value: &str) -> Result<Self> {
		Ok(match value.to_lowercase().as_str() {
			"nearest" => Resampling::Nearest,
			"bilinear" => Resampling::Bilinear,
			"cubic" => Resampling::Cubic,
			"cubic_spline" => Resampling::CubicSpline,
			"lanczos" => Resampling::Lanczos,
			"average" => Resampling::Average,
			"mode" => Resampling::Mode,
			"gauss" => Resampling::Gauss,
			"rms" => Resampling::Rms,
			_ => bail!("unknown resampling method: \"{value}\""),
		})
	}
}

impl Display for Resampling {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
