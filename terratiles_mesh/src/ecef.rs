//! Geodetic to Earth-Centered Earth-Fixed conversion on the WGS84 ellipsoid.

/// Reference ellipsoid radii in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
	pub a: f64,
	pub b: f64,
}

/// The WGS84 ellipsoid.
pub const WGS84: Ellipsoid = Ellipsoid {
	a: 6378137.0,
	b: 6356752.3142451793,
};

impl Ellipsoid {
	/// First eccentricity squared.
	pub fn e2(&self) -> f64 {
		1.0 - (self.b * self.b) / (self.a * self.a)
	}

	/// Radii along the three ECEF axes.
	pub fn radii(&self) -> [f64; 3] {
		[self.a, self.a, self.b]
	}

	/// Convert one geodetic position (degrees lon/lat, meters height)
	/// to ECEF coordinates.
	pub fn geodetic_to_ecef(&self, lon: f64, lat: f64, height: f64) -> [f64; 3] {
		let lon = lon.to_radians();
		let lat = lat.to_radians();
		let e2 = self.e2();
		let sin_lat = lat.sin();
		let cos_lat = lat.cos();
		let n = self.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
		[
			(n + height) * cos_lat * lon.cos(),
			(n + height) * cos_lat * lon.sin(),
			(n * (1.0 - e2) + height) * sin_lat,
		]
	}
}

/// Convert geographic positions `[lon, lat, height]` to ECEF.
pub fn to_ecef(positions: &[[f64; 3]], ellipsoid: &Ellipsoid) -> Vec<[f64; 3]> {
	positions
		.iter()
		.map(|p| ellipsoid.geodetic_to_ecef(p[0], p[1], p[2]))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn equator_prime_meridian() {
		let p = WGS84.geodetic_to_ecef(0.0, 0.0, 0.0);
		assert_relative_eq!(p[0], 6378137.0);
		assert_relative_eq!(p[1], 0.0, epsilon = 1e-6);
		assert_relative_eq!(p[2], 0.0, epsilon = 1e-6);
	}

	#[test]
	fn north_pole() {
		let p = WGS84.geodetic_to_ecef(0.0, 90.0, 0.0);
		assert_relative_eq!(p[0], 0.0, epsilon = 1e-6);
		assert_relative_eq!(p[2], 6356752.3142451793, epsilon = 1e-6);
	}

	#[test]
	fn height_moves_along_the_normal() {
		let p0 = WGS84.geodetic_to_ecef(0.0, 0.0, 0.0);
		let p100 = WGS84.geodetic_to_ecef(0.0, 0.0, 100.0);
		assert_relative_eq!(p100[0] - p0[0], 100.0, epsilon = 1e-6);
	}
}
