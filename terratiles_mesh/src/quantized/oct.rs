//! Oct-encoding of unit vectors: two snorm bytes per normal.

fn sign_not_zero(value: f64) -> f64 {
	if value < 0.0 { -1.0 } else { 1.0 }
}

fn to_snorm(value: f64) -> u8 {
	((value.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8
}

fn from_snorm(value: u8) -> f64 {
	f64::from(value) / 255.0 * 2.0 - 1.0
}

/// Project a unit vector onto the octahedron and store it in two bytes.
///
/// Degenerate (near-zero) vectors encode as straight up.
pub fn oct_encode(normal: [f64; 3]) -> [u8; 2] {
	let sum = normal[0].abs() + normal[1].abs() + normal[2].abs();
	if sum < 1e-12 {
		return oct_encode([0.0, 0.0, 1.0]);
	}
	let mut x = normal[0] / sum;
	let mut y = normal[1] / sum;
	if normal[2] < 0.0 {
		let old_x = x;
		x = (1.0 - y.abs()) * sign_not_zero(old_x);
		y = (1.0 - old_x.abs()) * sign_not_zero(y);
	}
	[to_snorm(x), to_snorm(y)]
}

/// Invert [`oct_encode`], returning a unit vector.
pub fn oct_decode(encoded: [u8; 2]) -> [f64; 3] {
	let mut x = from_snorm(encoded[0]);
	let mut y = from_snorm(encoded[1]);
	let z = 1.0 - x.abs() - y.abs();
	if z < 0.0 {
		let old_x = x;
		x = (1.0 - y.abs()) * sign_not_zero(old_x);
		y = (1.0 - old_x.abs()) * sign_not_zero(y);
	}
	let length = (x * x + y * y + z * z).sqrt();
	[x / length, y / length, z / length]
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
		a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
	}

	#[rstest]
	#[case([0.0, 0.0, 1.0])]
	#[case([0.0, 0.0, -1.0])]
	#[case([1.0, 0.0, 0.0])]
	#[case([0.0, -1.0, 0.0])]
	#[case([0.5773502691896258, 0.5773502691896258, 0.5773502691896258])]
	#[case([-0.2672612419124244, 0.5345224838248488, -0.8017837257372732])]
	fn round_trip_is_close(#[case] normal: [f64; 3]) {
		let decoded = oct_decode(oct_encode(normal));
		// one byte per component; ~1 degree of angular precision
		assert!(dot(normal, decoded) > 0.999, "{normal:?} -> {decoded:?}");
	}

	#[test]
	fn zero_vector_encodes_as_up() {
		assert_eq!(oct_encode([0.0, 0.0, 0.0]), oct_encode([0.0, 0.0, 1.0]));
	}
}
