//! Greedy max-error TIN refinement over a heightmap.
//!
//! Starts from the two corner triangles and repeatedly inserts the pixel
//! with the largest vertical error into a Delaunay triangulation until
//! every pixel is approximated within `max_error` meters. Vertices are
//! integer pixel coordinates (bottom-origin y) carrying their exact
//! sample heights.

use anyhow::{Result, anyhow};
use spade::{DelaunayTriangulation, Point2, Triangulation};
use std::collections::{HashMap, HashSet};
use terratiles_core::{Heightmap, Mesh};

/// Build a TIN approximating `heights` within `max_error` meters.
pub fn delatin_mesh(heights: &Heightmap, max_error: f64) -> Result<Mesh> {
	let x_max = (heights.width() - 1) as u32;
	let y_max = (heights.height() - 1) as u32;

	let mut points: Vec<[f64; 3]> = Vec::new();
	let mut used: HashSet<(u32, u32)> = HashSet::new();
	let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();

	let insert = |points: &mut Vec<[f64; 3]>,
	              used: &mut HashSet<(u32, u32)>,
	              triangulation: &mut DelaunayTriangulation<Point2<f64>>,
	              x: u32,
	              y: u32|
	 -> Result<()> {
		let z = f64::from(heights.sample(f64::from(x), f64::from(y)));
		points.push([f64::from(x), f64::from(y), z]);
		used.insert((x, y));
		triangulation
			.insert(Point2::new(f64::from(x), f64::from(y)))
			.map_err(|e| anyhow!("degenerate TIN insertion at ({x}, {y}): {e:?}"))?;
		Ok(())
	};

	for (x, y) in [(0, 0), (x_max, 0), (0, y_max), (x_max, y_max)] {
		insert(&mut points, &mut used, &mut triangulation, x, y)?;
	}

	// candidate errors memoized per face so only faces changed by an
	// insertion get rescanned
	let mut candidates: HashMap<[usize; 3], (f64, (u32, u32))> = HashMap::new();
	let max_points = heights.width() * heights.height();

	while used.len() < max_points {
		let mut best_error = 0.0f64;
		let mut best_candidate: Option<(u32, u32)> = None;

		for face in triangulation.inner_faces() {
			let handles = face.vertices();
			let mut key = [
				handles[0].fix().index(),
				handles[1].fix().index(),
				handles[2].fix().index(),
			];
			key.sort_unstable();

			let (error, candidate) = *candidates
				.entry(key)
				.or_insert_with(|| scan_triangle(heights, &points, &key, &used));

			if error > best_error {
				best_error = error;
				best_candidate = Some(candidate);
			}
		}

		if best_error <= max_error {
			break;
		}
		let (x, y) = best_candidate.expect("a positive error always has a candidate");
		insert(&mut points, &mut used, &mut triangulation, x, y)?;
	}

	let triangles = triangulation
		.inner_faces()
		.map(|face| {
			let handles = face.vertices();
			[
				handles[0].fix().index() as u32,
				handles[1].fix().index() as u32,
				handles[2].fix().index() as u32,
			]
		})
		.collect();

	Ok(Mesh::new(points, triangles))
}

/// Find the in-triangle pixel with the largest deviation from the plane
/// through the triangle's three vertices.
fn scan_triangle(
	heights: &Heightmap,
	points: &[[f64; 3]],
	key: &[usize; 3],
	used: &HashSet<(u32, u32)>,
) -> (f64, (u32, u32)) {
	let a = points[key[0]];
	let b = points[key[1]];
	let c = points[key[2]];

	let area2 = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
	if area2 == 0.0 {
		return (0.0, (a[0] as u32, a[1] as u32));
	}

	let min_x = a[0].min(b[0]).min(c[0]) as u32;
	let max_x = a[0].max(b[0]).max(c[0]) as u32;
	let min_y = a[1].min(b[1]).min(c[1]) as u32;
	let max_y = a[1].max(b[1]).max(c[1]) as u32;

	let mut best = (0.0f64, (min_x, min_y));
	for y in min_y..=max_y {
		for x in min_x..=max_x {
			if used.contains(&(x, y)) {
				continue;
			}
			let px = f64::from(x);
			let py = f64::from(y);
			let w0 = (b[0] - px) * (c[1] - py) - (b[1] - py) * (c[0] - px);
			let w1 = (c[0] - px) * (a[1] - py) - (c[1] - py) * (a[0] - px);
			let w2 = (a[0] - px) * (b[1] - py) - (a[1] - py) * (b[0] - px);
			// samples strictly outside the triangle have a weight with the
			// opposite sign of the doubled area
			if w0 * area2 < 0.0 || w1 * area2 < 0.0 || w2 * area2 < 0.0 {
				continue;
			}
			let interpolated = (w0 * a[2] + w1 * b[2] + w2 * c[2]) / area2;
			let error = (f64::from(heights.sample(px, py)) - interpolated).abs();
			if error > best.0 {
				best = (error, (x, y));
			}
		}
	}
	best
}
