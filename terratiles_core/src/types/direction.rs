//! The eight compass directions used to address a tile's neighbors.

/// Direction from a tile towards one of its eight neighbors.
///
/// Offsets are expressed in the TMS convention: north increases y.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
	North,
	NorthEast,
	East,
	SouthEast,
	South,
	SouthWest,
	West,
	NorthWest,
}

impl Direction {
	/// All directions in the canonical N, NE, E, SE, S, SW, W, NW order.
	pub const ALL: [Direction; 8] = [
		Direction::North,
		Direction::NorthEast,
		Direction::East,
		Direction::SouthEast,
		Direction::South,
		Direction::SouthWest,
		Direction::West,
		Direction::NorthWest,
	];

	/// Tile index offset `(dx, dy)` of the neighbor in this direction.
	pub fn offset(&self) -> (i32, i32) {
		match self {
			Direction::North => (0, 1),
			Direction::NorthEast => (1, 1),
			Direction::East => (1, 0),
			Direction::SouthEast => (1, -1),
			Direction::South => (0, -1),
			Direction::SouthWest => (-1, -1),
			Direction::West => (-1, 0),
			Direction::NorthWest => (-1, 1),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn offsets_are_distinct_and_cover_the_ring() {
		let mut seen = std::collections::HashSet::new();
		for dir in Direction::ALL {
			let offset = dir.offset();
			assert_ne!(offset, (0, 0));
			assert!(seen.insert(offset));
		}
		assert_eq!(seen.len(), 8);
	}
}
