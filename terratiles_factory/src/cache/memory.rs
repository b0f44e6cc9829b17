//! In-memory cache backend.

use super::CacheBackend;
use crate::SourceTilePayload;
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// HashMap-backed store. Simple and fast; large raw height blobs can
/// fragment the allocator under churn, which is what the sqlite backend
/// is for.
#[derive(Default)]
pub struct MemoryBackend {
	entries: Mutex<HashMap<String, (SourceTilePayload, Instant)>>,
}

impl MemoryBackend {
	pub fn new() -> MemoryBackend {
		MemoryBackend::default()
	}
}

impl CacheBackend for MemoryBackend {
	fn get(&self, keys: &[String]) -> Result<HashMap<String, SourceTilePayload>> {
		let entries = self.entries.lock();
		Ok(
			keys
				.iter()
				.filter_map(|key| entries.get(key).map(|(payload, _)| (key.clone(), payload.clone())))
				.collect(),
		)
	}

	fn insert(&self, batch: &[(String, SourceTilePayload)]) -> Result<()> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		for (key, payload) in batch {
			entries.insert(key.clone(), (payload.clone(), now));
		}
		Ok(())
	}

	fn clear_expired(&self, ttl: Duration, keep: &HashSet<String>) -> Result<Vec<String>> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		let expired: Vec<String> = entries
			.iter()
			.filter(|(key, (_, inserted))| now.duration_since(*inserted) >= ttl && !keep.contains(*key))
			.map(|(key, _)| key.clone())
			.collect();
		for key in &expired {
			entries.remove(key);
		}
		Ok(expired)
	}

	fn len(&self) -> Result<usize> {
		Ok(self.entries.lock().len())
	}
}
