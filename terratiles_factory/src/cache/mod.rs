//! The source-tile cache: batched admission over a pluggable backend.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::{SourceTileKey, SourceTilePayload};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Storage behind the cache. Implementations are blocking and are always
/// called from the blocking thread pool.
pub trait CacheBackend: Send + Sync {
	fn get(&self, keys: &[String]) -> Result<HashMap<String, SourceTilePayload>>;
	/// Insert-or-replace a batch, stamping the current time.
	fn insert(&self, entries: &[(String, SourceTilePayload)]) -> Result<()>;
	/// Delete entries older than `ttl` whose key is not in `keep`;
	/// returns the deleted keys.
	fn clear_expired(&self, ttl: Duration, keep: &HashSet<String>) -> Result<Vec<String>>;
	fn len(&self) -> Result<usize>;
}

#[derive(Default)]
struct AdmissionState {
	queue: Vec<(SourceTileKey, SourceTilePayload)>,
	committing: bool,
}

/// The factory's source-tile cache.
///
/// Writes arrive in bursts (nine source-tile completions per terrain
/// request), so admissions are batched: one writer commits at a time and
/// everything added meanwhile buffers into the next batch. After each
/// batch commits, one `changed` event carries the union of its keys.
/// A key listed by `contains` is therefore always readable via `get`.
pub struct FactoryCache {
	backend: Arc<dyn CacheBackend>,
	ttl: Duration,
	known: Mutex<HashSet<SourceTileKey>>,
	admission: Mutex<AdmissionState>,
	changed_tx: mpsc::UnboundedSender<Vec<SourceTileKey>>,
}

impl FactoryCache {
	/// Wrap a backend; the receiver yields one event per committed batch.
	pub fn new(
		backend: Arc<dyn CacheBackend>,
		ttl: Duration,
	) -> (Arc<FactoryCache>, mpsc::UnboundedReceiver<Vec<SourceTileKey>>) {
		let (changed_tx, changed_rx) = mpsc::unbounded_channel();
		let cache = Arc::new(FactoryCache {
			backend,
			ttl,
			known: Mutex::new(HashSet::new()),
			admission: Mutex::new(AdmissionState::default()),
			changed_tx,
		});
		(cache, changed_rx)
	}

	/// Fast membership test against the in-memory key index.
	pub fn contains(&self, key: &SourceTileKey) -> bool {
		self.known.lock().contains(key)
	}

	/// True when every key is present.
	pub fn contains_all<'a>(&self, keys: impl IntoIterator<Item = &'a SourceTileKey>) -> bool {
		let known = self.known.lock();
		keys.into_iter().all(|key| known.contains(key))
	}

	pub fn known_count(&self) -> usize {
		self.known.lock().len()
	}

	/// Insert-or-replace one payload through the batching writer.
	///
	/// Returns once the payload is buffered; the commit that makes it
	/// visible fires a `changed` event carrying its key.
	pub async fn add(&self, key: SourceTileKey, payload: SourceTilePayload) {
		let commit_here = {
			let mut admission = self.admission.lock();
			admission.queue.push((key, payload));
			if admission.committing {
				false
			} else {
				admission.committing = true;
				true
			}
		};
		if commit_here {
			self.commit_batches().await;
		}
	}

	/// Drain the admission queue batch by batch. An `add` racing a
	/// commit lands in the queue and is picked up by the next loop turn.
	async fn commit_batches(&self) {
		loop {
			let batch = {
				let mut admission = self.admission.lock();
				if admission.queue.is_empty() {
					admission.committing = false;
					return;
				}
				std::mem::take(&mut admission.queue)
			};

			let entries: Vec<(String, SourceTilePayload)> = batch
				.iter()
				.map(|(key, payload)| (key.as_cache_key(), payload.clone()))
				.collect();
			let backend = Arc::clone(&self.backend);
			let written = tokio::task::spawn_blocking(move || backend.insert(&entries)).await;

			match written {
				Ok(Ok(())) => {
					let keys: Vec<SourceTileKey> = batch.into_iter().map(|(key, _)| key).collect();
					{
						let mut known = self.known.lock();
						known.extend(keys.iter().cloned());
					}
					// fired after the commit: observers of the event can
					// always read what it names
					let _ = self.changed_tx.send(keys);
				}
				Ok(Err(error)) => log::error!("source-tile cache write failed: {error:#}"),
				Err(error) => log::error!("source-tile cache write task panicked: {error}"),
			}
		}
	}

	/// Bulk lookup.
	pub async fn get(
		&self,
		keys: &[SourceTileKey],
	) -> Result<HashMap<SourceTileKey, SourceTilePayload>> {
		let cache_keys: Vec<String> = keys.iter().map(SourceTileKey::as_cache_key).collect();
		let backend = Arc::clone(&self.backend);
		let found = tokio::task::spawn_blocking(move || backend.get(&cache_keys))
			.await
			.context("cache read task panicked")??;

		Ok(
			keys
				.iter()
				.filter_map(|key| found.get(&key.as_cache_key()).map(|payload| (key.clone(), payload.clone())))
				.collect(),
		)
	}

	/// Evict entries past the TTL, except those named by `pins`.
	pub async fn clear_expired(&self, pins: &HashSet<SourceTileKey>) -> Result<usize> {
		let keep: HashSet<String> = pins.iter().map(SourceTileKey::as_cache_key).collect();
		let backend = Arc::clone(&self.backend);
		let ttl = self.ttl;
		let removed = tokio::task::spawn_blocking(move || backend.clear_expired(ttl, &keep))
			.await
			.context("cache eviction task panicked")??;

		let removed_set: HashSet<&String> = removed.iter().collect();
		{
			let mut known = self.known.lock();
			known.retain(|key| !removed_set.contains(&key.as_cache_key()));
		}
		Ok(removed.len())
	}

	pub fn stored_count(&self) -> Result<usize> {
		self.backend.len()
	}
}
