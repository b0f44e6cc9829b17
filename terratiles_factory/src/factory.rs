//! The coalescer: turns terrain requests into deduplicated source-tile
//! builds and resumes them when their inputs are complete.

use crate::{
	CacheBackend, FactoryCache, SourceTileKey, SourceTilePayload, TerrainKey, TerrainOptions,
	TerrainRequest,
};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use terratiles_cog::{SourceTileRead, TerrainSource};
use terratiles_core::{Direction, TileCoord};
use terratiles_mesh::{StitchSource, generate_tile};
use tokio::sync::{Semaphore, mpsc};

/// Tuning knobs of the factory.
#[derive(Clone, Debug)]
pub struct FactoryOptions {
	/// How long unpinned source tiles stay cached.
	pub cache_ttl: Duration,
	/// Concurrent blocking source reads.
	pub workers: usize,
	/// Cadence of the expiry sweeper.
	pub sweep_interval: Duration,
}

impl Default for FactoryOptions {
	fn default() -> Self {
		FactoryOptions {
			cache_ttl: Duration::from_secs(15),
			workers: 20,
			sweep_interval: Duration::from_secs(5),
		}
	}
}

/// A dequeued source-tile build: the key plus the parameters of the
/// request that first asked for it.
struct SourceTileJob {
	key: SourceTileKey,
	options: TerrainOptions,
}

#[derive(Default)]
struct FactoryState {
	pending: HashMap<TerrainKey, TerrainRequest>,
	/// Builds checked out of the queue but not yet cached.
	inflight: HashSet<SourceTileKey>,
	queue: VecDeque<SourceTileJob>,
	/// Membership index of `queue` for O(1) dedup.
	enqueued: HashSet<SourceTileKey>,
	coalescing: bool,
	rerun: bool,
}

/// Accepts terrain requests, fans them out into source-tile builds and
/// stitches the results.
///
/// Guarantees:
/// - at most one build runs per [`SourceTileKey`] at any instant;
/// - cached keys named by a pending request are never evicted;
/// - every future handed out by [`TerrainFactory::handle`] resolves
///   exactly once, with tile bytes or an error.
///
/// All control-plane structures live under one mutex; nothing does I/O
/// while holding it. Cache commits wake the coalescer through an event
/// channel, and a reentrancy flag turns concurrent wakes into reruns of
/// one scan loop instead of stacked scans.
pub struct TerrainFactory {
	source: Arc<dyn TerrainSource>,
	cache: Arc<FactoryCache>,
	state: Mutex<FactoryState>,
	workers: Arc<Semaphore>,
}

impl TerrainFactory {
	pub fn new(
		source: Arc<dyn TerrainSource>,
		backend: Arc<dyn CacheBackend>,
		options: &FactoryOptions,
	) -> Arc<TerrainFactory> {
		let (cache, changed_rx) = FactoryCache::new(backend, options.cache_ttl);
		let factory = Arc::new(TerrainFactory {
			source,
			cache,
			state: Mutex::new(FactoryState::default()),
			workers: Arc::new(Semaphore::new(options.workers)),
		});
		factory.spawn_event_loop(changed_rx);
		factory.spawn_sweeper(options.sweep_interval);
		factory
	}

	/// Handle one terrain request: register it, queue whatever source
	/// tiles are neither cached nor in flight, and await the stitched
	/// tile bytes.
	pub async fn handle(self: &Arc<Self>, coord: TileCoord, options: TerrainOptions) -> Result<Vec<u8>> {
		let (request, result_rx) = TerrainRequest::new(coord, options);

		{
			let mut state = self.state.lock();
			for key in &request.wanted_keys {
				if self.cache.contains(key) {
					continue;
				}
				if state.inflight.contains(key) || state.enqueued.contains(key) {
					continue;
				}
				state.enqueued.insert(key.clone());
				state.queue.push_back(SourceTileJob {
					key: key.clone(),
					options: request.options.clone(),
				});
			}
			state.pending.insert(request.key, request);
		}

		self.drain_queue();
		// everything may already be cached; scan immediately
		self.coalesce();

		result_rx
			.await
			.context("terrain request was dropped before completion")?
	}

	/// Spawn a worker per queued build, moving each into the in-flight
	/// set first so no key is ever built twice.
	fn drain_queue(self: &Arc<Self>) {
		loop {
			let job = {
				let mut state = self.state.lock();
				let Some(job) = state.queue.pop_front() else {
					return;
				};
				state.enqueued.remove(&job.key);
				state.inflight.insert(job.key.clone());
				job
			};
			let factory = Arc::clone(self);
			tokio::spawn(async move { factory.run_job(job).await });
		}
	}

	async fn run_job(&self, job: SourceTileJob) {
		let Ok(permit) = self.workers.acquire().await else {
			return;
		};
		let payload = match self.build_payload(&job).await {
			Ok(payload) => payload,
			Err(error) => {
				// a failed read degrades to an empty tile, never an error
				log::warn!("building source tile {} failed: {error:#}", job.key);
				SourceTilePayload::out_of_bounds()
			}
		};
		drop(permit);
		self.cache.add(job.key.clone(), payload).await;
	}

	/// Read the heightmap and run the mesh processor for one source tile.
	async fn build_payload(&self, job: &SourceTileJob) -> Result<SourceTilePayload> {
		let read = SourceTileRead {
			source: job.key.source.clone(),
			coord: job.key.coord,
			resampling: job.options.resampling,
			buffer: job.options.method.buffer(),
			nodata_fill: job.options.nodata_fill,
		};

		let Some(heights) = self.source.read(&read).await? else {
			return Ok(SourceTilePayload::out_of_bounds());
		};

		let method = job.options.method.clone();
		let coord = job.key.coord;
		let generate_normals = job.options.generate_normals;
		let (heights, mesh) = tokio::task::spawn_blocking(move || {
			let mesh = method.process(&heights, coord.z, coord.geo_bbox(), generate_normals);
			(heights, mesh)
		})
		.await
		.context("mesh processing task panicked")?;

		Ok(SourceTilePayload::new(heights, mesh?))
	}

	fn spawn_event_loop(self: &Arc<Self>, mut changed_rx: mpsc::UnboundedReceiver<Vec<SourceTileKey>>) {
		let weak = Arc::downgrade(self);
		tokio::spawn(async move {
			while let Some(new_keys) = changed_rx.recv().await {
				let Some(factory) = weak.upgrade() else {
					return;
				};
				{
					let mut state = factory.state.lock();
					for key in &new_keys {
						state.inflight.remove(key);
					}
				}
				factory.coalesce();
			}
		});
	}

	/// Scan pending requests and hand off those whose inputs are all
	/// cached. Reentrant calls set the rerun flag instead of scanning
	/// concurrently.
	fn coalesce(self: &Arc<Self>) {
		{
			let mut state = self.state.lock();
			if state.coalescing {
				state.rerun = true;
				return;
			}
			state.coalescing = true;
		}

		loop {
			let ready: Vec<TerrainRequest> = {
				let mut state = self.state.lock();
				let ready_keys: Vec<TerrainKey> = state
					.pending
					.iter()
					.filter(|(_, request)| self.cache.contains_all(request.wanted_keys.iter()))
					.map(|(key, _)| *key)
					.collect();
				ready_keys
					.iter()
					.filter_map(|key| state.pending.remove(key))
					.collect()
			};

			for request in ready {
				self.spawn_generation(request);
			}

			let rerun = {
				let mut state = self.state.lock();
				if state.rerun {
					state.rerun = false;
					true
				} else {
					state.coalescing = false;
					false
				}
			};
			if !rerun {
				return;
			}
		}
	}

	fn spawn_generation(self: &Arc<Self>, mut request: TerrainRequest) {
		let factory = Arc::clone(self);
		tokio::spawn(async move {
			let result = factory.generate(&request).await;
			if let Some(result_tx) = request.result_tx.take() {
				// the receiver may have hung up; the payloads stay cached
				let _ = result_tx.send(result);
			}
		});
	}

	/// Bulk-read the nine payloads and stitch + encode off the runtime.
	async fn generate(&self, request: &TerrainRequest) -> Result<Vec<u8>> {
		let payloads = self.cache.get(&request.wanted_keys).await?;
		let main = payloads
			.get(request.main_key())
			.cloned()
			.ok_or_else(|| anyhow!("main source tile {} missing from cache", request.main_key()))?;

		let neighbors: Vec<Option<SourceTilePayload>> = Direction::ALL
			.iter()
			.map(|direction| {
				request
					.neighbor_key(*direction)
					.and_then(|key| payloads.get(&key).cloned())
					.filter(SourceTilePayload::is_available)
			})
			.collect();

		let options = request.options.clone();
		let coord = request.coord;
		tokio::task::spawn_blocking(move || {
			let main_source = payload_as_stitch_source(&main);
			let neighbor_sources: [Option<StitchSource>; 8] =
				std::array::from_fn(|i| neighbors[i].as_ref().and_then(payload_as_stitch_source));
			generate_tile(
				&options.method,
				coord,
				main_source,
				&neighbor_sources,
				options.generate_normals,
				f64::from(options.nodata_fill),
			)
		})
		.await
		.context("terrain generation task panicked")?
	}

	/// Compute the pin set from pending requests, evict what expired,
	/// and log the factory gauges.
	pub async fn sweep(&self) {
		let (pins, pending, inflight, queued) = {
			let state = self.state.lock();
			let pins: HashSet<SourceTileKey> = state
				.pending
				.values()
				.flat_map(|request| request.wanted_keys.iter().cloned())
				.collect();
			(pins, state.pending.len(), state.inflight.len(), state.queue.len())
		};

		match self.cache.clear_expired(&pins).await {
			Ok(evicted) => log::debug!(
				"factory: terrain requests: {pending}, cache size: {}, inflight: {inflight}, queued: {queued}, evicted: {evicted}",
				self.cache.known_count()
			),
			Err(error) => log::error!("cache sweep failed: {error:#}"),
		}
	}

	fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
		let weak = Arc::downgrade(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// the first tick fires immediately
			ticker.tick().await;
			loop {
				ticker.tick().await;
				let Some(factory) = weak.upgrade() else {
					return;
				};
				factory.sweep().await;
			}
		});
	}
}

fn payload_as_stitch_source(payload: &SourceTilePayload) -> Option<StitchSource<'_>> {
	match (&payload.heights, &payload.mesh) {
		(Some(heights), Some(mesh)) if !payload.out_of_bounds => Some(StitchSource { heights, mesh }),
		_ => None,
	}
}
