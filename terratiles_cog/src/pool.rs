//! A pool of open readers, one bounded stack per source.

use crate::{
	CogReader, DatasetType, MAX_MOSAIC_CHILDREN, MosaicReader, SourceTileRead, TerrainSource,
	dataset_type,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use terratiles_core::Heightmap;

/// Default cap on idle readers kept per source.
pub const DEFAULT_MAX_READERS: usize = 8;

/// An open dataset handle held by the pool.
///
/// Handles are checked out exclusively; nothing here is shared between
/// concurrent reads.
pub enum Reader {
	Cog(Box<CogReader>),
	Mosaic(MosaicReader),
}

impl Reader {
	/// Open a source by its dataset type. Blocking.
	pub fn open(source: &str, unsafe_reads: bool) -> Result<Reader> {
		Ok(match dataset_type(source) {
			DatasetType::Cog => Reader::Cog(Box::new(CogReader::open(source, unsafe_reads)?)),
			DatasetType::Mosaic => Reader::Mosaic(MosaicReader::open(source)?),
		})
	}

	fn source(&self) -> &str {
		match self {
			Reader::Cog(reader) => reader.source(),
			Reader::Mosaic(reader) => reader.source(),
		}
	}
}

/// Spawns and recycles readers for Cloud-Optimized GeoTIFFs.
///
/// Each source id keeps its own stack of idle readers, capped at
/// `max_readers`; handles are never shared concurrently. Opening happens
/// off-lock on the blocking thread pool, so a slow open never stalls
/// unrelated sources.
pub struct CogReaderPool {
	stacks: Mutex<HashMap<String, Vec<Reader>>>,
	max_readers: usize,
	unsafe_reads: bool,
}

impl CogReaderPool {
	pub fn new(unsafe_reads: bool, max_readers: usize) -> CogReaderPool {
		CogReaderPool {
			stacks: Mutex::new(HashMap::new()),
			max_readers,
			unsafe_reads,
		}
	}

	pub fn unsafe_reads(&self) -> bool {
		self.unsafe_reads
	}

	/// Check a reader out of the pool, opening a new one if none is idle.
	pub async fn acquire(&self, source: &str) -> Result<Reader> {
		{
			let mut stacks = self.stacks.lock();
			if let Some(reader) = stacks.get_mut(source).and_then(|stack| stack.pop()) {
				return Ok(reader);
			}
		}

		let source = source.to_string();
		let unsafe_reads = self.unsafe_reads;
		tokio::task::spawn_blocking(move || Reader::open(&source, unsafe_reads))
			.await
			.context("reader open task panicked")?
	}

	/// Return a reader; it is dropped when the stack is full.
	pub fn release(&self, reader: Reader) {
		let source = reader.source().to_string();
		let mut stacks = self.stacks.lock();
		let stack = stacks.entry(source.clone()).or_default();
		if stack.len() >= self.max_readers {
			log::debug!("dropping surplus reader for {source}");
			return;
		}
		stack.push(reader);
		log::trace!("readers pooled for {source}: {}", stack.len());
	}

	/// Idle readers currently pooled for a source.
	pub fn idle_readers(&self, source: &str) -> usize {
		self.stacks.lock().get(source).map_or(0, Vec::len)
	}

	/// Read one source-tile window through the pool.
	pub async fn read_tile(&self, read: &SourceTileRead) -> Result<Option<Heightmap>> {
		match self.acquire(&read.source).await? {
			Reader::Cog(mut reader) => {
				let params = read.clone();
				let (reader, heights) = tokio::task::spawn_blocking(move || {
					let heights =
						reader.read_tile(params.coord, params.resampling, params.buffer, params.nodata_fill);
					(reader, heights)
				})
				.await
				.context("tile read task panicked")?;
				self.release(Reader::Cog(reader));
				Ok(heights)
			}
			Reader::Mosaic(reader) => {
				// the definition is plain data; return the handle before
				// fanning out into child reads
				let mosaic = reader.clone();
				self.release(Reader::Mosaic(reader));
				self.read_mosaic(&mosaic, read).await
			}
		}
	}

	fn read_tile_boxed(&self, read: SourceTileRead) -> BoxFuture<'_, Result<Option<Heightmap>>> {
		Box::pin(async move { self.read_tile(&read).await })
	}

	/// Composite a tile from the mosaic's intersecting children.
	///
	/// Children are read in definition order; the first child providing a
	/// value for a pixel wins.
	async fn read_mosaic(
		&self,
		mosaic: &MosaicReader,
		read: &SourceTileRead,
	) -> Result<Option<Heightmap>> {
		let bounds = read.coord.geo_bbox();
		if !mosaic.tile_exists(&bounds) {
			return Ok(None);
		}
		let children = mosaic.intersecting_children(&bounds);
		if children.is_empty() {
			return Ok(None);
		}
		if children.len() > MAX_MOSAIC_CHILDREN {
			if self.unsafe_reads {
				log::warn!(
					"mosaic {} tile {} touches {} children, loading anyway",
					mosaic.source(),
					read.coord,
					children.len()
				);
			} else {
				log::warn!(
					"mosaic {} tile {} touches {} children (max {MAX_MOSAIC_CHILDREN}), refusing; run with --unsafe to load anyway",
					mosaic.source(),
					read.coord,
					children.len()
				);
				return Ok(None);
			}
		}

		let mut composite: Option<Heightmap> = None;
		for child in children {
			let child_read = SourceTileRead {
				source: child.path.clone(),
				..read.clone()
			};
			let Some(heights) = self.read_tile_boxed(child_read).await? else {
				continue;
			};
			match &mut composite {
				None => composite = Some(heights),
				Some(existing) => {
					if existing.width() != heights.width() || existing.height() != heights.height() {
						log::warn!(
							"mosaic child {} returned a {}x{} window, expected {}x{}",
							child.path,
							heights.width(),
							heights.height(),
							existing.width(),
							existing.height()
						);
						continue;
					}
					for row in 0..existing.height() {
						for col in 0..existing.width() {
							if existing.get(col, row) == read.nodata_fill {
								existing.set(col, row, heights.get(col, row));
							}
						}
					}
				}
			}
		}
		Ok(composite)
	}
}

#[async_trait]
impl TerrainSource for CogReaderPool {
	async fn read(&self, read: &SourceTileRead) -> Result<Option<Heightmap>> {
		self.read_tile(read).await
	}
}
