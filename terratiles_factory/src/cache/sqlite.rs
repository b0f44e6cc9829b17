//! SQLite cache backend.
//!
//! Raw height blobs churn quickly; keeping them in a file-backed store
//! instead of the process heap keeps the memory footprint flat. Payloads
//! are bincode blobs, timestamps are unix seconds.

use super::CacheBackend;
use crate::SourceTilePayload;
use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::{SqliteConnectionManager, rusqlite};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct SqliteBackend {
	pool: Pool<SqliteConnectionManager>,
}

impl SqliteBackend {
	/// Open (or create) the cache database at a path.
	pub fn open(path: &str) -> Result<SqliteBackend> {
		Self::build(SqliteConnectionManager::file(path))
			.with_context(|| format!("opening cache db {path}"))
	}

	/// A private in-memory database, mostly for tests and `:memory:`
	/// configurations.
	pub fn open_in_memory() -> Result<SqliteBackend> {
		// a single connection, so every caller sees the same memory db
		Self::build_with_size(SqliteConnectionManager::memory(), 1)
	}

	fn build(manager: SqliteConnectionManager) -> Result<SqliteBackend> {
		Self::build_with_size(manager, 4)
	}

	fn build_with_size(manager: SqliteConnectionManager, size: u32) -> Result<SqliteBackend> {
		let pool = Pool::builder().max_size(size).build(manager)?;
		let conn = pool.get()?;
		conn.execute(
			"CREATE TABLE IF NOT EXISTS cache (
				key TEXT PRIMARY KEY,
				value BLOB,
				inserted REAL
			)",
			[],
		)?;
		// stale entries from an earlier run are useless
		conn.execute("DELETE FROM cache", [])?;
		Ok(SqliteBackend { pool })
	}
}

fn now_seconds() -> f64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

impl CacheBackend for SqliteBackend {
	fn get(&self, keys: &[String]) -> Result<HashMap<String, SourceTilePayload>> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare_cached("SELECT value FROM cache WHERE key = ?1")?;
		let mut found = HashMap::new();
		for key in keys {
			let blob: Option<Vec<u8>> = stmt
				.query_row([key], |row| row.get(0))
				.map(Some)
				.or_else(|error| match error {
					rusqlite::Error::QueryReturnedNoRows => Ok(None),
					other => Err(other),
				})?;
			if let Some(blob) = blob {
				let payload = bincode::deserialize(&blob).with_context(|| format!("corrupt cache entry {key}"))?;
				found.insert(key.clone(), payload);
			}
		}
		Ok(found)
	}

	fn insert(&self, batch: &[(String, SourceTilePayload)]) -> Result<()> {
		let mut conn = self.pool.get()?;
		let tx = conn.transaction()?;
		{
			let mut stmt = tx.prepare_cached(
				"INSERT OR REPLACE INTO cache (key, value, inserted) VALUES (?1, ?2, ?3)",
			)?;
			let now = now_seconds();
			for (key, payload) in batch {
				let blob = bincode::serialize(payload)?;
				stmt.execute(rusqlite::params![key, blob, now])?;
			}
		}
		tx.commit()?;
		Ok(())
	}

	fn clear_expired(&self, ttl: Duration, keep: &HashSet<String>) -> Result<Vec<String>> {
		let cutoff = now_seconds() - ttl.as_secs_f64();
		let mut conn = self.pool.get()?;
		let tx = conn.transaction()?;
		let expired: Vec<String> = {
			let mut stmt = tx.prepare_cached("SELECT key FROM cache WHERE inserted <= ?1")?;
			let rows = stmt.query_map([cutoff], |row| row.get::<_, String>(0))?;
			rows
				.filter_map(std::result::Result::ok)
				.filter(|key| !keep.contains(key))
				.collect()
		};
		{
			let mut stmt = tx.prepare_cached("DELETE FROM cache WHERE key = ?1")?;
			for key in &expired {
				stmt.execute([key])?;
			}
		}
		tx.commit()?;
		Ok(expired)
	}

	fn len(&self) -> Result<usize> {
		let conn = self.pool.get()?;
		let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
		Ok(count as usize)
	}
}
