//! # Terratiles
//!
//! An on-demand Cesium terrain server: answers `{z}/{x}/{y}.terrain`
//! requests with quantized-mesh tiles generated from Cloud-Optimized
//! GeoTIFFs (or mosaics of them), with request coalescing, source-tile
//! caching and C0 edge stitching.
//!
//! The heavy lifting lives in the sibling crates:
//! - `terratiles_core` — tile index and geometry primitives
//! - `terratiles_cog` — COG/mosaic readers and the reader pool
//! - `terratiles_mesh` — meshing, stitching, quantized-mesh codec
//! - `terratiles_factory` — the request-coalescing tile factory
//!
//! This crate is the HTTP surface: settings, dataset configuration,
//! layer.json, the on-disk tile cache and the axum server.

pub mod datasets;
pub mod layer;
pub mod server;
pub mod settings;
pub mod tile_cache;

pub use server::TerrainServer;
pub use settings::Settings;
