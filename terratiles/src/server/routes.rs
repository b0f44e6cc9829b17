//! Router composition. Tile paths are matched by one catch-all route
//! and parsed in the handler, which keeps the `{y}.terrain` suffix out
//! of the router's segment grammar.

use super::{ServerState, handlers};
use axum::{Router, routing::get};
use std::sync::Arc;

pub fn build_router(state: Arc<ServerState>) -> Router {
	Router::new()
		.route("/", get(handlers::index))
		.route("/status", get(handlers::status))
		.route("/tiles/{*path}", get(handlers::serve_tiles))
		.with_state(state)
}
