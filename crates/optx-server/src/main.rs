//! # optx-server: HTTP Service for N-ary Join Ordering
//!
//! This binary crate exposes the join order core as a network service. A planner sends a
//! flattened n-ary join (its inputs, any left outer joins among them, and the join
//! predicates) together with table statistics; the server rebuilds the join as a binary
//! tree that keeps every outer join intact and returns it with a row estimate.
//!
//! ## Architecture
//!
//! ```text
//! Planner
//!   |
//!   | HTTP POST /optimize/join-order (JSON)
//!   v
//! optx-server (this binary)
//!   |
//!   +-> catalog + scans built from the request
//!   +-> JoinOrder hypergraph (LOJs exploded into left/right inputs)
//!   +-> query-order strategy (combine, mark used)
//!   +-> statistics derived on the final tree
//!   |
//!   | HTTP response (join tree JSON)
//!   v
//! Planner
//! ```
//!
//! ## Endpoints
//!
//! - `GET  /health`              - Health check
//! - `POST /optimize/join-order` - Build a join tree for a flattened n-ary join
//!
//! ## Configuration
//!
//! See [`state::OptimizerConfig`] for the environment variables. Logging is controlled by
//! the `RUST_LOG` environment variable (defaults to `optx=debug`).

mod join_graph;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Debug-level messages from the optx crates by default; RUST_LOG adds to or overrides it.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("optx=debug".parse()?))
        .init();

    let config = state::OptimizerConfig::from_env();
    let listen_addr = config.listen_addr.clone();
    tracing::debug!(?config, "loaded configuration");
    let state = Arc::new(state::AppState::new(config));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/optimize/join-order", post(join_graph::optimize_join_order))
        .layer(CorsLayer::permissive()) // Allow cross-origin requests (for dev/debug UIs)
        .layer(TraceLayer::new_for_http()) // Log all HTTP requests
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(listen_addr.as_str()).await?;
    tracing::info!("optx-server listening on http://{}", listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
