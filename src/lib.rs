//! # cachet
//!
//! A small async HTTP/1.1 service whose core is a cache-aside read path:
//! datasets are served from a TTL cache when present and from the
//! authoritative store otherwise, repopulating the cache on the way out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachet::server::Server;
//! use cachet::{Response, Router, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/", |_ctx| async { Response::new(StatusCode::Ok).body("Hello, World!") });
//!     let router = std::sync::Arc::new(router);
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let router = router.clone();
//!         async move { router.route(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Data path ─────────────────────────────────────────────────────────────────
pub mod cache;
pub mod database;
pub mod dataset;

// ── Service wiring ────────────────────────────────────────────────────────────
pub mod app;
pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
