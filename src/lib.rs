//! # registry-v1
//!
//! A file-backed server for the legacy (v1) container image registry protocol.
//!
//! Clients push and pull images through a small HTTP surface; everything is
//! stored as plain files under one data directory.
//!
//! ## Features
//!
//! - **Ordered routing**: method + pattern bindings, first match wins
//! - **Sessions**: Basic logins are upgraded to HMAC-SHA256 tokens
//! - **Plain storage**: repositories, tags and layers are files on disk
//! - **Request tracing**: every response carries an `X-Request-ID`
//!
//! ## Architecture
//!
//! - [`store`] - Repositories and images over the data directory
//! - [`server`] - Route table, session manager, handlers and dispatcher
//! - [`config`] - CLI and configuration types
//! - [`pidfile`] - Single-instance guard
//!
//! ## Example
//!
//! ```rust,no_run
//! use registry_v1::{create_router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = create_router(RouterConfig::new("/var/lib/registry"));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod pidfile;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{PidFileError, StoreError};
pub use pidfile::PidFile;
pub use server::{
    create_router, AuthError, ErrorResponse, RegistryContext, RouteTable, RouterConfig,
    Session, SessionAuth, SessionStatus,
};
pub use store::{ContentStore, Image, ImageAttributes, Repository};
