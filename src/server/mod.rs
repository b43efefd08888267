//! HTTP server layer for the registry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          HTTP Layer                             │
//! │        dispatch_handler (request id, body, 404 fallback)        │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │   router    │  │    auth     │  │        handlers         │  │
//! │  │ (ordered    │─►│ (Basic →    │─►│  (content store reads   │  │
//! │  │  bindings)  │  │  sessions)  │  │   and writes)           │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod router;
pub mod routes;

pub use auth::{
    AuthError, CredentialVerifier, DenyAllVerifier, NoopAuthenticator, RepoAuthenticator, Session,
    SessionAuth, SessionStatus, SessionStore, SinglePasswordVerifier,
};
pub use handlers::{ErrorResponse, RegistryContext};
pub use router::{
    Admission, Authenticator, PathMatcher, PatternMatcher, RequestBody, RouteRequest, RouteTable,
};
pub use routes::{create_router, dispatch_handler, registry_routes, AppState, RouterConfig};
