//! Ordered method + path dispatch.
//!
//! A [`RouteTable`] is a list of bindings tried in registration order. The
//! first binding whose method equals the request method and whose matcher
//! accepts the path wins; later bindings are never consulted, even when the
//! winning authenticator rejects the request. Precedence is therefore
//! entirely a matter of registration order: register specific routes before
//! general ones.
//!
//! ```text
//! request ──► binding 0? ──► binding 1? ──► ... ──► unhandled (None)
//!                 │
//!                 ▼ first match
//!           authenticator ──reject──► 401 response
//!                 │
//!                 ▼ admit
//!              handler ──► response (+ admission headers)
//! ```

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{header, HeaderMap, Method};
use regex::Regex;

use super::auth::Session;
use crate::store::{Payload, SpooledFile};

// =============================================================================
// Path Matching
// =============================================================================

/// Maps a request path to its captured segments, or `None` if it does not apply.
pub trait PathMatcher: Send + Sync {
    fn captures(&self, path: &str) -> Option<Vec<String>>;
}

impl<F> PathMatcher for F
where
    F: Fn(&str) -> Option<Vec<String>> + Send + Sync,
{
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        self(path)
    }
}

/// Regular-expression matcher.
///
/// The expression is not anchored, so it matches anywhere inside the path
/// unless the pattern itself says otherwise (e.g. a trailing `$`).
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Matcher for `/v{n}/` followed by `pattern`.
    ///
    /// The API version digits are always the first capture.
    pub fn versioned(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(&format!(r"/v(\d+)/{}", pattern))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl PathMatcher for PatternMatcher {
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

// =============================================================================
// Authentication Contract
// =============================================================================

/// Outcome of a successful authentication check.
#[derive(Debug, Default)]
pub struct Admission {
    /// The session the request authenticated as, if any
    pub session: Option<Session>,

    /// Headers to add to the handler's response
    pub headers: HeaderMap,
}

impl Admission {
    /// Admission without a session or extra headers.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Gate run before a bound handler.
///
/// `Err` carries the complete response to send instead of running the handler.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Admission, Response>;
}

// =============================================================================
// Requests and Bindings
// =============================================================================

/// A received request body: small bodies stay in memory, large ones are
/// spooled to a file in the data directory.
#[derive(Debug)]
pub enum RequestBody {
    Memory(Bytes),
    Spooled(SpooledFile),
}

impl RequestBody {
    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Memory(bytes) => bytes.len() as u64,
            RequestBody::Spooled(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The body as content the store can write.
    pub fn payload(&self) -> Payload<'_> {
        match self {
            RequestBody::Memory(bytes) => Payload::Bytes(bytes),
            RequestBody::Spooled(file) => file.payload(),
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Memory(Bytes::new())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Memory(bytes)
    }
}

/// A fully received request as seen by handlers.
#[derive(Debug)]
pub struct RouteRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: RequestBody,

    /// Captured path segments, filled in by the table on match
    pub captures: Vec<String>,

    /// Session established by the authenticator, filled in on admission
    pub session: Option<Session>,
}

impl RouteRequest {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<RequestBody>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            body: body.into(),
            captures: Vec::new(),
            session: None,
        }
    }

    /// Captured segment at `index`, or `""` when there is none.
    pub fn capture(&self, index: usize) -> &str {
        self.captures.get(index).map(String::as_str).unwrap_or("")
    }

    /// The `Host` header, if present and printable.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
    }
}

/// Handler bound to a route, with its output already turned into a response.
pub type Handler<S> = Box<dyn Fn(&S, &RouteRequest) -> Response + Send + Sync>;

/// One (method, matcher, authenticator, handler) entry.
pub struct RouteBinding<S> {
    method: Method,
    matcher: Box<dyn PathMatcher>,
    authenticator: Arc<dyn Authenticator>,
    handler: Handler<S>,
}

impl<S> RouteBinding<S> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Captures if this binding applies to `method` and `path`.
    pub fn matches(&self, method: &Method, path: &str) -> Option<Vec<String>> {
        if self.method != *method {
            return None;
        }
        self.matcher.captures(path)
    }
}

// =============================================================================
// Route Table
// =============================================================================

/// Ordered list of route bindings.
pub struct RouteTable<S> {
    bindings: Vec<RouteBinding<S>>,
}

impl<S> Default for RouteTable<S> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }
}

impl<S> RouteTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding. Bindings registered earlier take precedence.
    pub fn register<H, R>(
        &mut self,
        method: Method,
        matcher: impl PathMatcher + 'static,
        authenticator: Arc<dyn Authenticator>,
        handler: H,
    ) -> &mut Self
    where
        S: 'static,
        H: Fn(&S, &RouteRequest) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.bindings.push(RouteBinding {
            method,
            matcher: Box::new(matcher),
            authenticator,
            handler: Box::new(move |state: &S, request: &RouteRequest| {
                handler(state, request).into_response()
            }),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Index and captures of the first binding matching `method` and `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<(usize, Vec<String>)> {
        self.bindings
            .iter()
            .enumerate()
            .find_map(|(index, binding)| binding.matches(method, path).map(|c| (index, c)))
    }

    /// Route a request.
    ///
    /// Returns `None` when no binding matches. A match always produces a
    /// response: either the authenticator's rejection or the handler's
    /// answer with the admission headers merged in (headers the handler set
    /// itself are kept).
    pub fn dispatch(&self, state: &S, mut request: RouteRequest) -> Option<Response> {
        let (index, captures) = self.find(&request.method, &request.path)?;
        let binding = &self.bindings[index];
        request.captures = captures;

        let admission = match binding.authenticator.authenticate(&request.headers) {
            Ok(admission) => admission,
            Err(rejection) => return Some(rejection),
        };
        request.session = admission.session;

        let mut response = (binding.handler)(state, &request);
        let response_headers = response.headers_mut();
        for (name, value) in admission.headers.iter() {
            if !response_headers.contains_key(name) {
                response_headers.insert(name.clone(), value.clone());
            }
        }

        Some(response)
    }
}

// =============================================================================
// Tests
// =============================================================================
