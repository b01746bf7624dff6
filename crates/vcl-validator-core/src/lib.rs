//! vcl-validator-core: HTTP server core for the VCL validation service
//!
//! Owns everything between the TCP socket and a request handler:
//! - Request/response model and a small path router
//! - Middleware chain (request IDs, access logging, body limits)
//! - hyper-based HTTP/1.1 server with connection tracking and graceful shutdown

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod error;
pub mod request;
pub mod response;
pub mod router;
pub mod middleware;
pub mod handlers;
pub mod server;

// Re-exports
pub use error::{Error, Result};
pub use request::{BodyError, Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};
pub use router::{RouteMatch, Router};

// Middleware re-exports
pub use middleware::{Middleware, MiddlewareChain};

// Handlers re-exports
pub use handlers::{Health, HealthStatus};

pub use server::{
    handler_fn, ConnectionTracker, DynamicHandler, Server, ServerConfig, ServerState, ShutdownHandle,
};
