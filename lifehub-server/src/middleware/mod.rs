//! HTTP middleware
//!
//! Layer order, outermost first: request context, trace, rate limiting,
//! bearer authentication (protected routes only).

pub mod auth;
pub mod rate_limit;
pub mod request_context;

pub use auth::auth_middleware;
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use request_context::request_context_middleware;
