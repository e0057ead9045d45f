//! Framework-independent pieces of the HTTP API
//!
//! Token issuing/verification, password hashing and the error envelope live
//! here so they can be tested without an HTTP stack.

pub mod auth;
pub mod password;
pub mod types;
