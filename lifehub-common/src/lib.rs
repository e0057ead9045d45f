//! # LifeHub Common Library
//!
//! Shared code for the LifeHub server including:
//! - Database initialization, migrations and settings
//! - Domain enums shared by the REST modules
//! - TTL cache and cache-key construction
//! - Bearer token, password and error-envelope types
//! - Configuration loading
//! - Pure domain rules (streaks, dependency cycles, derived figures)

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod formulas;
pub mod models;
pub mod patch;
pub mod streak;
pub mod task_graph;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
