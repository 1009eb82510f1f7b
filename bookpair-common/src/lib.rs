//! # Bookpair Common Library
//!
//! Shared code for the bookpair tools:
//! - Error and result types
//! - Configuration file discovery and path resolution
//! - Declarative SQLite schema maintenance
//! - Lock-contention retry for database writes

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
