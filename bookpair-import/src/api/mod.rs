//! HTTP API handlers for bookpair-import

pub mod health;
pub mod import;

pub use health::health_routes;
pub use import::import_routes;
