//! # Catalog Module
//!
//! Owns the persistent audio-file catalog and provides the store interface
//! the scanner and transfer planner work against.
//!
//! ## Overview
//!
//! This module manages:
//! - The `Track` model with its system-owned and user-owned regions
//! - The `CatalogStore` trait (upsert, mark-missing, sync-candidate query)
//! - SQLite persistence with connection pooling and embedded migrations

pub mod db;
pub mod error;
pub mod models;
pub mod sqlite;
pub mod store;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{CatalogError, Result};
pub use models::{Track, TrackUpsert, STATUS_MISSING};
pub use sqlite::SqliteCatalogStore;
pub use store::CatalogStore;
