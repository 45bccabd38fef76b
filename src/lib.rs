//! # AudioSync Core
//!
//! Facade crate for the AudioSync core workspace. Re-exports the member
//! crates so embedding layers (UI, HTTP surface, packaging) depend on a
//! single crate:
//!
//! - [`runtime`] — logging, settings, event bus
//! - [`catalog`] — persistent track catalog
//! - [`metadata`] — audio tag extraction
//! - [`sync`] — scanner, transfer planner, protocol adapters, run coordinator

pub use core_catalog as catalog;
pub use core_metadata as metadata;
pub use core_runtime as runtime;
pub use core_sync as sync;
