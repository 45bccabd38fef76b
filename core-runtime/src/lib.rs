//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the AudioSync core:
//! - Logging and tracing infrastructure
//! - Scan/sync settings loaded from a read-only settings store
//! - Event bus for run progress and log streaming
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other modules depend on.
//! It establishes the logging conventions, the typed settings layer, and the
//! event broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
