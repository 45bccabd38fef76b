//! # Metadata Module
//!
//! Extracts tag metadata from audio files behind the [`TagReader`] seam.
//!
//! ## Overview
//!
//! - [`extractor::LoftyTagReader`] reads ID3v2, MP4, Vorbis and FLAC tags
//!   via the `lofty` crate
//! - Extraction failures are per-file: callers record them and continue

pub mod error;
pub mod extractor;

pub use error::{MetadataError, Result};
pub use extractor::{AudioTags, LoftyTagReader, TagReader};
