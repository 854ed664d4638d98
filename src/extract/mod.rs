//! Extraction layer: raw artifacts to deduplicated entity rows
//!
//! This module provides functionality for:
//! - Typed optional-chaining access into raw JSON payloads
//! - Field-path mapping into the three entity shapes
//! - The in-memory uniqueness cache mirroring the persisted store
//! - Dedup-and-insert batches and artifact replay

pub mod cache;
pub mod extractor;
pub mod fields;
pub mod mapper;

pub use cache::EntityCache;
pub use extractor::{DataExtractor, ExtractSummary};
pub use mapper::RawDocument;
