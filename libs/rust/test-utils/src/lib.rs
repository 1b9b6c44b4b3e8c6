//! Shared test utilities for the DataSource verification tools.
//!
//! This crate provides:
//! - Proptest generators for envelope shapes and record fields
//! - A stateful mock DataSource service with injectable defects
//! - Test fixtures with sample data

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{COLLECTION_PATH, Defects, EnvelopeStyle, MockDataSourceService};
