//! # EntiWork Testkit
//!
//! Test utilities for EntiWork.
//!
//! This crate provides:
//! - Test fixtures: in-memory and journalled stores with automatic cleanup
//! - Property-based test generators using proptest
//! - An integration harness that checks the store against a model
//! - Concurrent stress drivers for conflict and retry behavior
//!
//! ## Usage
//!
//! ```rust
//! use entiwork_testkit::prelude::*;
//!
//! let store = TestStore::memory();
//! let reference = seed_counter(&store, "counter");
//! let result = stress_contended_increments(&store, &reference, &StressConfig::small());
//! assert_eq!(result.failed_ops, 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
