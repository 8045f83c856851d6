//! A hierarchical tensor storage engine.
//!
//! This crate re-exports the engine (see [`ht_tensor`]) and its error type, and adds a
//! machine-readable [`report::Report`] describing a computed [`Storage`].

pub use ht_error::{ErrorType, HTError, HTResult};
pub use ht_tensor::*;

pub mod report;
