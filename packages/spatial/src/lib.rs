#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial building blocks shared by harmonization and contiguity
//! selection.
//!
//! * [`projection`]: `proj4rs` reprojection between any two declared
//!   systems, in particular into the equal-area Albers used for areas.
//! * [`repair`]: rebuilds invalid (self-intersecting) polygons.
//! * [`index`]: R-tree over bounding boxes for candidate pair lookups.

pub mod index;
pub mod projection;
pub mod repair;

use thiserror::Error;

pub use index::EnvelopeIndex;
pub use projection::{Reprojector, reproject_layer, to_equal_area};
pub use repair::{repair, repair_layer};

/// Errors raised while reprojecting geometry.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// `proj4rs` rejected a CRS definition.
    #[error("Invalid projection '{definition}': {message}")]
    InvalidDefinition {
        /// The offending definition.
        definition: String,
        /// Error reported by `proj4rs`.
        message: String,
    },

    /// A coordinate could not be transformed.
    #[error("Cannot transform ({x}, {y}): {message}")]
    Transform {
        /// Input x (longitude for geographic systems).
        x: f64,
        /// Input y (latitude for geographic systems).
        y: f64,
        /// Error reported by `proj4rs`.
        message: String,
    },
}
