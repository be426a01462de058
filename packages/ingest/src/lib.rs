#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion of census inputs.
//!
//! Reads IBGE per-tract count tables (exported as delimited text) and tract
//! polygon layers (`GeoJSON`), normalizing tract identifiers and coercing
//! suppressed cells to missing values so that downstream stages only ever
//! see clean numeric data keyed by canonical ids.

pub mod layers;
pub mod tables;

use midcity_tract_models::MissingField;
use thiserror::Error;

pub use layers::{normalize_layer_ids, parse_layer, read_layer};
pub use tables::{discover_tables, parse_count_table, pick_table, read_count_table, require_table};

/// Errors that can occur while reading inputs.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Reading a file or directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A delimited table could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A polygon layer could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A required column was not found.
    #[error("Missing column: {0}")]
    MissingField(#[from] MissingField),

    /// No table matched a required key.
    #[error("No table matching '{key}' was found")]
    MissingTable {
        /// Substring that was searched for in table names.
        key: String,
    },

    /// The input is structurally unusable.
    #[error("Format error: {message}")]
    Format {
        /// Description of what went wrong.
        message: String,
    },
}
