#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census tract types shared by every stage of the pipeline.
//!
//! Tracts (setores censitários) are polygons carrying raw IBGE counts and
//! derived indicators. Layers of tracts flow from ingestion through
//! indicator calculation, 2010 -> 2022 harmonization and mid-sized city
//! selection.

pub mod columns;
pub mod crs;
pub mod id;
pub mod layer;
pub mod progress;
pub mod table;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use columns::{MissingField, find_column};
pub use id::TractId;
pub use crs::{AlbersParams, Crs, CrsChoice, CrsError};
pub use layer::{AttributeValue, TractFeature, TractLayer};
pub use table::{CountRow, CountTable};

/// Adjacency rule used when grouping urban footprints into contiguous
/// components.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ContiguityRule {
    /// Any shared boundary point counts, including corner-only contact.
    #[default]
    Queen,
    /// Only a shared edge of positive length (or overlapping interiors)
    /// counts.
    Rook,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn parses_contiguity_rule() {
        assert_eq!(ContiguityRule::from_str("queen"), Ok(ContiguityRule::Queen));
        assert_eq!(ContiguityRule::from_str("ROOK"), Ok(ContiguityRule::Rook));
        assert!(ContiguityRule::from_str("bishop").is_err());
    }

    #[test]
    fn displays_contiguity_rule() {
        assert_eq!(ContiguityRule::Rook.to_string(), "rook");
    }
}
