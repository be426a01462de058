#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration.
//!
//! Every tunable of the pipeline (the equal-area projection, the column
//! names each stage looks for, and the population thresholds used to pick
//! mid-sized cities) lives in a single TOML document. The embedded
//! `config/default.toml` is the only source of defaults: a user file is
//! merged over it key by key, so it only needs the keys it overrides.

use std::path::Path;

use midcity_tract_models::{AlbersParams, ContiguityRule};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};

/// The embedded default configuration.
pub const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`PipelineConfig`].
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The values parsed but are inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Equal-area projection used for every area computation.
    pub projection: AlbersParams,
    /// Areal interpolation settings.
    pub harmonize: HarmonizeConfig,
    /// Mid-sized city selection settings.
    pub selection: SelectionConfig,
    /// Per-municipality income quintile settings.
    pub quintiles: QuintileConfig,
    /// Candidate column names per logical field.
    pub fields: FieldCandidates,
}

/// Settings for the 2010 -> 2022 income harmonization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonizeConfig {
    /// Value column on the 2010 layer (matched case-insensitively).
    pub source_value_field: String,
    /// Column written on the 2022 layer.
    pub output_field: String,
}

/// Population thresholds and adjacency rule for city selection.
///
/// All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Minimum urban population of the municipality itself.
    pub min_city_population: f64,
    /// Minimum aggregate population of the contiguous component.
    pub min_component_population: f64,
    /// Maximum aggregate population of the contiguous component.
    pub max_component_population: f64,
    /// Adjacency rule between urban footprints.
    pub contiguity: ContiguityRule,
}

/// Settings for the per-municipality income quintiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuintileConfig {
    /// Column written with the quintile number (1 to 5).
    pub output_field: String,
    /// Municipalities with fewer non-missing values get no quintiles.
    pub min_group_size: usize,
}

/// Candidate column names for each logical field, tried in order and
/// matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCandidates {
    /// Tract id on polygon layers.
    pub tract_id: Vec<String>,
    /// Tract id on count tables.
    pub table_id: Vec<String>,
    /// Municipality name.
    pub municipality: Vec<String>,
    /// State name or abbreviation.
    pub state: Vec<String>,
    /// Resident population.
    pub population: Vec<String>,
    /// Numeric situation code (urban/rural).
    pub situation_code: Vec<String>,
    /// Textual situation, used when no code column exists.
    pub situation_text: Vec<String>,
    /// Situation codes classified as urban.
    pub urban_codes: Vec<String>,
    /// Textual situation classified as urban.
    pub urban_label: String,
    /// Count columns summed when dissolving footprints (optional).
    pub race_counts: Vec<String>,
    /// Metadata columns passed through from the first tract of a group.
    pub passthrough: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_toml(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default.toml: {e}"))
    }
}

impl PipelineConfig {
    /// Merges `content` over the embedded defaults, then deserializes and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or the values are
    /// inconsistent.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut merged: Table = toml::from_str(DEFAULT_TOML)?;
        let overrides: Table = toml::from_str(content)?;
        merge_tables(&mut merged, overrides);

        let config: Self = Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `path`, or the embedded defaults when
    /// no path is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            log::debug!("Using embedded default configuration");
            return Self::from_toml("");
        };

        log::info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.selection;
        let bounds = [
            s.min_city_population,
            s.min_component_population,
            s.max_component_population,
        ];
        if bounds.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(invalid(
                "selection thresholds must be finite and non-negative",
            ));
        }
        if s.min_component_population > s.max_component_population {
            return Err(invalid(format!(
                "min_component_population ({}) exceeds max_component_population ({})",
                s.min_component_population, s.max_component_population
            )));
        }

        let p = &self.projection;
        let angles = [p.lat_0, p.lat_1, p.lat_2, p.lon_0];
        if angles.iter().any(|a| !a.is_finite())
            || !p.semi_major_axis.is_finite()
            || p.semi_major_axis <= 0.0
            || p.inverse_flattening <= 1.0
        {
            return Err(invalid("projection parameters are out of range"));
        }
        if (p.lat_1 + p.lat_2).abs() < f64::EPSILON {
            return Err(invalid(
                "standard parallels must not be symmetric about the equator",
            ));
        }

        if self.harmonize.source_value_field.trim().is_empty()
            || self.harmonize.output_field.trim().is_empty()
        {
            return Err(invalid("harmonize field names must not be empty"));
        }

        if self.quintiles.output_field.trim().is_empty() {
            return Err(invalid("quintiles.output_field must not be empty"));
        }
        if self.quintiles.min_group_size < 5 {
            return Err(invalid(format!(
                "quintiles.min_group_size ({}) must be at least 5",
                self.quintiles.min_group_size
            )));
        }

        let f = &self.fields;
        for (name, list) in [
            ("tract_id", &f.tract_id),
            ("table_id", &f.table_id),
            ("municipality", &f.municipality),
            ("state", &f.state),
            ("population", &f.population),
        ] {
            if list.is_empty() {
                return Err(invalid(format!("fields.{name} needs at least one candidate")));
            }
        }

        Ok(())
    }
}

/// Recursively overlays `overrides` onto `base`. Nested tables merge; any
/// other value (arrays included) replaces the base value.
fn merge_tables(base: &mut Table, overrides: Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(nested)) => merge_tables(existing, nested),
            (Some(slot), value) => *slot = value,
            (None, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let config = PipelineConfig::from_toml(DEFAULT_TOML).unwrap();
        assert_eq!(config.harmonize.source_value_field, "RpC");
        assert_eq!(config.fields.urban_codes, vec!["1", "2"]);
        assert_eq!(config.selection.contiguity, ContiguityRule::Queen);
    }

    #[test]
    fn default_projection_is_brazil_albers() {
        assert_eq!(PipelineConfig::default().projection, AlbersParams::BRAZIL);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = PipelineConfig::from_toml(
            "[selection]\nmax_component_population = 750000\ncontiguity = \"rook\"\n",
        )
        .unwrap();
        assert!((config.selection.max_component_population - 750_000.0).abs() < f64::EPSILON);
        assert_eq!(config.selection.contiguity, ContiguityRule::Rook);
        assert!((config.selection.min_city_population - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(config.harmonize.output_field, "RpC_2010");
    }

    #[test]
    fn loaded_file_falls_back_to_embedded_defaults() {
        let tmp = std::env::temp_dir().join("midcity_config_load_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let path = tmp.join("override.toml");
        std::fs::write(
            &path,
            "[fields]\nmunicipality = [\"NOME_MUN\"]\n\n[projection]\nlon_0 = -54.0\n",
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(config.fields.municipality, vec!["NOME_MUN"]);
        assert_eq!(config.fields.state, defaults.fields.state);
        assert!((config.projection.lon_0 + 54.0).abs() < f64::EPSILON);
        assert!((config.projection.lat_1 - defaults.projection.lat_1).abs() < f64::EPSILON);
        assert_eq!(config.harmonize, defaults.harmonize);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_inverted_component_band() {
        let err = PipelineConfig::from_toml(
            "[selection]\nmin_component_population = 600000\nmax_component_population = 500000\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_symmetric_parallels() {
        let err = PipelineConfig::from_toml("[projection]\nlat_1 = 10.0\nlat_2 = -10.0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_quintile_groups_smaller_than_five() {
        let err = PipelineConfig::from_toml("[quintiles]\nmin_group_size = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_empty_candidate_list() {
        let err = PipelineConfig::from_toml("[fields]\npopulation = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            PipelineConfig::from_toml("[selection\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn loads_embedded_defaults_without_path() {
        assert_eq!(PipelineConfig::load(None).unwrap(), PipelineConfig::default());
    }
}
