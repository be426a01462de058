#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Final assembly and emission of pipeline datasets.
//!
//! Indicator tables are left-joined onto tract layers by id, and layers
//! and flat lists are written as `GeoJSON` and CSV under the output
//! directory using the established file names.

pub mod join;
pub mod write;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use join::{join_indicators, project_columns};
pub use write::{layer_to_geojson, write_city_list, write_layer, write_tract_ids};

/// Tract layer with every indicator joined.
pub const INDICATORS_FILE: &str = "Setores_Indicadores_Censo_22.geojson";
/// Intermediate domicile indicator layer.
pub const DOMICILE_INTERMEDIATE_FILE: &str =
    "Agregados_por_setores_caracteristicas_domicilio2_BR_indice_calculado.geojson";
/// Intermediate race indicator layer.
pub const RACE_INTERMEDIATE_FILE: &str =
    "Agregados_por_setores_cor_ou_raca_BR_indice_calculado.geojson";
/// Indicator layer with harmonized income.
pub const HARMONIZED_FILE: &str = "Setores_raca_renda.geojson";
/// Urban tracts.
pub const URBAN_TRACTS_FILE: &str = "Areas_Urbanas_Com_Variaveis.geojson";
/// Every municipal urban footprint.
pub const FOOTPRINTS_FILE: &str = "Manchas_Urbanas_Populacao_Total_Raca.geojson";
/// Selected footprints.
pub const SELECTED_FOOTPRINTS_FILE: &str = "Cidades_Medias_100_500_mil_SEM_Conurbacoes.geojson";
/// Component dissolve of the selected footprints.
pub const COMPONENTS_FILE: &str = "Cidades_Medias_Componentes.geojson";
/// Selected city list.
pub const CITY_LIST_FILE: &str = "Cidades_Medias_Lista.csv";
/// Selected tract ids.
pub const TRACT_IDS_FILE: &str = "Cidades_Medias_CD_SETOR.csv";
/// Tracts of the selected cities.
pub const SELECTED_TRACTS_FILE: &str = "Cidades_Medias_Variaveis.geojson";
/// Tracts in the poorest income quintile of their municipality.
pub const QUINTILE_LOWER_FILE: &str = "quintil_inferior.geojson";
/// Tracts in the richest income quintile of their municipality.
pub const QUINTILE_UPPER_FILE: &str = "quintil_superior.geojson";

/// Errors that can occur while writing outputs.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A join column is missing.
    #[error("Invalid output request: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Creates `dir` (and parents) if needed and returns `dir/name`.
///
/// # Errors
///
/// Returns [`OutputError::Io`] if the directory cannot be created.
pub fn output_path(dir: &Path, name: &str) -> Result<PathBuf, OutputError> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.join(name))
}
