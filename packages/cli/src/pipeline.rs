//! Stage runners behind the subcommands.
//!
//! Each runner reads its inputs, runs one library stage and writes the
//! stage's outputs; [`Stages::pipeline`] chains them in memory so the
//! intermediate layers are not re-read from disk.

use std::error::Error;
use std::path::Path;
use std::time::Instant;

use midcity_cli_utils::{IndicatifProgress, MultiProgress};
use midcity_config::PipelineConfig;
use midcity_contiguity::{ContiguitySelector, Selection};
use midcity_harmonize::Harmonizer;
use midcity_indicators::{
    DOMICILE_INDICATORS, DOMICILE_TABLE, RACE_INDICATORS, RACE_TABLE, compute_domicile_indicators,
    compute_race_indicators,
};
use midcity_ingest::{discover_tables, normalize_layer_ids, read_layer, require_table};
use midcity_output::{
    CITY_LIST_FILE, COMPONENTS_FILE, DOMICILE_INTERMEDIATE_FILE, FOOTPRINTS_FILE, HARMONIZED_FILE,
    INDICATORS_FILE, QUINTILE_LOWER_FILE, QUINTILE_UPPER_FILE, RACE_INTERMEDIATE_FILE,
    SELECTED_FOOTPRINTS_FILE, SELECTED_TRACTS_FILE, TRACT_IDS_FILE, URBAN_TRACTS_FILE, join_indicators, output_path, project_columns,
    write_city_list, write_layer, write_tract_ids,
};
use midcity_quintiles::{QuintileClassifier, Quintiles};
use midcity_tract_models::{Crs, TractLayer};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// A 2022 tract layer with its resolved id column.
pub struct Tracts {
    /// The layer, ids normalized in place.
    pub layer: TractLayer,
    /// Name of the id column.
    pub id_field: String,
}

/// Shared settings for every stage.
pub struct Stages<'a> {
    config: &'a PipelineConfig,
    crs_2022: Crs,
    crs_2010: Crs,
    multi: &'a MultiProgress,
}

impl<'a> Stages<'a> {
    pub const fn new(
        config: &'a PipelineConfig,
        crs_2022: Crs,
        crs_2010: Crs,
        multi: &'a MultiProgress,
    ) -> Self {
        Self {
            config,
            crs_2022,
            crs_2010,
            multi,
        }
    }

    /// Reads a 2022 tract layer and normalizes its ids.
    fn read_tracts(&self, path: &Path) -> Result<Tracts> {
        let mut layer = read_layer(path, self.crs_2022.clone())?;
        let id_field = normalize_layer_ids(&mut layer, &self.config.fields.tract_id)?;
        Ok(Tracts { layer, id_field })
    }

    /// Computes the indicators and joins them onto the 2022 tracts.
    pub fn indicators(
        &self,
        tables_dir: &Path,
        sectors: &Path,
        out_dir: &Path,
        emit_intermediate: bool,
    ) -> Result<Tracts> {
        let start = Instant::now();

        let tables = discover_tables(tables_dir, &self.config.fields.table_id)?;
        log::info!("Found {} tables under {}", tables.len(), tables_dir.display());

        let domicile = compute_domicile_indicators(require_table(&tables, DOMICILE_TABLE)?)?;
        let race = compute_race_indicators(require_table(&tables, RACE_TABLE)?)?;

        let Tracts { layer, id_field } = self.read_tracts(sectors)?;
        let layer = join_indicators(&layer, &id_field, &domicile)?;
        let layer = join_indicators(&layer, &id_field, &race)?;

        if emit_intermediate {
            write_layer(
                &output_path(out_dir, DOMICILE_INTERMEDIATE_FILE)?,
                &project_columns(&layer, &id_field, DOMICILE_INDICATORS),
            )?;
            write_layer(
                &output_path(out_dir, RACE_INTERMEDIATE_FILE)?,
                &project_columns(&layer, &id_field, RACE_INDICATORS),
            )?;
        }
        write_layer(&output_path(out_dir, INDICATORS_FILE)?, &layer)?;

        log::info!(
            "Indicators complete in {:.1}s",
            start.elapsed().as_secs_f64()
        );
        Ok(Tracts { layer, id_field })
    }

    /// Harmonizes 2010 income onto an in-memory 2022 layer.
    pub fn harmonize_tracts(
        &self,
        tracts: Tracts,
        in_2010: &Path,
        rpc_col: Option<&str>,
    ) -> Result<Tracts> {
        let start = Instant::now();

        let source = read_layer(in_2010, self.crs_2010.clone())?;
        let mut harmonizer = Harmonizer::from_config(self.config);
        if let Some(col) = rpc_col {
            harmonizer = harmonizer.with_source_value_field(col);
        }

        let progress = IndicatifProgress::tracts_bar(self.multi, "Overlaying 2022 and 2010 tracts");
        let (layer, report) =
            harmonizer.harmonize_with_progress(&tracts.layer, &source, progress.as_ref())?;
        log::debug!("{report:?}");

        log::info!(
            "Harmonization complete in {:.1}s",
            start.elapsed().as_secs_f64()
        );
        Ok(Tracts {
            layer,
            id_field: tracts.id_field,
        })
    }

    /// `harmonize` subcommand: reads the 2022 layer, harmonizes and
    /// writes to `out`.
    pub fn harmonize(
        &self,
        in_2022: &Path,
        in_2010: &Path,
        rpc_col: Option<&str>,
        out: &Path,
    ) -> Result<()> {
        let tracts = self.read_tracts(in_2022)?;
        let tracts = self.harmonize_tracts(tracts, in_2010, rpc_col)?;
        write_layer(out, &tracts.layer)?;
        Ok(())
    }

    /// Selects mid-sized cities from an in-memory layer and writes every
    /// selection output.
    pub fn select_tracts(&self, tracts: &Tracts, out_dir: &Path) -> Result<Selection> {
        let start = Instant::now();

        let selection = ContiguitySelector::from_config(self.config).select(&tracts.layer)?;

        write_layer(&output_path(out_dir, URBAN_TRACTS_FILE)?, &selection.urban)?;
        write_layer(
            &output_path(out_dir, FOOTPRINTS_FILE)?,
            &selection.footprint_layer(),
        )?;
        write_layer(
            &output_path(out_dir, SELECTED_FOOTPRINTS_FILE)?,
            &selection.selected_layer(),
        )?;
        write_layer(
            &output_path(out_dir, COMPONENTS_FILE)?,
            &selection.component_layer(),
        )?;
        write_city_list(
            &output_path(out_dir, CITY_LIST_FILE)?,
            &selection.columns.municipality,
            &selection.columns.state,
            &selection.cities,
        )?;
        write_tract_ids(
            &output_path(out_dir, TRACT_IDS_FILE)?,
            &tracts.id_field,
            &selection.tract_ids,
        )?;
        write_layer(
            &output_path(out_dir, SELECTED_TRACTS_FILE)?,
            &selection.tracts,
        )?;

        log::info!(
            "Selection complete in {:.1}s: {} cities, {} tracts",
            start.elapsed().as_secs_f64(),
            selection.cities.len(),
            selection.tracts.len()
        );
        Ok(selection)
    }

    /// `select` subcommand.
    pub fn select(&self, in_2022: &Path, out_dir: &Path) -> Result<()> {
        let tracts = self.read_tracts(in_2022)?;
        self.select_tracts(&tracts, out_dir)?;
        Ok(())
    }

    /// Splits `layer` into income quintiles and writes the poorest and
    /// richest quintile.
    pub fn quintile_tracts(&self, layer: &TractLayer, out_dir: &Path) -> Result<Quintiles> {
        let quintiles = QuintileClassifier::from_config(self.config).classify(layer)?;

        let lowest = quintiles.lowest();
        let highest = quintiles.highest();
        write_layer(&output_path(out_dir, QUINTILE_LOWER_FILE)?, &lowest)?;
        write_layer(&output_path(out_dir, QUINTILE_UPPER_FILE)?, &highest)?;

        log::info!(
            "Quintiles: {} tracts in the lowest, {} in the highest",
            lowest.len(),
            highest.len()
        );
        Ok(quintiles)
    }

    /// `quintiles` subcommand.
    pub fn quintiles(&self, input: &Path, out_dir: &Path) -> Result<()> {
        let layer = read_layer(input, self.crs_2022.clone())?;
        self.quintile_tracts(&layer, out_dir)?;
        Ok(())
    }

    /// Runs indicators, harmonization, selection and quintiles back to
    /// back. Quintiles are taken over the tracts of the selected cities.
    pub fn pipeline(
        &self,
        tables_dir: &Path,
        sectors: &Path,
        in_2010: &Path,
        out_dir: &Path,
        emit_intermediate: bool,
        rpc_col: Option<&str>,
    ) -> Result<()> {
        let start = Instant::now();
        let stages = IndicatifProgress::stages_bar(self.multi, "Pipeline", 4);

        stages.set_message("Computing indicators".to_owned());
        let tracts = self.indicators(tables_dir, sectors, out_dir, emit_intermediate)?;
        stages.inc(1);

        stages.set_message("Harmonizing 2010 income".to_owned());
        let tracts = self.harmonize_tracts(tracts, in_2010, rpc_col)?;
        write_layer(&output_path(out_dir, HARMONIZED_FILE)?, &tracts.layer)?;
        stages.inc(1);

        stages.set_message("Selecting mid-sized cities".to_owned());
        let selection = self.select_tracts(&tracts, out_dir)?;
        stages.inc(1);

        stages.set_message("Splitting income quintiles".to_owned());
        self.quintile_tracts(&selection.tracts, out_dir)?;
        stages.inc(1);

        stages.finish(format!(
            "Pipeline complete in {:.1}s",
            start.elapsed().as_secs_f64()
        ));
        Ok(())
    }
}
