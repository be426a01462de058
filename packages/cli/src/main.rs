#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line for the midcity census pipeline.
//!
//! One subcommand per stage (`indicators`, `harmonize`, `select`,
//! `quintiles`) plus `pipeline`, which runs them all in memory. Log output goes through
//! [`midcity_cli_utils::init_logger`] so progress bars and log lines do not
//! interleave.

mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use midcity_config::PipelineConfig;
use midcity_tract_models::CrsChoice;

use crate::pipeline::Stages;

#[derive(Parser)]
#[command(
    name = "midcity",
    about = "Census tract indicators, 2010 -> 2022 income harmonization and mid-sized city selection"
)]
struct Cli {
    /// Pipeline configuration (TOML). Only the keys to override are needed.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Coordinate reference of 2022 inputs: `geographic`, `albers`,
    /// `EPSG:<code>` or a `+proj=...` definition
    #[arg(long, global = true, default_value = "geographic")]
    crs_2022: CrsChoice,
    /// Coordinate reference of 2010 inputs: `geographic`, `albers`,
    /// `EPSG:<code>` or a `+proj=...` definition
    #[arg(long, global = true, default_value = "geographic")]
    crs_2010: CrsChoice,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute water, sewage, garbage and race indicators and join them
    /// onto the 2022 tracts
    Indicators {
        /// Directory searched recursively for the count tables (CSV)
        #[arg(long)]
        tables_dir: PathBuf,
        /// 2022 tract layer (`GeoJSON`)
        #[arg(long)]
        sectors: PathBuf,
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
        /// Also write the per-table indicator layers
        #[arg(long)]
        emit_intermediate: bool,
    },
    /// Transfer 2010 per-capita income onto the 2022 tracts by area
    /// weighting
    Harmonize {
        /// 2022 tract layer, usually the `indicators` output
        #[arg(long)]
        in_2022: PathBuf,
        /// 2010 tract layer with the income column
        #[arg(long)]
        in_2010: PathBuf,
        /// Income column on the 2010 layer (overrides the configuration)
        #[arg(long)]
        rpc_col: Option<String>,
        /// Output layer path
        #[arg(long)]
        out: PathBuf,
    },
    /// Select mid-sized cities (100k-500k) by urban contiguity
    Select {
        /// Harmonized 2022 tract layer
        #[arg(long)]
        in_2022: PathBuf,
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Split tracts into per-municipality income quintiles and write the
    /// poorest and richest quintile
    Quintiles {
        /// Tract layer with the harmonized income column
        #[arg(long = "in")]
        input: PathBuf,
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Run indicators, harmonization, selection and quintiles in one go
    Pipeline {
        /// Directory searched recursively for the count tables (CSV)
        #[arg(long)]
        tables_dir: PathBuf,
        /// 2022 tract layer (`GeoJSON`)
        #[arg(long)]
        sectors: PathBuf,
        /// 2010 tract layer with the income column
        #[arg(long)]
        in_2010: PathBuf,
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
        /// Also write the per-table indicator layers
        #[arg(long)]
        emit_intermediate: bool,
        /// Income column on the 2010 layer (overrides the configuration)
        #[arg(long)]
        rpc_col: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = midcity_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())?;
    let stages = Stages::new(
        &config,
        cli.crs_2022.resolve(&config.projection),
        cli.crs_2010.resolve(&config.projection),
        &multi,
    );

    match cli.command {
        Commands::Indicators {
            tables_dir,
            sectors,
            out_dir,
            emit_intermediate,
        } => {
            stages.indicators(&tables_dir, &sectors, &out_dir, emit_intermediate)?;
        }
        Commands::Harmonize {
            in_2022,
            in_2010,
            rpc_col,
            out,
        } => {
            stages.harmonize(&in_2022, &in_2010, rpc_col.as_deref(), &out)?;
        }
        Commands::Select { in_2022, out_dir } => {
            stages.select(&in_2022, &out_dir)?;
        }
        Commands::Quintiles { input, out_dir } => {
            stages.quintiles(&input, &out_dir)?;
        }
        Commands::Pipeline {
            tables_dir,
            sectors,
            in_2010,
            out_dir,
            emit_intermediate,
            rpc_col,
        } => {
            stages.pipeline(
                &tables_dir,
                &sectors,
                &in_2010,
                &out_dir,
                emit_intermediate,
                rpc_col.as_deref(),
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;
    use midcity_tract_models::Crs;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "midcity",
            "harmonize",
            "--in-2022",
            "a.geojson",
            "--in-2010",
            "b.geojson",
            "--out",
            "c.geojson",
            "--crs-2010",
            "albers",
        ])
        .unwrap();

        assert_eq!(cli.crs_2010, CrsChoice::ConfiguredAlbers);
        assert_eq!(cli.crs_2022, CrsChoice::Explicit(Crs::Geographic));
        assert!(matches!(cli.command, Commands::Harmonize { rpc_col: None, .. }));
    }

    #[test]
    fn accepts_epsg_codes_and_proj_definitions() {
        let cli = Cli::try_parse_from([
            "midcity",
            "--crs-2022",
            "EPSG:31983",
            "--crs-2010",
            "+proj=utm +zone=22 +south +ellps=GRS80 +units=m +no_defs",
            "select",
            "--in-2022",
            "a",
            "--out-dir",
            "b",
        ])
        .unwrap();

        let projection = PipelineConfig::default().projection;
        assert_eq!(
            cli.crs_2022.resolve(&projection),
            Crs::from_epsg(31983).unwrap()
        );
        assert!(!cli.crs_2010.resolve(&projection).is_geographic());
    }

    #[test]
    fn albers_resolves_to_configured_parameters() {
        let mut projection = PipelineConfig::default().projection;
        projection.lon_0 = -54.0;
        let crs = CrsChoice::ConfiguredAlbers.resolve(&projection);
        assert!(crs.definition().contains("+lon_0=-54"), "{crs}");
    }

    #[test]
    fn parses_quintiles_subcommand() {
        let cli = Cli::try_parse_from([
            "midcity",
            "quintiles",
            "--in",
            "harmonized.geojson",
            "--out-dir",
            "out",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Quintiles { ref input, .. } if input == &PathBuf::from("harmonized.geojson")
        ));
    }

    #[test]
    fn rejects_unknown_crs() {
        assert!(
            Cli::try_parse_from(["midcity", "--crs-2022", "mercator", "select", "--in-2022", "a", "--out-dir", "b"])
                .is_err()
        );
    }
}
