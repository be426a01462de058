#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-tract percentage indicators.
//!
//! Two IBGE tables feed the indicators:
//!
//! * `caracteristicas_domicilio2`: households with piped water, sewage
//!   connection (network or septic tank) and garbage collection, over
//!   permanent private households (`V0007`).
//! * `cor_ou_raca`: residents per race/color category over all residents
//!   (`V0001`).
//!
//! A zero, negative or missing denominator always yields `0`, so no
//! indicator is ever NaN or infinite.

pub mod schema;

use std::collections::BTreeMap;

use midcity_tract_models::{CountTable, MissingField, TractId};
use thiserror::Error;

use crate::schema::{FieldSpec, ResolvedSchema};

/// Water access (% of households).
pub const P_AGUA: &str = "P_Agua";
/// Sewage access (% of households).
pub const P_ESGO: &str = "P_Esgo";
/// Garbage collection (% of households).
pub const P_LIXO: &str = "P_Lixo";
/// White residents (%).
pub const P_BRANCA: &str = "P_Branca";
/// Black residents (%).
pub const P_PRETA: &str = "P_Preta";
/// Asian-descendant residents (%).
pub const P_AMARELA: &str = "P_Amarela";
/// Mixed-race residents (%).
pub const P_PARDA: &str = "P_Parda";
/// Indigenous residents (%).
pub const P_INDIGENA: &str = "P_Indigena";

/// Substring identifying the household characteristics table.
pub const DOMICILE_TABLE: &str = "caracteristicas_domicilio2";

/// Substring identifying the race/color table.
pub const RACE_TABLE: &str = "cor_ou_raca";

/// Indicator columns produced from the household table.
pub const DOMICILE_INDICATORS: &[&str] = &[P_AGUA, P_ESGO, P_LIXO];

/// Indicator columns produced from the race table.
pub const RACE_INDICATORS: &[&str] = &[P_BRANCA, P_PRETA, P_AMARELA, P_PARDA, P_INDIGENA];

const HOUSEHOLDS: &str = "households";
const WATER: &str = "water";
const SEWAGE_NETWORK: &str = "sewage_network";
const SEWAGE_SEPTIC: &str = "sewage_septic";
const GARBAGE: &str = "garbage";
const RESIDENTS: &str = "residents";

const DOMICILE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(HOUSEHOLDS, &["V0007"]),
    FieldSpec::required(WATER, &["V00111"]),
    FieldSpec::required(SEWAGE_NETWORK, &["V00309"]),
    FieldSpec::optional(SEWAGE_SEPTIC, &["V00310"]),
    FieldSpec::required(GARBAGE, &["V00397"]),
];

/// Race count columns and the indicator each one feeds.
const RACE_COLUMNS: &[(&str, &str)] = &[
    ("V01317", P_BRANCA),
    ("V01318", P_PRETA),
    ("V01319", P_AMARELA),
    ("V01320", P_PARDA),
    ("V01321", P_INDIGENA),
];

const RACE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(RESIDENTS, &["V0001"]),
    FieldSpec::optional(P_BRANCA, &["V01317"]),
    FieldSpec::optional(P_PRETA, &["V01318"]),
    FieldSpec::optional(P_AMARELA, &["V01319"]),
    FieldSpec::optional(P_PARDA, &["V01320"]),
    FieldSpec::optional(P_INDIGENA, &["V01321"]),
];

/// Errors that can occur while computing indicators.
#[derive(Debug, Error)]
pub enum IndicatorError {
    /// A required count column is absent from a table.
    #[error("{table}: {source}")]
    MissingColumn {
        /// Table the column was looked up in.
        table: String,
        /// The candidates that were tried.
        source: MissingField,
    },
}

/// One tract's computed indicators, aligned with
/// [`IndicatorTable::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    /// Tract the values belong to.
    pub id: TractId,
    /// Indicator values.
    pub values: Vec<f64>,
}

/// Indicators computed for every row of a count table.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorTable {
    /// Indicator column names.
    pub columns: Vec<&'static str>,
    /// One row per input row, in input order.
    pub rows: Vec<IndicatorRow>,
}

impl IndicatorTable {
    /// Indexes rows by tract id. When an id repeats, the first row wins.
    #[must_use]
    pub fn by_id(&self) -> BTreeMap<&TractId, &IndicatorRow> {
        let mut map = BTreeMap::new();
        let mut duplicates = 0_usize;
        for row in &self.rows {
            if map.contains_key(&row.id) {
                duplicates += 1;
            } else {
                map.insert(&row.id, row);
            }
        }
        if duplicates > 0 {
            log::warn!("{duplicates} duplicate tract ids in indicator table, keeping first rows");
        }
        map
    }

    /// Returns the value of `column` for `row`.
    #[must_use]
    pub fn value(&self, row: &IndicatorRow, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| *c == column)?;
        row.values.get(index).copied()
    }
}

/// `numerator / denominator * 100`, or `0` when the denominator is not
/// positive.
#[must_use]
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        let value = numerator / denominator * 100.0;
        if value.is_finite() { value } else { 0.0 }
    } else {
        0.0
    }
}

/// Computes `P_Agua`, `P_Esgo` and `P_Lixo` from the household table.
///
/// Sewage is `V00309 + V00310` when the septic-tank column exists, or
/// `V00309` alone otherwise. Missing cells count as zero.
///
/// # Errors
///
/// Returns [`IndicatorError::MissingColumn`] if `V0007`, `V00111`,
/// `V00309` or `V00397` is absent.
pub fn compute_domicile_indicators(table: &CountTable) -> Result<IndicatorTable, IndicatorError> {
    let schema = ResolvedSchema::resolve(table, DOMICILE_FIELDS)?;
    if !schema.has(SEWAGE_SEPTIC) {
        log::info!("{}: V00310 absent, sewage uses V00309 only", table.name);
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            let households = schema.value_or_zero(row, HOUSEHOLDS);
            let sewage = schema.value_or_zero(row, SEWAGE_NETWORK)
                + schema.value_or_zero(row, SEWAGE_SEPTIC);

            IndicatorRow {
                id: row.id.clone(),
                values: vec![
                    percentage(schema.value_or_zero(row, WATER), households),
                    percentage(sewage, households),
                    percentage(schema.value_or_zero(row, GARBAGE), households),
                ],
            }
        })
        .collect();

    Ok(IndicatorTable {
        columns: DOMICILE_INDICATORS.to_vec(),
        rows,
    })
}

/// Computes the five race-share indicators from the race table.
///
/// A race column absent from the table yields `0` for every tract.
///
/// # Errors
///
/// Returns [`IndicatorError::MissingColumn`] if `V0001` is absent.
pub fn compute_race_indicators(table: &CountTable) -> Result<IndicatorTable, IndicatorError> {
    let schema = ResolvedSchema::resolve(table, RACE_FIELDS)?;
    for (column, indicator) in RACE_COLUMNS {
        if !schema.has(indicator) {
            log::warn!("{}: {column} absent, {indicator} set to 0", table.name);
        }
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            let residents = schema.value_or_zero(row, RESIDENTS);
            IndicatorRow {
                id: row.id.clone(),
                values: RACE_INDICATORS
                    .iter()
                    .map(|indicator| percentage(schema.value_or_zero(row, indicator), residents))
                    .collect(),
            }
        })
        .collect();

    Ok(IndicatorTable {
        columns: RACE_INDICATORS.to_vec(),
        rows,
    })
}
