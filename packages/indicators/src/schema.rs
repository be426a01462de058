//! Resolution of logical fields to concrete table columns.
//!
//! Each calculator declares the fields it reads as [`FieldSpec`]s. The
//! declaration is resolved once per table into a [`ResolvedSchema`]; a
//! required field that cannot be found fails the whole table up front,
//! while an optional one is simply absent from the schema.

use std::collections::BTreeMap;

use midcity_tract_models::{CountRow, CountTable, MissingField};

use crate::IndicatorError;

/// A logical input field and the column names it may appear under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Logical name used by the calculator.
    pub name: &'static str,
    /// Column names to try, in order (case-insensitive).
    pub candidates: &'static [&'static str],
    /// Whether a miss is a configuration error.
    pub required: bool,
}

impl FieldSpec {
    /// A field that must be present.
    #[must_use]
    pub const fn required(name: &'static str, candidates: &'static [&'static str]) -> Self {
        Self {
            name,
            candidates,
            required: true,
        }
    }

    /// A field that may be absent.
    #[must_use]
    pub const fn optional(name: &'static str, candidates: &'static [&'static str]) -> Self {
        Self {
            name,
            candidates,
            required: false,
        }
    }
}

/// Mapping from logical field name to column index in one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    columns: BTreeMap<&'static str, usize>,
}

impl ResolvedSchema {
    /// Resolves `specs` against the columns of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`IndicatorError::MissingColumn`] for the first required
    /// field with no matching column.
    pub fn resolve(table: &CountTable, specs: &[FieldSpec]) -> Result<Self, IndicatorError> {
        let mut columns = BTreeMap::new();
        for spec in specs {
            match table.column_index(spec.candidates) {
                Some(index) => {
                    columns.insert(spec.name, index);
                }
                None if spec.required => {
                    return Err(IndicatorError::MissingColumn {
                        table: table.name.clone(),
                        source: MissingField::new(spec.candidates),
                    });
                }
                None => {
                    log::debug!(
                        "{}: optional field {} not found (tried {})",
                        table.name,
                        spec.name,
                        spec.candidates.join(", ")
                    );
                }
            }
        }
        Ok(Self { columns })
    }

    /// Whether the logical field was found.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Returns the cell for a logical field, or `None` if the field is
    /// absent from the table or the cell is missing.
    #[must_use]
    pub fn value(&self, row: &CountRow, name: &str) -> Option<f64> {
        self.columns.get(name).and_then(|&i| row.value(i))
    }

    /// Like [`Self::value`], with missing cells read as zero.
    #[must_use]
    pub fn value_or_zero(&self, row: &CountRow, name: &str) -> f64 {
        self.value(row, name).unwrap_or(0.0)
    }
}
