//! Flat per-tract count tables (IBGE "agregados por setores").

use serde::{Deserialize, Serialize};

use crate::columns::find_column;
use crate::id::TractId;

/// One tract's row of raw counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRow {
    /// Normalized tract id.
    pub id: TractId,
    /// Cells aligned with [`CountTable::columns`]. `None` marks a
    /// suppressed (`X`), blank or non-numeric cell.
    pub values: Vec<Option<f64>>,
}

impl CountRow {
    /// Returns the cell at `index`, flattening out-of-range and missing
    /// cells to `None`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }
}

/// A table of raw counts keyed by tract id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountTable {
    /// Lower-cased file stem the table was read from.
    pub name: String,
    /// Header of the id column as it appeared in the source.
    pub id_column: String,
    /// Headers of the value columns, in source order.
    pub columns: Vec<String>,
    /// Rows in source order.
    pub rows: Vec<CountRow>,
}

impl CountTable {
    /// Resolves the first candidate column (case-insensitive) to its index
    /// in [`Self::columns`].
    #[must_use]
    pub fn column_index<S: AsRef<str>>(&self, candidates: &[S]) -> Option<usize> {
        let name = find_column(self.columns.iter().map(String::as_str), candidates)?;
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_column_index() {
        let table = CountTable {
            name: "t".to_owned(),
            id_column: "CD_setor".to_owned(),
            columns: vec!["V0007".to_owned(), "v00111".to_owned()],
            rows: vec![],
        };
        assert_eq!(table.column_index(&["V00111"]), Some(1));
        assert_eq!(table.column_index(&["V00310"]), None);
    }

    #[test]
    fn out_of_range_cell_is_none() {
        let row = CountRow {
            id: TractId::normalize("1"),
            values: vec![Some(1.0), None],
        };
        assert_eq!(row.value(0), Some(1.0));
        assert_eq!(row.value(1), None);
        assert_eq!(row.value(7), None);
    }
}
