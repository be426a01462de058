//! Count table reader.
//!
//! IBGE publishes the "agregados por setores" as spreadsheets; this module
//! reads their delimited-text exports. The id column is normalized through
//! [`TractId::normalize`], and every other cell is coerced to a number:
//! the `X` suppression sentinel, blanks and non-numeric text become `None`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use midcity_tract_models::{CountRow, CountTable, MissingField, TractId, find_column};

use crate::IngestError;

/// File extensions picked up by [`discover_tables`].
const TABLE_EXTENSIONS: &[&str] = &["csv"];

/// Marker IBGE uses for statistically suppressed cells.
const SUPPRESSED: &str = "X";

/// Parses a count table from `reader`.
///
/// The delimiter (`,` or `;`) is sniffed from the header line and decides
/// how numbers are read: semicolon files use the Brazilian convention
/// (`1.234,5`), comma files the international one (`1,234.5`). Rows with
/// an empty id are skipped.
///
/// # Errors
///
/// Returns [`IngestError`] if the text is not valid delimited data, has no
/// header, or lacks an id column.
pub fn parse_count_table<S: AsRef<str>>(
    name: &str,
    mut reader: impl Read,
    id_candidates: &[S],
) -> Result<CountTable, IngestError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    let content = content.trim_start_matches('\u{feff}');

    let header_line = content.lines().next().unwrap_or_default();
    let delimiter = sniff_delimiter(header_line);
    let mark = DecimalMark::for_delimiter(delimiter);

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(IngestError::Format {
            message: format!("table '{name}' contains no header row"),
        });
    }

    let id_column = find_column(headers.iter().map(String::as_str), id_candidates)
        .ok_or_else(|| MissingField::new(id_candidates))?
        .to_owned();
    let id_index = headers
        .iter()
        .position(|h| *h == id_column)
        .unwrap_or_default();

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_index)
        .map(|(_, h)| h.clone())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0_usize;
    for record in csv_reader.records() {
        let record = record?;

        let raw_id = record.get(id_index).unwrap_or_default().trim();
        if raw_id.is_empty() {
            skipped += 1;
            continue;
        }

        let values = (0..headers.len())
            .filter(|i| *i != id_index)
            .map(|i| record.get(i).and_then(|cell| parse_cell(cell, mark)))
            .collect();

        rows.push(CountRow {
            id: TractId::normalize(raw_id),
            values,
        });
    }

    if skipped > 0 {
        log::debug!("{name}: skipped {skipped} rows without a tract id");
    }

    Ok(CountTable {
        name: name.to_owned(),
        id_column,
        columns,
        rows,
    })
}

/// Reads a count table from a file. The table is named after the
/// lower-cased file stem.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be opened or parsed.
pub fn read_count_table<S: AsRef<str>>(
    path: &Path,
    id_candidates: &[S],
) -> Result<CountTable, IngestError> {
    let name = table_name(path);
    let file = std::fs::File::open(path)?;
    parse_count_table(&name, file, id_candidates)
}

/// Reads every table file under `dir`, recursively.
///
/// Files that fail to parse are logged and skipped; the sweep only fails
/// when the directory itself cannot be read. Tables are keyed by
/// lower-cased file stem.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if `dir` (or a subdirectory) cannot be
/// listed.
pub fn discover_tables<S: AsRef<str>>(
    dir: &Path,
    id_candidates: &[S],
) -> Result<BTreeMap<String, CountTable>, IngestError> {
    let mut paths = Vec::new();
    collect_table_paths(dir, &mut paths)?;
    paths.sort();

    let mut tables = BTreeMap::new();
    for path in paths {
        match read_count_table(&path, id_candidates) {
            Ok(table) => {
                log::info!("Read table {} ({} rows)", path.display(), table.len());
                if tables.contains_key(&table.name) {
                    log::warn!(
                        "Table name '{}' appears more than once, keeping {}",
                        table.name,
                        path.display()
                    );
                }
                tables.insert(table.name.clone(), table);
            }
            Err(e) => log::warn!("Failed to read {}: {e}", path.display()),
        }
    }

    Ok(tables)
}

fn collect_table_paths(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), IngestError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_table_paths(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| TABLE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Returns the first table whose name contains `key`.
#[must_use]
pub fn pick_table<'a>(tables: &'a BTreeMap<String, CountTable>, key: &str) -> Option<&'a CountTable> {
    let key = key.to_lowercase();
    tables
        .iter()
        .find(|(name, _)| name.contains(&key))
        .map(|(_, table)| table)
}

/// Like [`pick_table`], but a miss is a configuration error.
///
/// # Errors
///
/// Returns [`IngestError::MissingTable`] if no table name contains `key`.
pub fn require_table<'a>(
    tables: &'a BTreeMap<String, CountTable>,
    key: &str,
) -> Result<&'a CountTable, IngestError> {
    pick_table(tables, key).ok_or_else(|| IngestError::MissingTable {
        key: key.to_owned(),
    })
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

/// Picks `;` when the header has more semicolons than commas.
fn sniff_delimiter(header: &str) -> u8 {
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

/// Decimal separator implied by a table's field delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecimalMark {
    /// `1,234.5`: commas group thousands.
    Point,
    /// `1.234,5`: dots group thousands.
    Comma,
}

impl DecimalMark {
    const fn for_delimiter(delimiter: u8) -> Self {
        if delimiter == b';' { Self::Comma } else { Self::Point }
    }
}

/// Parses a count cell under the table's number convention.
///
/// In comma-decimal tables a cell without any comma is read as written, so
/// `12.5` is still twelve and a half.
fn parse_cell(cell: &str, mark: DecimalMark) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case(SUPPRESSED) {
        return None;
    }

    let normalized = match mark {
        DecimalMark::Point => cell.replace(',', ""),
        DecimalMark::Comma if cell.contains(',') => cell.replace('.', "").replace(',', "."),
        DecimalMark::Comma => cell.to_owned(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
