//! Canonical census tract identifiers.
//!
//! IBGE tract codes are 15-digit numbers. Spreadsheet exports frequently
//! mangle them into floats (`1.10002E+14`, sometimes with a decimal comma),
//! so every identifier entering the pipeline goes through
//! [`TractId::normalize`] before it is used as a join key.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches identifiers that are already a plain digit string.
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Matches scientific notation written with a decimal comma
/// (e.g. `1,10002E+14`).
static COMMA_SCIENTIFIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+,\d+[eE][+-]?\d+$").expect("valid regex"));

/// A canonical, digits-only tract identifier.
///
/// 2010 and 2022 identifiers live in separate namespaces: two tracts from
/// different vintages are never related by id equality, only by overlap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TractId(String);

impl TractId {
    /// Normalizes a raw tract code into its canonical form.
    ///
    /// * Surrounding whitespace is trimmed.
    /// * A plain digit string is returned unchanged.
    /// * Scientific notation with a decimal comma (`1,10002E+14`) is read
    ///   with the comma as the decimal separator.
    /// * Any other comma is treated as a thousands separator and dropped.
    /// * Remaining text that parses as a float is expanded with zero
    ///   decimals (`1.10002E+14` -> `110002000000000`).
    /// * Anything else is returned as-is (trimmed, commas removed).
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();

        if COMMA_SCIENTIFIC_RE.is_match(trimmed)
            && let Ok(value) = trimmed.replace(',', ".").parse::<f64>()
        {
            return Self::from_number(value);
        }

        let cleaned = trimmed.replace(',', "");
        if DIGITS_RE.is_match(&cleaned) {
            return Self(cleaned);
        }

        match cleaned.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::from_number(value),
            _ => Self(cleaned),
        }
    }

    /// Builds an identifier from a numeric cell, formatted with no
    /// decimals.
    #[must_use]
    pub fn from_number(value: f64) -> Self {
        Self(format!("{value:.0}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TractId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
