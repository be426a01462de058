//! Case-insensitive column lookup by candidate name.

use std::collections::BTreeMap;

use thiserror::Error;

/// Returns the first column matching any candidate, compared
/// case-insensitively. Candidates are tried in order.
#[must_use]
pub fn find_column<'a, S: AsRef<str>>(
    columns: impl IntoIterator<Item = &'a str>,
    candidates: &[S],
) -> Option<&'a str> {
    let by_lower: BTreeMap<String, &'a str> = columns
        .into_iter()
        .map(|c| (c.to_lowercase(), c))
        .collect();

    candidates
        .iter()
        .find_map(|cand| by_lower.get(&cand.as_ref().to_lowercase()).copied())
}

/// Error returned when none of the candidate column names exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column not found, tried: {}", .candidates.join(", "))]
pub struct MissingField {
    /// The candidate names that were tried.
    pub candidates: Vec<String>,
}

impl MissingField {
    /// Builds the error from the candidate list.
    #[must_use]
    pub fn new<S: AsRef<str>>(candidates: &[S]) -> Self {
        Self {
            candidates: candidates.iter().map(|c| c.as_ref().to_owned()).collect(),
        }
    }
}
