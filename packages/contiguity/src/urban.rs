//! Urban/rural classification of tracts.

use midcity_config::FieldCandidates;
use midcity_tract_models::{TractFeature, TractLayer};

use crate::ContiguityError;

/// How a layer marks its urban tracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrbanFilter {
    /// A situation code column; tracts whose code is in `codes` are urban.
    Code {
        /// Resolved column name.
        field: String,
        /// Codes classified as urban, compared as text.
        codes: Vec<String>,
    },
    /// A textual situation column compared case-insensitively to `label`.
    Label {
        /// Resolved column name.
        field: String,
        /// Label classified as urban.
        label: String,
    },
}

impl UrbanFilter {
    /// Picks the classification available on `layer`. A situation code
    /// column wins over a textual one.
    ///
    /// # Errors
    ///
    /// Returns [`ContiguityError::NoSituationColumn`] if neither kind of
    /// column exists.
    pub fn resolve(layer: &TractLayer, fields: &FieldCandidates) -> Result<Self, ContiguityError> {
        if let Some(field) = layer.find_field(&fields.situation_code) {
            log::debug!("Urban filter on situation code column {field}");
            return Ok(Self::Code {
                field,
                codes: fields.urban_codes.clone(),
            });
        }
        if let Some(field) = layer.find_field(&fields.situation_text) {
            log::debug!("Urban filter on situation text column {field}");
            return Ok(Self::Label {
                field,
                label: fields.urban_label.clone(),
            });
        }
        Err(ContiguityError::NoSituationColumn {
            tried: fields
                .situation_code
                .iter()
                .chain(&fields.situation_text)
                .cloned()
                .collect(),
        })
    }

    /// Whether `feature` is urban. Missing situation values are not.
    #[must_use]
    pub fn is_urban(&self, feature: &TractFeature) -> bool {
        match self {
            Self::Code { field, codes } => feature
                .text(field)
                .is_some_and(|code| codes.iter().any(|c| c == code.trim())),
            Self::Label { field, label } => feature
                .text(field)
                .is_some_and(|text| text.trim().eq_ignore_ascii_case(label)),
        }
    }

    /// Returns the urban subset of `layer`.
    #[must_use]
    pub fn apply(&self, layer: &TractLayer) -> TractLayer {
        layer.filtered(|f| self.is_urban(f))
    }
}
