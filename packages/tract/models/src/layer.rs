//! Polygon layers and their attribute values.

use std::collections::{BTreeMap, BTreeSet};

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::columns::{MissingField, find_column};
use crate::crs::Crs;
use crate::id::TractId;

/// A single attribute cell on a tract feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Numeric value.
    Number(f64),
    /// Free text (names, codes stored as text).
    Text(String),
    /// Absent or unparseable value.
    Missing,
}

impl AttributeValue {
    /// Returns the value as a float.
    ///
    /// Text that parses as a number is accepted, since situation codes and
    /// counts are frequently stored as strings.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Number(_) | Self::Missing => None,
        }
    }

    /// Returns the value rendered as text.
    ///
    /// Integral numbers are rendered without decimals so that `1.0` and
    /// `"1"` compare equal as codes.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{n:.0}")),
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Missing => None,
        }
    }

    /// Whether the value is [`AttributeValue::Missing`].
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Option<f64>> for AttributeValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::Number)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A tract polygon with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct TractFeature {
    /// Tract boundary.
    pub geometry: MultiPolygon<f64>,
    /// Attribute columns keyed by their source name.
    pub properties: BTreeMap<String, AttributeValue>,
}

impl TractFeature {
    /// Creates a feature from a geometry and its attributes.
    #[must_use]
    pub const fn new(
        geometry: MultiPolygon<f64>,
        properties: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// Returns the attribute stored under `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&AttributeValue> {
        self.properties.get(field)
    }

    /// Returns the numeric value of `field`.
    #[must_use]
    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(AttributeValue::as_f64)
    }

    /// Returns the text value of `field`.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(AttributeValue::as_text)
    }

    /// Returns the normalized tract id stored under `field`.
    #[must_use]
    pub fn tract_id(&self, field: &str) -> Option<TractId> {
        match self.get(field)? {
            AttributeValue::Number(n) => Some(TractId::from_number(*n)),
            AttributeValue::Text(s) => Some(TractId::normalize(s)),
            AttributeValue::Missing => None,
        }
    }

    /// Sets (or replaces) an attribute.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<AttributeValue>) {
        self.properties.insert(field.into(), value.into());
    }
}

/// An ordered collection of tract features sharing one coordinate
/// reference.
#[derive(Debug, Clone, PartialEq)]
pub struct TractLayer {
    /// Coordinate reference of every geometry in the layer.
    pub crs: Crs,
    /// Features in input order.
    pub features: Vec<TractFeature>,
}

impl TractLayer {
    /// Creates a layer.
    #[must_use]
    pub const fn new(crs: Crs, features: Vec<TractFeature>) -> Self {
        Self { crs, features }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Names of all attribute columns present on any feature.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.features
            .iter()
            .flat_map(|f| f.properties.keys().map(String::as_str))
            .collect()
    }

    /// Resolves the first candidate column present on the layer
    /// (case-insensitive).
    #[must_use]
    pub fn find_field<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        let names = self.field_names();
        find_column(names.iter().copied(), candidates).map(str::to_owned)
    }

    /// Like [`Self::find_field`], but a miss is an error.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] listing the candidates when none of them
    /// is present.
    pub fn require_field<S: AsRef<str>>(&self, candidates: &[S]) -> Result<String, MissingField> {
        self.find_field(candidates)
            .ok_or_else(|| MissingField::new(candidates))
    }

    /// Returns a copy of the layer with only the features that satisfy
    /// `keep`.
    #[must_use]
    pub fn filtered(&self, keep: impl Fn(&TractFeature) -> bool) -> Self {
        Self {
            crs: self.crs.clone(),
            features: self.features.iter().filter(|f| keep(f)).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(props: &[(&str, AttributeValue)]) -> TractFeature {
        TractFeature::new(
            MultiPolygon::new(vec![]),
            props
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn numeric_text_reads_as_number() {
        assert_eq!(AttributeValue::from(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(AttributeValue::from("X").as_f64(), None);
        assert_eq!(AttributeValue::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn integral_numbers_render_without_decimals() {
        assert_eq!(AttributeValue::Number(1.0).as_text().as_deref(), Some("1"));
        assert_eq!(AttributeValue::Number(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(AttributeValue::Missing.as_text(), None);
    }

    #[test]
    fn finds_fields_case_insensitively() {
        let layer = TractLayer::new(
            Crs::Geographic,
            vec![feature(&[("cd_setor", AttributeValue::from("1"))])],
        );
        assert_eq!(
            layer.find_field(&["CD_SETOR", "CDSETOR"]).as_deref(),
            Some("cd_setor")
        );
        assert!(layer.require_field(&["NM_MUN"]).is_err());
    }

    #[test]
    fn reads_tract_id_from_numeric_cell() {
        let f = feature(&[("CD_SETOR", AttributeValue::Number(110_002_000_000_000.0))]);
        assert_eq!(
            f.tract_id("CD_SETOR").map(TractId::into_string).as_deref(),
            Some("110002000000000")
        );
    }
}
