//! Dissolving urban tracts into per-municipality footprints.
//!
//! Tracts are grouped by `(municipality, state)` with a fold into an
//! ordered map, so footprints always come out sorted by key regardless of
//! tract order. Population and race counts are summed (missing counts add
//! nothing); metadata columns take the first non-missing value in input
//! order.

use std::collections::BTreeMap;

use geo::{MultiPolygon, unary_union};
use midcity_config::FieldCandidates;
use midcity_spatial::repair;
use midcity_tract_models::{AttributeValue, TractFeature, TractLayer};

use crate::ContiguityError;

/// Output column for the summed population.
pub const POPULATION_FIELD: &str = "PR";

/// Concrete column names used to dissolve one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissolveColumns {
    /// Municipality name column.
    pub municipality: String,
    /// State column.
    pub state: String,
    /// Population column on the input tracts.
    pub population: String,
    /// Count columns present on the layer, summed per footprint.
    pub counts: Vec<String>,
    /// Metadata columns present on the layer, first value kept.
    pub passthrough: Vec<String>,
}

impl DissolveColumns {
    /// Resolves the dissolve columns on `layer`. Optional count and
    /// metadata columns that are absent are left out.
    ///
    /// # Errors
    ///
    /// Returns [`ContiguityError::MissingField`] if the municipality,
    /// state or population column cannot be found.
    pub fn resolve(layer: &TractLayer, fields: &FieldCandidates) -> Result<Self, ContiguityError> {
        let require = |field: &'static str, candidates: &[String]| {
            layer
                .require_field(candidates)
                .map_err(|source| ContiguityError::MissingField { field, source })
        };

        let municipality = require("municipality", &fields.municipality)?;
        let state = require("state", &fields.state)?;
        let population = require("population", &fields.population)?;

        let names = layer.field_names();
        let present = |candidates: &[String]| -> Vec<String> {
            candidates
                .iter()
                .filter(|c| names.contains(c.as_str()))
                .cloned()
                .collect()
        };

        Ok(Self {
            municipality,
            state,
            population,
            counts: present(&fields.race_counts),
            passthrough: present(&fields.passthrough),
        })
    }

    /// The `(municipality, state)` key of a tract, if both are present.
    #[must_use]
    pub fn key(&self, feature: &TractFeature) -> Option<FootprintKey> {
        let municipality = feature.text(&self.municipality)?;
        let state = feature.text(&self.state)?;
        Some(FootprintKey {
            municipality,
            state,
        })
    }
}

/// Identity of an urban footprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FootprintKey {
    /// Municipality name.
    pub municipality: String,
    /// State name or abbreviation.
    pub state: String,
}

/// The union of all urban tracts of one municipality.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    /// Municipality and state.
    pub key: FootprintKey,
    /// Dissolved geometry.
    pub geometry: MultiPolygon<f64>,
    /// Summed population.
    pub population: f64,
    /// Summed count columns.
    pub counts: BTreeMap<String, f64>,
    /// First-value metadata columns.
    pub passthrough: BTreeMap<String, AttributeValue>,
    /// Number of tracts dissolved into this footprint.
    pub tract_count: usize,
}

impl Footprint {
    /// Renders the footprint as a feature with the municipality and state
    /// under their input column names.
    #[must_use]
    pub fn to_feature(&self, columns: &DissolveColumns) -> TractFeature {
        let mut properties = BTreeMap::new();
        properties.insert(
            columns.municipality.clone(),
            AttributeValue::from(self.key.municipality.as_str()),
        );
        properties.insert(
            columns.state.clone(),
            AttributeValue::from(self.key.state.as_str()),
        );
        properties.insert(
            POPULATION_FIELD.to_owned(),
            AttributeValue::Number(self.population),
        );
        for (name, value) in &self.counts {
            properties.insert(name.clone(), AttributeValue::Number(*value));
        }
        for (name, value) in &self.passthrough {
            properties.insert(name.clone(), value.clone());
        }
        TractFeature::new(self.geometry.clone(), properties)
    }
}

#[derive(Default)]
struct Group<'a> {
    geometries: Vec<&'a MultiPolygon<f64>>,
    population: f64,
    counts: BTreeMap<String, f64>,
    passthrough: BTreeMap<String, AttributeValue>,
}

/// Dissolves `urban` tracts by `(municipality, state)`.
///
/// Tracts missing either key are skipped (and logged). The result is
/// ordered by key and every geometry is valid.
#[must_use]
pub fn dissolve(urban: &TractLayer, columns: &DissolveColumns) -> Vec<Footprint> {
    let mut skipped = 0_usize;

    let groups = urban
        .features
        .iter()
        .filter_map(|feature| {
            let key = columns.key(feature);
            if key.is_none() {
                skipped += 1;
            }
            key.map(|key| (key, feature))
        })
        .fold(
            BTreeMap::<FootprintKey, Group<'_>>::new(),
            |mut acc, (key, feature)| {
                let group = acc.entry(key).or_default();
                group.geometries.push(&feature.geometry);
                group.population += feature.number(&columns.population).unwrap_or(0.0);
                for name in &columns.counts {
                    *group.counts.entry(name.clone()).or_insert(0.0) +=
                        feature.number(name).unwrap_or(0.0);
                }
                for name in &columns.passthrough {
                    if let Some(value) = feature.get(name)
                        && !value.is_missing()
                    {
                        group
                            .passthrough
                            .entry(name.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
                acc
            },
        );

    if skipped > 0 {
        log::warn!("Skipped {skipped} urban tracts without municipality or state");
    }

    let footprints: Vec<Footprint> = groups
        .into_iter()
        .map(|(key, group)| {
            let tract_count = group.geometries.len();
            let union = unary_union(group.geometries.iter().copied());
            Footprint {
                key,
                geometry: repair(&union),
                population: group.population,
                counts: group.counts,
                passthrough: group.passthrough,
                tract_count,
            }
        })
        .collect();

    log::info!(
        "Dissolved {} urban tracts into {} municipal footprints",
        urban.len() - skipped,
        footprints.len()
    );

    footprints
}
