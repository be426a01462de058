#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Income quintiles within each municipality.
//!
//! The tracts of a municipality are ranked by harmonized per-capita income
//! and cut at the 20/40/60/80 % quantiles (linear interpolation between
//! order statistics, right-closed bins, the minimum in the first bin).
//! Municipalities with too few valued tracts get no quintiles. The first
//! and fifth quintiles are the extremes the income maps compare.

use std::collections::BTreeMap;

use midcity_config::PipelineConfig;
use midcity_tract_models::{AttributeValue, MissingField, TractLayer};
use thiserror::Error;

/// Number of the poorest quintile.
pub const LOWEST: u8 = 1;
/// Number of the richest quintile.
pub const HIGHEST: u8 = 5;

const QUINTILES: usize = 5;

/// Errors that can occur while computing quintiles.
#[derive(Debug, Error)]
pub enum QuintileError {
    /// A required column is missing from the tract layer.
    #[error("{field} column: {source}")]
    MissingField {
        /// Logical field name.
        field: &'static str,
        /// The candidates that were tried.
        source: MissingField,
    },
}

/// Quintile edges of one municipality: minimum, the four cut points and
/// maximum.
pub type QuintileEdges = [f64; QUINTILES + 1];

/// Assigns per-municipality income quintiles to tracts.
#[derive(Debug, Clone)]
pub struct QuintileClassifier {
    value_field: String,
    group_candidates: Vec<String>,
    output_field: String,
    min_group_size: usize,
}

/// A classified layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Quintiles {
    /// The input layer with the quintile column added (missing where no
    /// quintile applies).
    pub layer: TractLayer,
    /// Name of the quintile column.
    pub output_field: String,
    /// Edges per municipality that received quintiles.
    pub edges: BTreeMap<String, QuintileEdges>,
    /// Municipalities skipped for having too few values.
    pub skipped_groups: usize,
}

impl QuintileClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(
        value_field: impl Into<String>,
        group_candidates: Vec<String>,
        output_field: impl Into<String>,
        min_group_size: usize,
    ) -> Self {
        Self {
            value_field: value_field.into(),
            group_candidates,
            output_field: output_field.into(),
            min_group_size,
        }
    }

    /// Classifies the harmonized income column by municipality, as
    /// configured.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.harmonize.output_field.clone(),
            config.fields.municipality.clone(),
            config.quintiles.output_field.clone(),
            config.quintiles.min_group_size,
        )
    }

    /// Computes quintiles for every municipality of `layer`.
    ///
    /// Tracts without a municipality or without a numeric value get a
    /// missing quintile and do not count towards the group size.
    ///
    /// # Errors
    ///
    /// Returns [`QuintileError::MissingField`] if the value or the
    /// municipality column is absent.
    pub fn classify(&self, layer: &TractLayer) -> Result<Quintiles, QuintileError> {
        let value_field = layer
            .require_field(&[self.value_field.as_str()])
            .map_err(|source| QuintileError::MissingField {
                field: "value",
                source,
            })?;
        let group_field = layer.require_field(&self.group_candidates).map_err(|source| {
            QuintileError::MissingField {
                field: "municipality",
                source,
            }
        })?;

        let groups = layer
            .features
            .iter()
            .filter_map(|f| Some((f.text(&group_field)?, f.number(&value_field)?)))
            .fold(BTreeMap::<String, Vec<f64>>::new(), |mut acc, (group, value)| {
                acc.entry(group).or_default().push(value);
                acc
            });

        let mut edges = BTreeMap::new();
        let mut skipped_groups = 0_usize;
        for (group, mut values) in groups {
            if values.len() < self.min_group_size {
                log::debug!(
                    "{group}: {} valued tracts, fewer than {}; no quintiles",
                    values.len(),
                    self.min_group_size
                );
                skipped_groups += 1;
                continue;
            }
            values.sort_by(f64::total_cmp);
            if let Some(group_edges) = quintile_edges(&values) {
                edges.insert(group, group_edges);
            }
        }

        let mut out = layer.clone();
        for feature in &mut out.features {
            let quintile = feature
                .text(&group_field)
                .and_then(|group| edges.get(&group))
                .zip(feature.number(&value_field))
                .map(|(group_edges, value)| f64::from(quintile_of(value, group_edges)));
            feature.set(self.output_field.clone(), AttributeValue::from(quintile));
        }

        log::info!(
            "Quintiles of '{value_field}' for {} municipalities ({skipped_groups} skipped)",
            edges.len()
        );

        Ok(Quintiles {
            layer: out,
            output_field: self.output_field.clone(),
            edges,
            skipped_groups,
        })
    }
}

impl Quintiles {
    /// Tracts in quintile `quintile`.
    #[must_use]
    pub fn quintile(&self, quintile: u8) -> TractLayer {
        let target = f64::from(quintile);
        self.layer.filtered(|f| {
            f.number(&self.output_field)
                .is_some_and(|q| (q - target).abs() < 0.5)
        })
    }

    /// Tracts of the poorest quintile.
    #[must_use]
    pub fn lowest(&self) -> TractLayer {
        self.quintile(LOWEST)
    }

    /// Tracts of the richest quintile.
    #[must_use]
    pub fn highest(&self) -> TractLayer {
        self.quintile(HIGHEST)
    }
}

/// Quantile edges at 0, 20, 40, 60, 80 and 100 % of `sorted`, linearly
/// interpolated between order statistics. Returns `None` for an empty
/// slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn quintile_edges(sorted: &[f64]) -> Option<QuintileEdges> {
    let last = sorted.len().checked_sub(1)?;

    let mut edges = [0.0; QUINTILES + 1];
    for (i, edge) in edges.iter_mut().enumerate() {
        let position = last as f64 * i as f64 / QUINTILES as f64;
        let lo = position.floor() as usize;
        let hi = (lo + 1).min(last);
        *edge = (position - lo as f64).mul_add(sorted[hi] - sorted[lo], sorted[lo]);
    }
    Some(edges)
}

/// The first quintile whose upper edge is at least `value`.
#[must_use]
pub fn quintile_of(value: f64, edges: &QuintileEdges) -> u8 {
    (LOWEST..=HIGHEST)
        .find(|&q| value <= edges[usize::from(q)])
        .unwrap_or(HIGHEST)
}

#[cfg(test)]
mod tests {
    use geo::MultiPolygon;
    use midcity_tract_models::{Crs, TractFeature};

    use super::*;

    fn tract(municipality: &str, value: Option<f64>) -> TractFeature {
        let mut props = BTreeMap::new();
        props.insert("NM_MUN".to_owned(), AttributeValue::from(municipality));
        props.insert("RpC_2010".to_owned(), AttributeValue::from(value));
        TractFeature::new(MultiPolygon::new(vec![]), props)
    }

    fn classify(features: Vec<TractFeature>) -> Quintiles {
        QuintileClassifier::from_config(&PipelineConfig::default())
            .classify(&TractLayer::new(Crs::Geographic, features))
            .unwrap()
    }

    fn quintile(out: &Quintiles, index: usize) -> Option<f64> {
        out.layer.features[index].number("Quintil")
    }

    #[test]
    fn interpolates_edges() {
        let edges = quintile_edges(&[10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();
        let expected = [10.0, 18.0, 26.0, 34.0, 42.0, 50.0];
        for (a, b) in edges.iter().zip(expected) {
            assert!((a - b).abs() < 1e-9, "{edges:?}");
        }
        assert!(quintile_edges(&[]).is_none());
    }

    #[test]
    fn five_values_fill_five_quintiles() {
        let out = classify(
            [30.0, 10.0, 50.0, 20.0, 40.0]
                .into_iter()
                .map(|v| tract("Palmas", Some(v)))
                .collect(),
        );
        let got: Vec<_> = (0..5).map(|i| quintile(&out, i)).collect();
        assert_eq!(got, vec![Some(3.0), Some(1.0), Some(5.0), Some(2.0), Some(4.0)]);
    }

    #[test]
    fn minimum_lands_in_first_quintile_and_bins_are_right_closed() {
        let edges = quintile_edges(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]).unwrap();
        assert_eq!(quintile_of(1.0, &edges), 1);
        assert_eq!(quintile_of(edges[1], &edges), 1);
        assert_eq!(quintile_of(edges[1] + 1e-9, &edges), 2);
        assert_eq!(quintile_of(10.0, &edges), 5);
    }

    #[test]
    fn small_municipalities_get_no_quintile() {
        let mut features: Vec<_> = (1..=4).map(|v| tract("Gurupi", Some(f64::from(v)))).collect();
        features.extend((1..=5).map(|v| tract("Palmas", Some(f64::from(v)))));

        let out = classify(features);
        for i in 0..4 {
            assert_eq!(out.layer.features[i].get("Quintil"), Some(&AttributeValue::Missing));
        }
        assert_eq!(quintile(&out, 4), Some(1.0));
        assert_eq!(out.skipped_groups, 1);
        assert_eq!(out.edges.len(), 1);
    }

    #[test]
    fn missing_values_do_not_count_towards_group_size() {
        let mut features: Vec<_> = (1..=4).map(|v| tract("Gurupi", Some(f64::from(v)))).collect();
        features.push(tract("Gurupi", None));

        let out = classify(features);
        assert!((0..5).all(|i| quintile(&out, i).is_none()));
        assert_eq!(out.skipped_groups, 1);
    }

    #[test]
    fn municipalities_are_ranked_independently() {
        let mut features: Vec<_> = (1..=5).map(|v| tract("Palmas", Some(f64::from(v)))).collect();
        features.extend((1..=5).map(|v| tract("Araguaina", Some(f64::from(v) * 1000.0))));

        let out = classify(features);
        assert_eq!(quintile(&out, 0), Some(1.0));
        assert_eq!(quintile(&out, 5), Some(1.0));
        assert_eq!(quintile(&out, 9), Some(5.0));
    }

    #[test]
    fn selects_extreme_quintiles() {
        let out = classify(
            (1..=10)
                .map(|v| tract("Palmas", Some(f64::from(v))))
                .chain([tract("Palmas", None)])
                .collect(),
        );

        let lowest: Vec<_> = out.lowest().features.iter().filter_map(|f| f.number("RpC_2010")).collect();
        let highest: Vec<_> = out.highest().features.iter().filter_map(|f| f.number("RpC_2010")).collect();
        assert_eq!(lowest, vec![1.0, 2.0]);
        assert_eq!(highest, vec![9.0, 10.0]);
        assert_eq!(out.quintile(3).len(), 2);
    }

    #[test]
    fn missing_value_column_is_an_error() {
        let mut props = BTreeMap::new();
        props.insert("NM_MUN".to_owned(), AttributeValue::from("Palmas"));
        let layer = TractLayer::new(
            Crs::Geographic,
            vec![TractFeature::new(MultiPolygon::new(vec![]), props)],
        );

        let err = QuintileClassifier::from_config(&PipelineConfig::default())
            .classify(&layer)
            .unwrap_err();
        assert!(matches!(err, QuintileError::MissingField { field: "value", .. }));
    }
}
