#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Areal interpolation of a tract attribute between census geographies.
//!
//! The 2010 and 2022 tract meshes do not line up, so 2010 per-capita
//! income is carried onto 2022 tracts by overlap: each 2010 polygon gives
//! every 2022 tract it intersects the share of its value proportional to
//! the share of its area inside that tract. Areas are measured in an
//! equal-area projection; the result is attached to the untouched input
//! 2022 layer.

pub mod overlay;

use std::collections::BTreeMap;

use midcity_config::PipelineConfig;
use midcity_spatial::{ProjectionError, repair_layer, to_equal_area};
use midcity_tract_models::progress::{NullProgress, ProgressCallback};
use midcity_tract_models::{AlbersParams, AttributeValue, MissingField, TractId, TractLayer};
use thiserror::Error;

pub use overlay::{OverlayRow, overlay};

/// Errors that can occur during harmonization.
#[derive(Debug, Error)]
pub enum HarmonizeError {
    /// A required column is missing from one of the layers.
    #[error("{layer} layer: {source}")]
    MissingField {
        /// Which layer (`"target"` or `"source"`).
        layer: &'static str,
        /// The candidates that were tried.
        source: MissingField,
    },

    /// No target polygon overlaps any source polygon.
    ///
    /// This almost always means the layers use different coordinate
    /// references or cover different regions.
    #[error(
        "Empty overlay between {targets} target and {sources} source polygons; \
         check that the layers overlap and their coordinate references are correct"
    )]
    EmptyOverlay {
        /// Number of target features.
        targets: usize,
        /// Number of source features.
        sources: usize,
    },

    /// A layer could not be reprojected into the equal-area system.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Counters describing one harmonization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarmonizeReport {
    /// Target/source pairs with a positive intersection area.
    pub overlay_rows: usize,
    /// Overlay rows discarded because the source area was not positive.
    pub dropped_zero_area: usize,
    /// Overlay rows whose source value was missing (counted as zero).
    pub missing_source_value: usize,
    /// Target features that received a value.
    pub matched: usize,
    /// Target features left missing.
    pub unmatched: usize,
    /// Invalid target geometries repaired before the overlay.
    pub repaired_target: usize,
    /// Invalid source geometries repaired before the overlay.
    pub repaired_source: usize,
}

/// Transfers a numeric attribute from a source tract layer onto a target
/// tract layer by area weighting.
#[derive(Debug, Clone)]
pub struct Harmonizer {
    projection: AlbersParams,
    id_candidates: Vec<String>,
    source_value_field: String,
    output_field: String,
}

impl Harmonizer {
    /// Creates a harmonizer.
    #[must_use]
    pub fn new(
        projection: AlbersParams,
        id_candidates: Vec<String>,
        source_value_field: impl Into<String>,
        output_field: impl Into<String>,
    ) -> Self {
        Self {
            projection,
            id_candidates,
            source_value_field: source_value_field.into(),
            output_field: output_field.into(),
        }
    }

    /// Creates a harmonizer from the pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.projection,
            config.fields.tract_id.clone(),
            config.harmonize.source_value_field.clone(),
            config.harmonize.output_field.clone(),
        )
    }

    /// Overrides the source value column.
    #[must_use]
    pub fn with_source_value_field(mut self, field: impl Into<String>) -> Self {
        self.source_value_field = field.into();
        self
    }

    /// Name of the column written on the target layer.
    #[must_use]
    pub fn output_field(&self) -> &str {
        &self.output_field
    }

    /// Runs the harmonization without progress reporting.
    ///
    /// # Errors
    ///
    /// See [`Self::harmonize_with_progress`].
    pub fn harmonize(
        &self,
        target: &TractLayer,
        source: &TractLayer,
    ) -> Result<(TractLayer, HarmonizeReport), HarmonizeError> {
        self.harmonize_with_progress(target, source, &NullProgress)
    }

    /// Returns a copy of `target` (original geometry and coordinate
    /// reference) with the harmonized value in the output column.
    ///
    /// For each target tract the value is
    /// `sum(intersection_area / source_area * source_value)` over the
    /// source polygons it intersects. A missing source value adds zero, so
    /// a tract overlapped only by sources without a value gets 0. Tracts
    /// with no positive-area overlap at all get a missing value.
    ///
    /// # Errors
    ///
    /// Returns [`HarmonizeError::MissingField`] if the target has no id
    /// column or the source has no value column,
    /// [`HarmonizeError::Projection`] if a layer cannot be reprojected and
    /// [`HarmonizeError::EmptyOverlay`] if the layers do not overlap at all.
    pub fn harmonize_with_progress(
        &self,
        target: &TractLayer,
        source: &TractLayer,
        progress: &dyn ProgressCallback,
    ) -> Result<(TractLayer, HarmonizeReport), HarmonizeError> {
        let id_field = target
            .require_field(&self.id_candidates)
            .map_err(|source| HarmonizeError::MissingField {
                layer: "target",
                source,
            })?;
        let value_field = source
            .require_field(&[self.source_value_field.as_str()])
            .map_err(|source| HarmonizeError::MissingField {
                layer: "source",
                source,
            })?;

        log::info!(
            "Harmonizing '{value_field}' from {} source onto {} target tracts",
            source.len(),
            target.len()
        );

        let mut report = HarmonizeReport::default();

        let mut target_eq = to_equal_area(target, &self.projection)?;
        let mut source_eq = to_equal_area(source, &self.projection)?;
        report.repaired_target = repair_layer(&mut target_eq);
        report.repaired_source = repair_layer(&mut source_eq);

        let target_geoms: Vec<_> = target_eq.features.into_iter().map(|f| f.geometry).collect();
        let source_geoms: Vec<_> = source_eq.features.into_iter().map(|f| f.geometry).collect();

        let rows = overlay(&target_geoms, &source_geoms, progress);
        if rows.is_empty() {
            return Err(HarmonizeError::EmptyOverlay {
                targets: target.len(),
                sources: source.len(),
            });
        }
        report.overlay_rows = rows.len();

        let target_ids: Vec<Option<TractId>> = target
            .features
            .iter()
            .map(|f| f.tract_id(&id_field))
            .collect();
        let source_values: Vec<Option<f64>> = source
            .features
            .iter()
            .map(|f| f.number(&value_field))
            .collect();

        let sums = weighted_sums(&rows, &target_ids, &source_values, &mut report);

        let mut out = target.clone();
        for (feature, id) in out.features.iter_mut().zip(&target_ids) {
            let value = id.as_ref().and_then(|id| sums.get(id)).copied();
            if value.is_some() {
                report.matched += 1;
            } else {
                report.unmatched += 1;
            }
            feature.set(self.output_field.clone(), AttributeValue::from(value));
        }

        log::info!(
            "{}: {} overlay rows, {} tracts matched, {} left missing",
            self.output_field,
            report.overlay_rows,
            report.matched,
            report.unmatched
        );
        if report.dropped_zero_area > 0 {
            log::warn!(
                "Dropped {} overlay rows with non-positive source area",
                report.dropped_zero_area
            );
        }
        if report.missing_source_value > 0 {
            log::warn!(
                "{} overlay rows had no '{value_field}' value",
                report.missing_source_value
            );
        }

        Ok((out, report))
    }
}

/// Folds overlay rows into per-target-id sums of
/// `intersection_area / source_area * source_value`.
///
/// Rows with a non-positive source area are skipped. A row with a missing
/// source value adds zero but still puts its id in the result, so only
/// ids without any usable row are absent.
fn weighted_sums(
    rows: &[OverlayRow],
    target_ids: &[Option<TractId>],
    source_values: &[Option<f64>],
    report: &mut HarmonizeReport,
) -> BTreeMap<TractId, f64> {
    let mut sums = BTreeMap::new();

    for row in rows {
        if row.source_area <= 0.0 {
            report.dropped_zero_area += 1;
            continue;
        }
        let Some(id) = target_ids.get(row.target).and_then(Option::as_ref) else {
            continue;
        };
        let sum = sums.entry(id.clone()).or_insert(0.0);
        match source_values.get(row.source).copied().flatten() {
            Some(value) => *sum += row.proportion() * value,
            None => report.missing_source_value += 1,
        }
    }

    sums
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use geo::{LineString, MultiPolygon, Polygon};
    use midcity_tract_models::{Crs, TractFeature};

    use super::*;

    fn albers() -> Crs {
        Crs::albers(&AlbersParams::BRAZIL)
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]),
            vec![],
        )])
    }

    fn target(id: &str, geometry: MultiPolygon<f64>) -> TractFeature {
        let mut props = BTreeMap::new();
        props.insert("CD_SETOR".to_owned(), AttributeValue::from(id));
        TractFeature::new(geometry, props)
    }

    fn source(value: Option<f64>, geometry: MultiPolygon<f64>) -> TractFeature {
        let mut props = BTreeMap::new();
        props.insert("RpC".to_owned(), AttributeValue::from(value));
        TractFeature::new(geometry, props)
    }

    fn harmonizer() -> Harmonizer {
        Harmonizer::from_config(&PipelineConfig::default())
    }

    fn output(layer: &TractLayer, index: usize) -> Option<f64> {
        layer.features[index].number("RpC_2010")
    }

    #[test]
    fn full_coverage_transfers_value() {
        let t = TractLayer::new(albers(), vec![target("1", rect(0.0, 0.0, 100.0, 100.0))]);
        let s = TractLayer::new(albers(), vec![source(Some(1234.5), rect(0.0, 0.0, 100.0, 100.0))]);

        let (out, report) = harmonizer().harmonize(&t, &s).unwrap();
        assert!((output(&out, 0).unwrap() - 1234.5).abs() < 1e-6);
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched, 0);
    }

    #[test]
    fn two_half_overlaps_average_values() {
        let t = TractLayer::new(albers(), vec![target("1", rect(0.0, 0.0, 100.0, 100.0))]);
        let s = TractLayer::new(
            albers(),
            vec![
                source(Some(800.0), rect(-50.0, 0.0, 50.0, 100.0)),
                source(Some(2000.0), rect(50.0, 0.0, 150.0, 100.0)),
            ],
        );

        let (out, report) = harmonizer().harmonize(&t, &s).unwrap();
        let expected = 0.5f64.mul_add(800.0, 0.5 * 2000.0);
        assert!((output(&out, 0).unwrap() - expected).abs() < 1e-6);
        assert_eq!(report.overlay_rows, 2);
    }

    #[test]
    fn source_split_between_targets() {
        let t = TractLayer::new(
            albers(),
            vec![
                target("1", rect(0.0, 0.0, 100.0, 100.0)),
                target("2", rect(100.0, 0.0, 200.0, 100.0)),
            ],
        );
        let s = TractLayer::new(albers(), vec![source(Some(1000.0), rect(25.0, 0.0, 125.0, 100.0))]);

        let (out, _) = harmonizer().harmonize(&t, &s).unwrap();
        assert!((output(&out, 0).unwrap() - 750.0).abs() < 1e-6);
        assert!((output(&out, 1).unwrap() - 250.0).abs() < 1e-6);
    }

    #[test]
    fn uncovered_target_is_missing_not_zero() {
        let t = TractLayer::new(
            albers(),
            vec![
                target("1", rect(0.0, 0.0, 100.0, 100.0)),
                target("2", rect(500.0, 500.0, 600.0, 600.0)),
            ],
        );
        let s = TractLayer::new(albers(), vec![source(Some(10.0), rect(0.0, 0.0, 100.0, 100.0))]);

        let (out, report) = harmonizer().harmonize(&t, &s).unwrap();
        assert_eq!(out.features[1].get("RpC_2010"), Some(&AttributeValue::Missing));
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn edge_contact_only_is_not_an_overlap() {
        let t = TractLayer::new(
            albers(),
            vec![
                target("1", rect(0.0, 0.0, 100.0, 100.0)),
                target("2", rect(100.0, 0.0, 200.0, 100.0)),
            ],
        );
        let s = TractLayer::new(albers(), vec![source(Some(10.0), rect(0.0, 0.0, 100.0, 100.0))]);

        let (out, _) = harmonizer().harmonize(&t, &s).unwrap();
        assert!(output(&out, 1).is_none());
    }

    #[test]
    fn empty_overlay_is_fatal() {
        let t = TractLayer::new(albers(), vec![target("1", rect(0.0, 0.0, 1.0, 1.0))]);
        let s = TractLayer::new(albers(), vec![source(Some(10.0), rect(50.0, 50.0, 51.0, 51.0))]);

        let err = harmonizer().harmonize(&t, &s).unwrap_err();
        assert!(matches!(
            err,
            HarmonizeError::EmptyOverlay {
                targets: 1,
                sources: 1
            }
        ));
    }

    #[test]
    fn missing_source_value_counts_as_zero() {
        let t = TractLayer::new(
            albers(),
            vec![
                target("1", rect(0.0, 0.0, 100.0, 100.0)),
                target("2", rect(100.0, 0.0, 200.0, 100.0)),
            ],
        );
        let s = TractLayer::new(
            albers(),
            vec![
                source(Some(10.0), rect(0.0, 0.0, 100.0, 100.0)),
                source(None, rect(100.0, 0.0, 200.0, 100.0)),
            ],
        );

        let (out, report) = harmonizer().harmonize(&t, &s).unwrap();
        assert!((output(&out, 0).unwrap() - 10.0).abs() < 1e-6);
        assert_eq!(output(&out, 1), Some(0.0));
        assert_eq!(report.missing_source_value, 1);
        assert_eq!(report.unmatched, 0);
    }

    #[test]
    fn missing_value_does_not_dilute_partial_coverage() {
        let t = TractLayer::new(albers(), vec![target("1", rect(0.0, 0.0, 100.0, 100.0))]);
        let s = TractLayer::new(
            albers(),
            vec![
                source(Some(400.0), rect(0.0, 0.0, 50.0, 100.0)),
                source(None, rect(50.0, 0.0, 100.0, 100.0)),
            ],
        );

        let (out, _) = harmonizer().harmonize(&t, &s).unwrap();
        assert!((output(&out, 0).unwrap() - 400.0).abs() < 1e-6);
    }

    #[test]
    fn missing_value_column_is_fatal() {
        let t = TractLayer::new(albers(), vec![target("1", rect(0.0, 0.0, 1.0, 1.0))]);
        let s = TractLayer::new(albers(), vec![source(Some(1.0), rect(0.0, 0.0, 1.0, 1.0))]);

        let err = harmonizer()
            .with_source_value_field("Renda")
            .harmonize(&t, &s)
            .unwrap_err();
        assert!(matches!(err, HarmonizeError::MissingField { layer: "source", .. }));
    }

    #[test]
    fn value_column_is_matched_case_insensitively() {
        let t = TractLayer::new(albers(), vec![target("1", rect(0.0, 0.0, 1.0, 1.0))]);
        let s = TractLayer::new(albers(), vec![source(Some(3.0), rect(0.0, 0.0, 1.0, 1.0))]);

        let (out, _) = harmonizer()
            .with_source_value_field("rpc")
            .harmonize(&t, &s)
            .unwrap();
        assert!((output(&out, 0).unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn missing_target_id_is_fatal() {
        let t = TractLayer::new(albers(), vec![source(Some(1.0), rect(0.0, 0.0, 1.0, 1.0))]);
        let s = TractLayer::new(albers(), vec![source(Some(1.0), rect(0.0, 0.0, 1.0, 1.0))]);

        let err = harmonizer().harmonize(&t, &s).unwrap_err();
        assert!(matches!(err, HarmonizeError::MissingField { layer: "target", .. }));
    }

    #[test]
    fn keeps_original_geometry_and_crs() {
        let square = rect(-47.90, -15.80, -47.89, -15.79);
        let t = TractLayer::new(Crs::Geographic, vec![target("1", square.clone())]);
        let s = TractLayer::new(Crs::Geographic, vec![source(Some(500.0), square.clone())]);

        let (out, _) = harmonizer().harmonize(&t, &s).unwrap();
        assert_eq!(out.crs, Crs::Geographic);
        assert_eq!(out.features[0].geometry, square);
        assert!((output(&out, 0).unwrap() - 500.0).abs() < 1e-3);
    }

    #[test]
    fn aligns_layers_declared_in_different_systems() {
        use midcity_spatial::Reprojector;

        let utm = Crs::from_epsg(31983).unwrap();
        let square = rect(500_000.0, 8_300_000.0, 501_000.0, 8_301_000.0);
        let geographic = Reprojector::new(&utm, &Crs::Geographic)
            .unwrap()
            .reproject(&square)
            .unwrap();

        let t = TractLayer::new(utm.clone(), vec![target("1", square.clone())]);
        let s = TractLayer::new(Crs::Geographic, vec![source(Some(900.0), geographic)]);

        let (out, _) = harmonizer().harmonize(&t, &s).unwrap();
        assert_eq!(out.crs, utm);
        assert_eq!(out.features[0].geometry, square);
        assert!((output(&out, 0).unwrap() - 900.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_layer_definition_is_fatal() {
        let bogus = Crs::Proj("+proj=nonexistent".to_owned());
        let t = TractLayer::new(bogus, vec![target("1", rect(0.0, 0.0, 1.0, 1.0))]);
        let s = TractLayer::new(albers(), vec![source(Some(1.0), rect(0.0, 0.0, 1.0, 1.0))]);

        assert!(matches!(
            harmonizer().harmonize(&t, &s),
            Err(HarmonizeError::Projection(_))
        ));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let t = TractLayer::new(
            albers(),
            vec![
                target("1", rect(0.0, 0.0, 100.0, 100.0)),
                target("2", rect(100.0, 0.0, 200.0, 100.0)),
            ],
        );
        let s = TractLayer::new(
            albers(),
            vec![
                source(Some(300.0), rect(-30.0, -10.0, 130.0, 60.0)),
                source(Some(700.0), rect(60.0, 40.0, 230.0, 120.0)),
            ],
        );

        let h = harmonizer();
        let (first, _) = h.harmonize(&t, &s).unwrap();
        let (second, _) = h.harmonize(&t, &s).unwrap();
        assert_eq!(first, second);

        let reversed = TractLayer::new(albers(), s.features.iter().rev().cloned().collect());
        let (third, _) = h.harmonize(&t, &reversed).unwrap();
        for i in 0..2 {
            assert!((output(&first, i).unwrap() - output(&third, i).unwrap()).abs() < 1e-6);
        }
    }

    #[test]
    fn duplicate_target_ids_share_the_group_sum() {
        let t = TractLayer::new(
            albers(),
            vec![
                target("1", rect(0.0, 0.0, 100.0, 100.0)),
                target("1", rect(100.0, 0.0, 200.0, 100.0)),
            ],
        );
        let s = TractLayer::new(albers(), vec![source(Some(100.0), rect(0.0, 0.0, 200.0, 100.0))]);

        let (out, _) = harmonizer().harmonize(&t, &s).unwrap();
        assert!((output(&out, 0).unwrap() - 100.0).abs() < 1e-6);
        assert!((output(&out, 1).unwrap() - 100.0).abs() < 1e-6);
    }
}
