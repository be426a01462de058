//! Pairwise intersection of two polygon sets.

use geo::{Area, BooleanOps, MultiPolygon};
use midcity_spatial::EnvelopeIndex;
use midcity_tract_models::progress::ProgressCallback;

/// One target/source pair with a positive intersection area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRow {
    /// Index into the target geometries.
    pub target: usize,
    /// Index into the source geometries.
    pub source: usize,
    /// Area of the intersection.
    pub intersection_area: f64,
    /// Area of the whole source polygon.
    pub source_area: f64,
}

impl OverlayRow {
    /// Fraction of the source polygon lying inside the target.
    #[must_use]
    pub fn proportion(&self) -> f64 {
        self.intersection_area / self.source_area
    }
}

/// Intersects every target with every source whose bounding box it
/// touches and returns the pairs with positive intersection area, ordered
/// by `(target, source)`.
///
/// Both sets must be in the same planar, equal-area coordinates.
#[must_use]
pub fn overlay(
    targets: &[MultiPolygon<f64>],
    sources: &[MultiPolygon<f64>],
    progress: &dyn ProgressCallback,
) -> Vec<OverlayRow> {
    let index = EnvelopeIndex::build(sources);
    let source_areas: Vec<f64> = sources.iter().map(Area::unsigned_area).collect();

    log::debug!(
        "Overlaying {} targets against {} indexed sources",
        targets.len(),
        index.size()
    );

    progress.set_total(targets.len() as u64);
    progress.set_message("Overlaying tracts".to_owned());

    let mut rows = Vec::new();
    for (target, target_geom) in targets.iter().enumerate() {
        for source in index.candidates(target_geom) {
            let intersection_area = target_geom.intersection(&sources[source]).unsigned_area();
            if intersection_area > 0.0 {
                rows.push(OverlayRow {
                    target,
                    source,
                    intersection_area,
                    source_area: source_areas[source],
                });
            }
        }
        progress.inc(1);
    }

    progress.finish(format!("{} overlay rows", rows.len()));
    rows
}
