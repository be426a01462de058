//! Geometry repair.
//!
//! Invalid tract polygons (self-intersecting rings, overlapping parts) are
//! rebuilt with a unary union, which behaves like a zero-distance buffer:
//! overlapping parts merge, and of a bowtie ring only the lobe wound like
//! the ring as a whole survives. Valid geometries are returned untouched.

use geo::{MultiPolygon, Validation, unary_union};
use midcity_tract_models::TractLayer;

/// Returns a valid version of `geometry`.
#[must_use]
pub fn repair(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if geometry.is_valid() {
        return geometry.clone();
    }
    unary_union(geometry.0.iter())
}

/// Repairs every invalid geometry in `layer` in place.
///
/// Returns the number of geometries that were rebuilt.
pub fn repair_layer(layer: &mut TractLayer) -> usize {
    let mut repaired = 0;
    for feature in layer.features.iter_mut().filter(|f| !f.geometry.is_valid()) {
        feature.geometry = repair(&feature.geometry);
        repaired += 1;
    }
    if repaired > 0 {
        log::debug!("Repaired {repaired} invalid geometries");
    }
    repaired
}

#[cfg(test)]
mod tests {
    use geo::{Area, LineString, Polygon};

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(x, y), (x + size, y), (x + size, y + size), (x, y + size)]),
            vec![],
        )
    }

    #[test]
    fn leaves_valid_geometry_untouched() {
        let mp = MultiPolygon::new(vec![square(0.0, 0.0, 1.0)]);
        assert_eq!(repair(&mp), mp);
    }

    #[test]
    fn bowtie_keeps_one_lobe() {
        let bowtie = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]),
            vec![],
        );
        let mp = MultiPolygon::new(vec![bowtie]);
        assert!(!mp.is_valid());

        let fixed = repair(&mp);
        assert!(fixed.is_valid());
        assert_eq!(fixed.0.len(), 1);
        assert!((fixed.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn repairs_only_invalid_layer_features() {
        use midcity_tract_models::{Crs, TractFeature};

        let bowtie = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]),
            vec![],
        );
        let valid = MultiPolygon::new(vec![square(5.0, 5.0, 1.0)]);
        let mut layer = TractLayer::new(
            Crs::Geographic,
            vec![
                TractFeature::new(valid.clone(), std::collections::BTreeMap::new()),
                TractFeature::new(
                    MultiPolygon::new(vec![bowtie]),
                    std::collections::BTreeMap::new(),
                ),
            ],
        );

        assert_eq!(repair_layer(&mut layer), 1);
        assert_eq!(layer.features[0].geometry, valid);
        assert!(layer.features[1].geometry.is_valid());
    }

    #[test]
    fn merges_overlapping_parts() {
        let mp = MultiPolygon::new(vec![square(0.0, 0.0, 2.0), square(1.0, 1.0, 2.0)]);
        assert!(!mp.is_valid());

        let fixed = repair(&mp);
        assert!(fixed.is_valid());
        assert!((fixed.unsigned_area() - 7.0).abs() < 1e-9);
    }
}
