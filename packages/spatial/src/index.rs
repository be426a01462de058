//! R-tree over polygon bounding boxes.
//!
//! The index only answers "which polygons might touch this one"; callers
//! confirm candidates with an exact geometric predicate.

use geo::{BoundingRect, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

/// A polygon's bounding box stored in the R-tree with its position in the
/// source slice.
struct EnvelopeEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EnvelopeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bounding-box index over a slice of polygons.
pub struct EnvelopeIndex {
    tree: RTree<EnvelopeEntry>,
}

impl EnvelopeIndex {
    /// Bulk-loads an index over `geometries`. Empty geometries are not
    /// indexed.
    #[must_use]
    pub fn build(geometries: &[MultiPolygon<f64>]) -> Self {
        let entries: Vec<EnvelopeEntry> = geometries
            .iter()
            .enumerate()
            .filter_map(|(index, geometry)| {
                compute_envelope(geometry).map(|envelope| EnvelopeEntry { index, envelope })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed geometries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Indexes of geometries whose bounding box intersects (or touches)
    /// the bounding box of `geometry`, in ascending order.
    #[must_use]
    pub fn candidates(&self, geometry: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(query) = compute_envelope(geometry) else {
            return Vec::new();
        };

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// All unordered pairs `(i, j)` with `i < j` whose bounding boxes
    /// intersect, sorted.
    #[must_use]
    pub fn candidate_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for entry in self.tree.iter() {
            for other in self.tree.locate_in_envelope_intersecting(&entry.envelope) {
                if entry.index < other.index {
                    pairs.push((entry.index, other.index));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon};

    use super::*;

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(x, y), (x + 1.0, y), (x + 1.0, y + 1.0), (x, y + 1.0)]),
            vec![],
        )])
    }

    #[test]
    fn skips_empty_geometries() {
        let index = EnvelopeIndex::build(&[square(0.0, 0.0), MultiPolygon::new(vec![])]);
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn finds_touching_boxes() {
        let geoms = [square(0.0, 0.0), square(1.0, 0.0), square(5.0, 5.0)];
        let index = EnvelopeIndex::build(&geoms);
        assert_eq!(index.candidates(&square(0.5, 0.0)), vec![0, 1]);
        assert_eq!(index.candidate_pairs(), vec![(0, 1)]);
    }

    #[test]
    fn corner_contact_is_a_candidate() {
        let geoms = [square(0.0, 0.0), square(1.0, 1.0)];
        let index = EnvelopeIndex::build(&geoms);
        assert_eq!(index.candidate_pairs(), vec![(0, 1)]);
    }
}
