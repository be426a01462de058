//! Contiguity graph between footprints.
//!
//! Built in two phases: the envelope R-tree proposes every pair whose
//! bounding boxes touch, then each pair is confirmed with an exact
//! predicate for the configured [`ContiguityRule`].

use geo::{Area, BooleanOps, Coord, Intersects, Line, LinesIter, MultiPolygon};
use midcity_spatial::EnvelopeIndex;
use midcity_tract_models::ContiguityRule;

/// Relative tolerance for collinearity and overlap tests.
const EPSILON: f64 = 1e-9;

/// Undirected adjacency list over footprint indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyGraph {
    neighbors: Vec<Vec<usize>>,
}

impl AdjacencyGraph {
    /// Builds the graph for `geometries` under `rule`.
    #[must_use]
    pub fn build(geometries: &[MultiPolygon<f64>], rule: ContiguityRule) -> Self {
        let index = EnvelopeIndex::build(geometries);
        let candidates = index.candidate_pairs();
        let edges: Vec<(usize, usize)> = candidates
            .iter()
            .copied()
            .filter(|&(a, b)| are_adjacent(&geometries[a], &geometries[b], rule))
            .collect();

        log::debug!(
            "{rule} contiguity: {} candidate pairs, {} confirmed",
            candidates.len(),
            edges.len()
        );

        Self::from_edges(geometries.len(), &edges)
    }

    /// Builds a graph from an explicit edge list.
    #[must_use]
    pub fn from_edges(node_count: usize, edges: &[(usize, usize)]) -> Self {
        let mut neighbors = vec![Vec::new(); node_count];
        for &(a, b) in edges {
            if a == b {
                continue;
            }
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        Self { neighbors }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Neighbours of `node`, ascending.
    #[must_use]
    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.neighbors
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every edge once, as `(a, b)` with `a < b`, sorted.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.neighbors.iter().enumerate().flat_map(|(a, list)| {
            list.iter()
                .copied()
                .filter(move |&b| a < b)
                .map(move |b| (a, b))
        })
    }
}

/// Exact adjacency test between two footprints.
#[must_use]
pub fn are_adjacent(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>, rule: ContiguityRule) -> bool {
    if !a.intersects(b) {
        return false;
    }
    match rule {
        ContiguityRule::Queen => true,
        ContiguityRule::Rook => shares_edge(a, b) || a.intersection(b).unsigned_area() > 0.0,
    }
}

/// Whether some boundary segment of `a` overlaps a boundary segment of
/// `b` along a stretch of positive length.
fn shares_edge(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    let b_lines: Vec<Line<f64>> = b.lines_iter().collect();
    a.lines_iter()
        .any(|la| b_lines.iter().any(|lb| collinear_overlap(la, *lb)))
}

fn collinear_overlap(a: Line<f64>, b: Line<f64>) -> bool {
    let d = a.delta();
    let len2 = d.x.mul_add(d.x, d.y * d.y);
    if len2 <= 0.0 {
        return false;
    }

    let cross = |p: Coord<f64>| {
        let v = p - a.start;
        d.x.mul_add(v.y, -(d.y * v.x))
    };
    let tolerance = EPSILON * len2;
    if cross(b.start).abs() > tolerance || cross(b.end).abs() > tolerance {
        return false;
    }

    let param = |p: Coord<f64>| {
        let v = p - a.start;
        d.x.mul_add(v.x, d.y * v.y) / len2
    };
    let (t0, t1) = {
        let (s, e) = (param(b.start), param(b.end));
        if s <= e { (s, e) } else { (e, s) }
    };
    let overlap = t1.min(1.0) - t0.max(0.0);
    overlap > EPSILON
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon};

    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]),
            vec![],
        )])
    }

    #[test]
    fn shared_edge_is_adjacent_under_both_rules() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.0, 2.0, 1.0);
        assert!(are_adjacent(&a, &b, ContiguityRule::Queen));
        assert!(are_adjacent(&a, &b, ContiguityRule::Rook));
    }

    #[test]
    fn partial_edge_counts_for_rook() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.5, 2.0, 3.0);
        assert!(are_adjacent(&a, &b, ContiguityRule::Rook));
    }

    #[test]
    fn corner_contact_is_queen_only() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 1.0, 2.0, 2.0);
        assert!(are_adjacent(&a, &b, ContiguityRule::Queen));
        assert!(!are_adjacent(&a, &b, ContiguityRule::Rook));
    }

    #[test]
    fn overlap_is_adjacent() {
        let a = rect(0.0, 0.0, 2.0, 2.0);
        let b = rect(1.0, 1.0, 3.0, 3.0);
        assert!(are_adjacent(&a, &b, ContiguityRule::Queen));
        assert!(are_adjacent(&a, &b, ContiguityRule::Rook));
    }

    #[test]
    fn separated_is_not_adjacent() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.5, 0.0, 2.0, 1.0);
        assert!(!are_adjacent(&a, &b, ContiguityRule::Queen));
        assert!(!are_adjacent(&a, &b, ContiguityRule::Rook));
    }

    #[test]
    fn builds_graph_from_index_candidates() {
        let geoms = vec![
            rect(0.0, 0.0, 1.0, 1.0),
            rect(1.0, 0.0, 2.0, 1.0),
            rect(10.0, 10.0, 11.0, 11.0),
            rect(2.0, 1.0, 3.0, 2.0),
        ];

        let queen = AdjacencyGraph::build(&geoms, ContiguityRule::Queen);
        assert_eq!(queen.node_count(), 4);
        assert_eq!(queen.edges().collect::<Vec<_>>(), vec![(0, 1), (1, 3)]);
        assert_eq!(queen.neighbors(1), &[0, 3]);
        assert!(queen.neighbors(2).is_empty());

        let rook = AdjacencyGraph::build(&geoms, ContiguityRule::Rook);
        assert_eq!(rook.edge_count(), 1);
    }

    #[test]
    fn from_edges_ignores_loops_and_duplicates() {
        let graph = AdjacencyGraph::from_edges(3, &[(0, 1), (1, 0), (2, 2)]);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.neighbors(2).is_empty());
        assert!(graph.neighbors(7).is_empty());
    }
}
