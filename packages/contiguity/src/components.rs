//! Connected components of the contiguity graph.

use petgraph::unionfind::UnionFind;

use crate::adjacency::AdjacencyGraph;

/// Component label per node, numbered in order of each component's first
/// node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    labels: Vec<usize>,
    count: usize,
}

impl Components {
    /// Labels the connected components of `graph`.
    #[must_use]
    pub fn label(graph: &AdjacencyGraph) -> Self {
        let n = graph.node_count();
        let mut uf = UnionFind::<usize>::new(n);
        for (a, b) in graph.edges() {
            uf.union(a, b);
        }

        let mut root_labels = vec![usize::MAX; n];
        let mut labels = Vec::with_capacity(n);
        let mut count = 0;
        for node in 0..n {
            let root = uf.find_mut(node);
            if root_labels[root] == usize::MAX {
                root_labels[root] = count;
                count += 1;
            }
            labels.push(root_labels[root]);
        }

        Self { labels, count }
    }

    /// Number of components.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Component of `node`.
    #[must_use]
    pub fn of(&self, node: usize) -> Option<usize> {
        self.labels.get(node).copied()
    }

    /// Labels in node order.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Sums `weights` per component and counts members.
    ///
    /// Returns one `(total, members)` entry per component label.
    #[must_use]
    pub fn totals(&self, weights: &[f64]) -> Vec<(f64, usize)> {
        self.labels
            .iter()
            .zip(weights)
            .fold(vec![(0.0, 0); self.count], |mut acc, (&label, &weight)| {
                acc[label].0 += weight;
                acc[label].1 += 1;
                acc
            })
    }
}
