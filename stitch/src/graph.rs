//! The image graph: images as nodes, verified pairwise transforms as edges.
//!
//! Arena-style storage: nodes are input indices and edges live in one flat
//! list, so there are no ownership cycles between images and transforms.

use pano_core::{Error, Result};

use crate::homography::PairwiseTransform;

#[derive(Debug, Clone)]
pub struct ImageGraph {
    pub num_images: usize,
    pub edges: Vec<PairwiseTransform>,
    /// Per-node list of indices into `edges`.
    adjacency: Vec<Vec<usize>>,
}

impl ImageGraph {
    /// Simple undirected graph; every edge must come from a successful
    /// verification, which the verifier guarantees.
    pub fn new(num_images: usize, edges: Vec<PairwiseTransform>) -> Self {
        let mut adjacency = vec![Vec::new(); num_images];
        for (i, e) in edges.iter().enumerate() {
            adjacency[e.a].push(i);
            adjacency[e.b].push(i);
        }
        Self {
            num_images,
            edges,
            adjacency,
        }
    }

    /// Edge indices incident to `node`, with the node on the other end.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency[node].iter().map(move |&ei| {
            let e = &self.edges[ei];
            let other = if e.a == node { e.b } else { e.a };
            (ei, other)
        })
    }

    /// The reference image fixes the panorama orientation: highest total
    /// incident confidence, lowest index on ties, so the choice is
    /// deterministic under input permutation.
    pub fn reference(&self) -> usize {
        let mut totals = vec![0.0f64; self.num_images];
        for e in &self.edges {
            totals[e.a] += e.confidence;
            totals[e.b] += e.confidence;
        }

        let mut best = 0;
        for i in 1..self.num_images {
            if totals[i] > totals[best] {
                best = i;
            }
        }
        best
    }

    /// Nodes reachable from `node`, sorted ascending.
    pub fn component_of(&self, node: usize) -> Vec<usize> {
        let mut seen = vec![false; self.num_images];
        let mut stack = vec![node];
        seen[node] = true;
        while let Some(u) = stack.pop() {
            for (_, v) in self.neighbors(u) {
                if !seen[v] {
                    seen[v] = true;
                    stack.push(v);
                }
            }
        }
        (0..self.num_images).filter(|&i| seen[i]).collect()
    }

    /// Shortest-path tree from `root` with edge weight `1 / confidence`, so
    /// composition chains prefer the most reliable transforms. Returns, per
    /// node, the predecessor node and connecting edge index.
    pub fn shortest_path_tree(&self, root: usize) -> Vec<Option<(usize, usize)>> {
        let n = self.num_images;
        let mut dist = vec![f64::INFINITY; n];
        let mut pred: Vec<Option<(usize, usize)>> = vec![None; n];
        let mut done = vec![false; n];
        dist[root] = 0.0;

        // O(V^2) Dijkstra; image counts are small and this keeps the
        // traversal order deterministic.
        for _ in 0..n {
            let mut u = None;
            for i in 0..n {
                if !done[i] && dist[i].is_finite() {
                    match u {
                        None => u = Some(i),
                        Some(j) if dist[i] < dist[j] => u = Some(i),
                        _ => {}
                    }
                }
            }
            let Some(u) = u else { break };
            done[u] = true;

            for (ei, v) in self.neighbors(u) {
                if done[v] {
                    continue;
                }
                let w = 1.0 / self.edges[ei].confidence.max(1e-9);
                if dist[u] + w < dist[v] {
                    dist[v] = dist[u] + w;
                    pred[v] = Some((u, ei));
                }
            }
        }

        pred
    }
}

/// Graph stage outcome: the graph plus the subset of images that will be
/// stitched. Images outside the reference component are not dropped
/// silently; they are reported back to the caller.
#[derive(Debug)]
pub struct GraphSelection {
    pub graph: ImageGraph,
    pub reference: usize,
    /// Sorted indices of the reference component.
    pub component: Vec<usize>,
    /// Sorted indices excluded from the panorama.
    pub unstitched: Vec<usize>,
}

/// Build the graph and select the stitchable component.
pub fn build_graph(
    num_images: usize,
    edges: Vec<PairwiseTransform>,
    min_component_size: usize,
) -> Result<GraphSelection> {
    let graph = ImageGraph::new(num_images, edges);
    let reference = graph.reference();
    let component = graph.component_of(reference);

    if component.len() < min_component_size.max(2) {
        return Err(Error::NoOverlap);
    }

    let unstitched = (0..num_images)
        .filter(|i| !component.contains(i))
        .collect();

    Ok(GraphSelection {
        graph,
        reference,
        component,
        unstitched,
    })
}
