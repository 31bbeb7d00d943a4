//! Compressed sparse row snapshot of a genome graph.
//!
//! [`GraphTopology`] is an immutable snapshot of a genome's connection graph
//! in Compressed Sparse Row form, with forward (outgoing) and reverse
//! (incoming) adjacency. It backs the feed-forward cycle checks of the
//! mutation and crossover operators and the dependency-layer walk of the
//! phenotype builder.
//!
//! ## Determinism
//!
//! Edges are sorted by innovation number before CSR construction, so the
//! adjacency order (and therefore every traversal order) depends only on the
//! genome's content, never on its mutation history.

use std::collections::VecDeque;

use crate::gene::{ConnectionId, NodeId};
use crate::genome::Genome;

/// Which connection genes become edges of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFilter {
    /// Every connection, enabled or not. Used for feed-forward legality so
    /// that re-enabling a gene can never close a cycle.
    All,
    /// Enabled connections only. Used for phenotype construction.
    Enabled,
}

/// CSR-format graph topology.
#[derive(Debug, Clone)]
pub struct GraphTopology {
    /// Dense index to NodeId, ascending.
    idx_to_node: Vec<NodeId>,
    /// CSR offsets for forward edges. Length = node_count + 1.
    fwd_offsets: Vec<usize>,
    /// fwd_targets[fwd_offsets[i]..fwd_offsets[i+1]] are successors of node i.
    fwd_targets: Vec<usize>,
    /// CSR offsets for reverse edges. Length = node_count + 1.
    rev_offsets: Vec<usize>,
    /// rev_sources[rev_offsets[i]..rev_offsets[i+1]] are predecessors of node i.
    rev_sources: Vec<usize>,
}

impl GraphTopology {
    /// Build topology from a genome's connections.
    #[must_use]
    pub fn from_genome(genome: &Genome, filter: EdgeFilter) -> Self {
        let edges = genome
            .connections()
            .values()
            .filter(|c| filter == EdgeFilter::All || c.enabled)
            .map(|c| (c.id, c.source, c.target));
        Self::from_edges(genome.nodes().keys().copied(), edges)
    }

    /// Build topology from explicit node and edge lists.
    ///
    /// Edges whose endpoints are not among `nodes` are ignored.
    #[must_use]
    pub fn from_edges(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: impl IntoIterator<Item = (ConnectionId, NodeId, NodeId)>,
    ) -> Self {
        let mut idx_to_node: Vec<NodeId> = nodes.into_iter().collect();
        idx_to_node.sort_unstable();
        idx_to_node.dedup();
        let node_count = idx_to_node.len();

        let lookup = |id: NodeId| idx_to_node.binary_search(&id).ok();
        let mut dense: Vec<(ConnectionId, usize, usize)> = edges
            .into_iter()
            .filter_map(|(id, from, to)| Some((id, lookup(from)?, lookup(to)?)))
            .collect();
        dense.sort_unstable_by_key(|&(id, _, _)| id);

        let (fwd_offsets, fwd_targets) =
            build_csr(node_count, dense.iter().map(|&(_, from, to)| (from, to)));
        let (rev_offsets, rev_sources) =
            build_csr(node_count, dense.iter().map(|&(_, from, to)| (to, from)));

        Self {
            idx_to_node,
            fwd_offsets,
            fwd_targets,
            rev_offsets,
            rev_sources,
        }
    }

    /// Dense index of node `id`.
    #[inline]
    #[must_use]
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.idx_to_node.binary_search(&id).ok()
    }

    /// Node id at dense index `idx`.
    #[inline]
    #[must_use]
    pub fn node_id(&self, idx: usize) -> Option<NodeId> {
        self.idx_to_node.get(idx).copied()
    }

    /// Number of nodes in the topology.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idx_to_node.len()
    }

    /// Targets of edges out of `idx`.
    #[inline]
    pub fn successors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let start = self.fwd_offsets[idx];
        let end = self.fwd_offsets[idx + 1];
        self.fwd_targets[start..end].iter().copied()
    }

    /// Sources of edges into `idx`.
    #[inline]
    pub fn predecessors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let start = self.rev_offsets[idx];
        let end = self.rev_offsets[idx + 1];
        self.rev_sources[start..end].iter().copied()
    }

    /// Whether an edge `from_id -> to_id` would close a cycle.
    ///
    /// A self loop is a cycle. Otherwise BFS forward from `to_id`: reaching
    /// `from_id` means a path `to -> from` already exists.
    #[must_use]
    pub fn would_create_cycle(&self, from_id: NodeId, to_id: NodeId) -> bool {
        if from_id == to_id {
            return true;
        }
        let (Some(from_idx), Some(to_idx)) = (self.node_index(from_id), self.node_index(to_id))
        else {
            return false;
        };

        let mut visited = vec![false; self.node_count()];
        let mut queue = VecDeque::new();
        queue.push_back(to_idx);
        visited[to_idx] = true;

        while let Some(current) = queue.pop_front() {
            for succ in self.successors(current) {
                if succ == from_idx {
                    return true;
                }
                if !visited[succ] {
                    visited[succ] = true;
                    queue.push_back(succ);
                }
            }
        }

        false
    }

    /// Kahn's algorithm: true when some node is never released.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        let node_count = self.node_count();
        let mut in_degree: Vec<usize> = (0..node_count)
            .map(|idx| self.rev_offsets[idx + 1] - self.rev_offsets[idx])
            .collect();

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(idx, _)| idx)
            .collect();

        let mut processed = 0;
        while let Some(u) = queue.pop_front() {
            processed += 1;
            for v in self.successors(u) {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    queue.push_back(v);
                }
            }
        }

        processed != node_count
    }
}

/// Bucket `(row, column)` pairs into CSR offsets and columns, keeping the
/// input order inside each row.
fn build_csr(
    node_count: usize,
    pairs: impl Iterator<Item = (usize, usize)> + Clone,
) -> (Vec<usize>, Vec<usize>) {
    let mut offsets = vec![0usize; node_count + 1];
    for (row, _) in pairs.clone() {
        offsets[row + 1] += 1;
    }
    for i in 0..node_count {
        offsets[i + 1] += offsets[i];
    }

    let mut columns = vec![0usize; offsets[node_count]];
    let mut write_pos = offsets[..node_count].to_vec();
    for (row, column) in pairs {
        columns[write_pos[row]] = column;
        write_pos[row] += 1;
    }
    (offsets, columns)
}
