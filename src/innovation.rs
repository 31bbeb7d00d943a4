//! Run-scoped innovation tracking.
//!
//! Every structural edge `(source, target)` created anywhere in a run is
//! assigned an innovation number the first time it appears. Later genomes
//! that create the same edge receive the same number, which is what lets
//! crossover and distance align connection genes by id.
//!
//! The registry is an explicit context object owned by the engine and passed
//! as `&mut` into every genome operation that may create connections, so two
//! runs in one process never share numbering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gene::{ConnectionId, NodeId};

/// Maps structural edges to innovation numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InnovationRegistry {
    archive: BTreeMap<(NodeId, NodeId), ConnectionId>,
    next_id: ConnectionId,
}

/// One archived edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnovationEntry {
    pub source: NodeId,
    pub target: NodeId,
    pub id: ConnectionId,
}

/// Serializable copy of a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnovationSnapshot {
    pub entries: Vec<InnovationEntry>,
    /// Next innovation number the registry would issue.
    pub counter: ConnectionId,
}

impl InnovationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Innovation number for the edge, allocating a fresh one on first sight.
    pub fn get_or_assign(&mut self, source: NodeId, target: NodeId) -> ConnectionId {
        if let Some(&id) = self.archive.get(&(source, target)) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.archive.insert((source, target), id);
        id
    }

    /// Innovation number for the edge if it has been seen before.
    #[must_use]
    pub fn lookup(&self, source: NodeId, target: NodeId) -> Option<ConnectionId> {
        self.archive.get(&(source, target)).copied()
    }

    /// Number of distinct edges archived.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Next innovation number to be issued.
    #[must_use]
    pub fn counter(&self) -> ConnectionId {
        self.next_id
    }

    #[must_use]
    pub fn snapshot(&self) -> InnovationSnapshot {
        InnovationSnapshot {
            entries: self
                .archive
                .iter()
                .map(|(&(source, target), &id)| InnovationEntry { source, target, id })
                .collect(),
            counter: self.next_id,
        }
    }

    /// Rebuild a registry from a snapshot.
    ///
    /// Numbering continues after the larger of the snapshot counter and the
    /// largest archived id, so restored and fresh edges never collide.
    #[must_use]
    pub fn from_snapshot(snapshot: &InnovationSnapshot) -> Self {
        let archive: BTreeMap<_, _> = snapshot
            .entries
            .iter()
            .map(|e| ((e.source, e.target), e.id))
            .collect();
        let floor = archive.values().max().map_or(0, |&max| max + 1);
        Self {
            archive,
            next_id: snapshot.counter.max(floor),
        }
    }
}
