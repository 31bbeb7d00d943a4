//! Candidate-connector index.
//!
//! For every genome the index holds the node pairs that are structurally
//! legal targets for an add-connection mutation, split into the cyclic set
//! (recurrent edges allowed) and the acyclic set (feed-forward layer order),
//! together with the pairs that already carry a connection gene.
//!
//! The genome updates the index only from its node insert/remove and
//! connection insert/remove choke points. [`ConnectorIndex::rebuild`] derives
//! the same index from scratch.

use std::collections::BTreeSet;

use crate::gene::{NodeId, NodeType};
use crate::genome::NodePartition;

/// A directed `(source, target)` node pair.
pub type Connector = (NodeId, NodeId);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorIndex {
    cyclic: BTreeSet<Connector>,
    acyclic: BTreeSet<Connector>,
    existing: BTreeSet<Connector>,
}

impl ConnectorIndex {
    /// Derive the index from a node partition and the existing edges.
    #[must_use]
    pub fn rebuild(
        partition: &NodePartition,
        connections: impl IntoIterator<Item = Connector>,
    ) -> Self {
        let mut index = Self::default();
        for &id in &partition.input {
            index.insert_node(id, NodeType::Input, partition);
        }
        for &id in &partition.hidden {
            index.insert_node(id, NodeType::Hidden, partition);
        }
        for &id in &partition.output {
            index.insert_node(id, NodeType::Output, partition);
        }
        index.existing = connections.into_iter().collect();
        index
    }

    /// Add every legal connector touching the new node `id`.
    ///
    /// `partition` may or may not already contain `id`.
    pub fn insert_node(&mut self, id: NodeId, node_type: NodeType, partition: &NodePartition) {
        let others = |set: &BTreeSet<NodeId>| -> Vec<NodeId> {
            set.iter().copied().filter(|&other| other != id).collect()
        };
        let inputs = others(&partition.input);
        let hidden = others(&partition.hidden);
        let outputs = others(&partition.output);

        match node_type {
            NodeType::Input => {
                for &h in &hidden {
                    self.both((id, h));
                }
                for &o in &outputs {
                    self.both((id, o));
                }
            }
            NodeType::Hidden => {
                for &i in &inputs {
                    self.both((i, id));
                }
                for &h in &hidden {
                    self.both((h, id));
                    self.both((id, h));
                }
                self.cyclic.insert((id, id));
                for &o in &outputs {
                    self.both((id, o));
                    self.cyclic.insert((o, id));
                }
            }
            NodeType::Output => {
                for &i in &inputs {
                    self.both((i, id));
                }
                for &h in &hidden {
                    self.both((h, id));
                    self.cyclic.insert((id, h));
                }
                self.cyclic.insert((id, id));
            }
        }
    }

    /// Drop every connector and existing edge touching `id`.
    pub fn remove_node(&mut self, id: NodeId) {
        let untouched = |&(s, t): &Connector| s != id && t != id;
        self.cyclic.retain(untouched);
        self.acyclic.retain(untouched);
        self.existing.retain(untouched);
    }

    pub fn insert_connection(&mut self, connector: Connector) {
        self.existing.insert(connector);
    }

    pub fn remove_connection(&mut self, connector: Connector) {
        self.existing.remove(&connector);
    }

    #[must_use]
    pub fn contains_connection(&self, connector: Connector) -> bool {
        self.existing.contains(&connector)
    }

    /// Candidate connectors not yet carrying a connection gene, in ascending order.
    #[must_use]
    pub fn available(&self, feed_forward: bool) -> Vec<Connector> {
        let pool = if feed_forward {
            &self.acyclic
        } else {
            &self.cyclic
        };
        pool.difference(&self.existing).copied().collect()
    }

    /// Every legal connector, ignoring existing edges.
    #[cfg(test)]
    pub(crate) fn candidates(&self, feed_forward: bool) -> &BTreeSet<Connector> {
        if feed_forward {
            &self.acyclic
        } else {
            &self.cyclic
        }
    }

    fn both(&mut self, connector: Connector) {
        self.cyclic.insert(connector);
        self.acyclic.insert(connector);
    }
}
