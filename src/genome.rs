//! NEAT genome: node and connection genes plus the structural operators.
//!
//! Genes are kept in id-ordered maps so that every iteration (crossover
//! alignment, distance, serialization) is deterministic. Node ids are local
//! to the genome and come from its own counter. Connection ids are run-wide
//! innovation numbers handed out by the [`InnovationRegistry`] passed into
//! every operation that may create an edge.
//!
//! All node and connection insertions and removals go through four private
//! choke points, which keep the node partition and the [`ConnectorIndex`]
//! in step with the gene maps.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Config, InitialConnection};
use crate::connectors::{Connector, ConnectorIndex};
use crate::error::{NeatError, Result};
use crate::gene::{ConnectionGene, ConnectionId, NodeGene, NodeId, NodeType};
use crate::innovation::InnovationRegistry;
use crate::math;
use crate::regulation::StructuralRates;
use crate::topology::{EdgeFilter, GraphTopology};

/// Identifier of a genome, unique within a run.
pub type GenomeId = u64;

/// Node ids grouped by role. `all` is the disjoint union of the other three.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePartition {
    pub all: BTreeSet<NodeId>,
    pub input: BTreeSet<NodeId>,
    pub hidden: BTreeSet<NodeId>,
    pub output: BTreeSet<NodeId>,
}

impl NodePartition {
    pub fn insert(&mut self, id: NodeId, node_type: NodeType) {
        self.all.insert(id);
        self.of_type_mut(node_type).insert(id);
    }

    pub fn remove(&mut self, id: NodeId) {
        self.all.remove(&id);
        self.input.remove(&id);
        self.hidden.remove(&id);
        self.output.remove(&id);
    }

    #[must_use]
    pub fn of_type(&self, node_type: NodeType) -> &BTreeSet<NodeId> {
        match node_type {
            NodeType::Input => &self.input,
            NodeType::Hidden => &self.hidden,
            NodeType::Output => &self.output,
        }
    }

    fn of_type_mut(&mut self, node_type: NodeType) -> &mut BTreeSet<NodeId> {
        match node_type {
            NodeType::Input => &mut self.input,
            NodeType::Hidden => &mut self.hidden,
            NodeType::Output => &mut self.output,
        }
    }
}

/// A NEAT genome.
#[derive(Debug, Clone, PartialEq)]
pub struct Genome {
    pub id: GenomeId,
    /// Generation in which the genome was created.
    pub birth_generation: usize,
    /// Raw fitness assigned by the fitness function.
    pub fitness: f32,
    /// Fitness normalised to [0, 1] across the generation.
    pub adjusted_fitness: f32,
    /// Set when the phenotype produced a non-finite value.
    pub is_damaged: bool,
    nodes: BTreeMap<NodeId, NodeGene>,
    connections: BTreeMap<ConnectionId, ConnectionGene>,
    node_ids: NodePartition,
    connectors: ConnectorIndex,
    /// Next node id this genome will allocate.
    next_node_id: NodeId,
}

impl Genome {
    /// Create an empty genome.
    #[must_use]
    pub fn new(id: GenomeId, birth_generation: usize) -> Self {
        Self {
            id,
            birth_generation,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            is_damaged: false,
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            node_ids: NodePartition::default(),
            connectors: ConnectorIndex::default(),
            next_node_id: 0,
        }
    }

    /// Create a generation-zero genome with the configured node counts and
    /// initial wiring strategy.
    ///
    /// Node ids are allocated inputs first, then hidden, then outputs, so all
    /// genomes of a run share the ids of their initial nodes.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Configuration`] when the configuration asks for
    /// no inputs or no outputs.
    pub fn initialize<R: Rng + ?Sized>(
        id: GenomeId,
        birth_generation: usize,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) -> Result<Self> {
        let shape = &config.genome;
        if shape.num_inputs == 0 || shape.num_outputs == 0 {
            return Err(NeatError::Configuration(format!(
                "cannot initialize a genome with {} inputs and {} outputs",
                shape.num_inputs, shape.num_outputs
            )));
        }

        let mut genome = Self::new(id, birth_generation);
        for (count, node_type) in [
            (shape.num_inputs, NodeType::Input),
            (shape.num_hidden, NodeType::Hidden),
            (shape.num_outputs, NodeType::Output),
        ] {
            for _ in 0..count {
                let node_id = genome.allocate_node_id();
                genome.insert_node(NodeGene::new(node_id, node_type, &config.node, rng));
            }
        }

        let connectors: Vec<Connector> = match shape.initial_connection {
            InitialConnection::Unconnected => Vec::new(),
            InitialConnection::FsNeatNoHidden | InitialConnection::FsNeatHidden => {
                let inputs: Vec<NodeId> = genome.node_ids.input.iter().copied().collect();
                let Some(&source) = inputs.choose(rng) else {
                    return Ok(genome);
                };
                let mut targets: Vec<NodeId> = genome.node_ids.output.iter().copied().collect();
                if shape.initial_connection == InitialConnection::FsNeatHidden {
                    targets.extend(genome.node_ids.hidden.iter().copied());
                    targets.sort_unstable();
                }
                targets.into_iter().map(|target| (source, target)).collect()
            }
            InitialConnection::FullNoDirect => genome.full_connectors(false, shape.feed_forward),
            InitialConnection::FullDirect => genome.full_connectors(true, shape.feed_forward),
            InitialConnection::PartialNoDirect | InitialConnection::PartialDirect => {
                let direct = shape.initial_connection == InitialConnection::PartialDirect;
                let mut all = genome.full_connectors(direct, shape.feed_forward);
                all.shuffle(rng);
                let keep = (all.len() as f32 * shape.partial_connection_rate).round() as usize;
                all.truncate(keep);
                all
            }
        };

        for (source, target) in connectors {
            let conn_id = registry.get_or_assign(source, target);
            genome.insert_connection(ConnectionGene::new(
                conn_id,
                source,
                target,
                &config.connection,
                rng,
            ));
        }
        Ok(genome)
    }

    /// Build a genome from explicit genes.
    ///
    /// The node counter is set past the largest node id.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InvalidRecord`] for duplicate ids, duplicate
    /// `(source, target)` pairs, connections to unknown nodes or into input
    /// nodes.
    pub fn from_genes(
        id: GenomeId,
        birth_generation: usize,
        nodes: impl IntoIterator<Item = NodeGene>,
        connections: impl IntoIterator<Item = ConnectionGene>,
    ) -> Result<Self> {
        let mut genome = Self::new(id, birth_generation);
        for node in nodes {
            if genome.nodes.contains_key(&node.id) {
                return Err(NeatError::InvalidRecord(format!("duplicate node id {}", node.id)));
            }
            genome.next_node_id = genome.next_node_id.max(node.id + 1);
            genome.insert_node(node);
        }
        for conn in connections {
            if genome.connections.contains_key(&conn.id) {
                return Err(NeatError::InvalidRecord(format!(
                    "duplicate connection id {}",
                    conn.id
                )));
            }
            if genome.connectors.contains_connection((conn.source, conn.target)) {
                return Err(NeatError::InvalidRecord(format!(
                    "duplicate connection {} -> {}",
                    conn.source, conn.target
                )));
            }
            let source_ok = genome.nodes.contains_key(&conn.source);
            let target_type = genome.nodes.get(&conn.target).map(|n| n.node_type);
            if !source_ok || target_type.is_none() {
                return Err(NeatError::InvalidRecord(format!(
                    "connection {} references a missing node",
                    conn.id
                )));
            }
            if target_type == Some(NodeType::Input) {
                return Err(NeatError::InvalidRecord(format!(
                    "connection {} targets an input node",
                    conn.id
                )));
            }
            genome.insert_connection(conn);
        }
        Ok(genome)
    }

    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<NodeId, NodeGene> {
        &self.nodes
    }

    #[must_use]
    pub fn connections(&self) -> &BTreeMap<ConnectionId, ConnectionGene> {
        &self.connections
    }

    #[must_use]
    pub fn node_ids(&self) -> &NodePartition {
        &self.node_ids
    }

    #[must_use]
    pub fn connectors(&self) -> &ConnectorIndex {
        &self.connectors
    }

    /// Next node id this genome will allocate.
    #[must_use]
    pub fn node_id_counter(&self) -> NodeId {
        self.next_node_id
    }

    /// Move the node counter forward. Never moves it backwards.
    pub(crate) fn advance_node_counter(&mut self, next: NodeId) {
        self.next_node_id = self.next_node_id.max(next);
    }

    /// Number of connection genes, enabled or not.
    #[must_use]
    pub fn complexity(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn num_enabled_connections(&self) -> usize {
        self.connections.values().filter(|c| c.enabled).count()
    }

    /// Whether the connection graph (including disabled genes) has a cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        GraphTopology::from_genome(self, EdgeFilter::All).has_cycle()
    }

    /// Add a connection with explicit values.
    ///
    /// Returns `None` when either endpoint is missing, the target is an
    /// input node or the pair is already connected. Cycles are not checked.
    pub fn add_connection(
        &mut self,
        source: NodeId,
        target: NodeId,
        weight: f32,
        enabled: bool,
        registry: &mut InnovationRegistry,
    ) -> Option<ConnectionId> {
        let target_type = self.nodes.get(&target)?.node_type;
        if !self.nodes.contains_key(&source)
            || target_type == NodeType::Input
            || self.connectors.contains_connection((source, target))
        {
            return None;
        }
        let id = registry.get_or_assign(source, target);
        self.insert_connection(ConnectionGene::with_weight(id, source, target, weight, enabled));
        Some(id)
    }

    /// Structural then parametric mutation.
    ///
    /// Structural operators run under `rates`, either one at a time with
    /// retry (`genome.single_structural_mutation`) or each independently.
    /// Then a random subset of hidden/output nodes and a random subset of
    /// connections receive parametric mutation.
    pub fn mutate<R: Rng + ?Sized>(
        &mut self,
        rates: StructuralRates,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) {
        let probabilities = [
            rates.node_add,
            rates.node_delete,
            rates.conn_add,
            rates.conn_delete,
        ];
        if config.genome.single_structural_mutation {
            let mut weights = probabilities.to_vec();
            while let Some(op) = math::weighted_choice(&weights, rng) {
                if self.apply_structural(op, config, registry, rng) {
                    break;
                }
                weights[op] = 0.0;
            }
        } else {
            for (op, probability) in probabilities.into_iter().enumerate() {
                if rng.random::<f32>() < probability {
                    self.apply_structural(op, config, registry, rng);
                }
            }
        }

        let mutable_nodes: Vec<NodeId> = self
            .node_ids
            .hidden
            .union(&self.node_ids.output)
            .copied()
            .collect();
        let node_count = math::probabilistic_round(rng.random::<f32>() * mutable_nodes.len() as f32, rng);
        let chosen: Vec<NodeId> = mutable_nodes.choose_multiple(rng, node_count).copied().collect();
        for node_id in chosen {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mutate(&config.node, rng);
            }
        }

        let conn_ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        let conn_count = math::probabilistic_round(rng.random::<f32>() * conn_ids.len() as f32, rng);
        let chosen: Vec<ConnectionId> = conn_ids.choose_multiple(rng, conn_count).copied().collect();
        for conn_id in chosen {
            if let Some(conn) = self.connections.get_mut(&conn_id) {
                conn.mutate(&config.connection, rng);
            }
        }
    }

    fn apply_structural<R: Rng + ?Sized>(
        &mut self,
        op: usize,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) -> bool {
        match op {
            0 => self.mutate_add_node(config, registry, rng),
            1 => self.mutate_delete_node(rng),
            2 => self.mutate_add_connection(config, registry, rng),
            _ => self.mutate_delete_connection(rng),
        }
    }

    /// Split a random enabled connection with a new hidden node.
    ///
    /// The split connection is disabled and replaced by `source -> new`
    /// (weight 1.0) and `new -> target` (the original weight).
    pub fn mutate_add_node<R: Rng + ?Sized>(
        &mut self,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) -> bool {
        let enabled: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.id)
            .collect();
        let Some(&split_id) = enabled.choose(rng) else {
            return false;
        };
        let Some(split) = self.connections.get_mut(&split_id) else {
            return false;
        };
        split.enabled = false;
        let (source, target, weight) = (split.source, split.target, split.weight);

        let node_id = self.allocate_node_id();
        self.insert_node(NodeGene::new(node_id, NodeType::Hidden, &config.node, rng));

        let in_id = registry.get_or_assign(source, node_id);
        self.insert_connection(ConnectionGene::with_weight(in_id, source, node_id, 1.0, true));
        let out_id = registry.get_or_assign(node_id, target);
        self.insert_connection(ConnectionGene::with_weight(out_id, node_id, target, weight, true));
        true
    }

    /// Delete a random hidden node and every connection touching it.
    ///
    /// Other hidden nodes left without any connection are pruned as well.
    pub fn mutate_delete_node<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let hidden: Vec<NodeId> = self.node_ids.hidden.iter().copied().collect();
        let Some(&node_id) = hidden.choose(rng) else {
            return false;
        };
        let incident: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.source == node_id || c.target == node_id)
            .map(|c| c.id)
            .collect();
        let mut neighbours = BTreeSet::new();
        for conn_id in incident {
            if let Some(conn) = self.remove_connection(conn_id) {
                neighbours.insert(conn.source);
                neighbours.insert(conn.target);
            }
        }
        self.remove_node(node_id);
        neighbours.remove(&node_id);
        for neighbour in neighbours {
            self.prune_if_redundant(neighbour);
        }
        true
    }

    /// Add a random legal connection not yet present.
    ///
    /// In feed-forward mode candidates come from the acyclic connector set
    /// and any that would close a cycle over all connection genes are
    /// discarded until a legal one is found.
    pub fn mutate_add_connection<R: Rng + ?Sized>(
        &mut self,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) -> bool {
        let feed_forward = config.genome.feed_forward;
        let mut candidates = self.connectors.available(feed_forward);
        let topology = feed_forward.then(|| GraphTopology::from_genome(self, EdgeFilter::All));

        while !candidates.is_empty() {
            let pick = rng.random_range(0..candidates.len());
            let (source, target) = candidates.swap_remove(pick);
            if let Some(topology) = &topology {
                if topology.would_create_cycle(source, target) {
                    continue;
                }
            }
            let conn_id = registry.get_or_assign(source, target);
            let conn = ConnectionGene::new(conn_id, source, target, &config.connection, rng);
            self.insert_connection(conn);
            return true;
        }
        false
    }

    /// Delete a random connection, refusing when fewer than two remain.
    pub fn mutate_delete_connection<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.connections.len() < 2 {
            return false;
        }
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        match ids.choose(rng) {
            Some(&conn_id) => self.delete_connection(conn_id),
            None => false,
        }
    }

    /// Delete one connection and prune any hidden endpoint left without
    /// connections. Returns `false` if the id is unknown.
    pub fn delete_connection(&mut self, conn_id: ConnectionId) -> bool {
        let Some(conn) = self.remove_connection(conn_id) else {
            return false;
        };
        self.prune_if_redundant(conn.source);
        if conn.target != conn.source {
            self.prune_if_redundant(conn.target);
        }
        true
    }

    /// Sexual crossover of two parents into a fresh genome.
    ///
    /// The fitter parent dominates (coin flip on ties). Matching genes are
    /// crossed gene by gene. Disjoint and excess genes come from the dominant
    /// parent, or on a fitness tie from either parent with probability 0.5
    /// each. In feed-forward mode an inherited edge that would close a cycle
    /// is skipped. Input and output nodes are always inherited; hidden nodes
    /// only when an inherited connection uses them.
    pub fn crossover_sexual<R: Rng + ?Sized>(
        id: GenomeId,
        birth_generation: usize,
        parent_1: &Self,
        parent_2: &Self,
        config: &Config,
        rng: &mut R,
    ) -> Self {
        let tied = parent_1.fitness == parent_2.fitness;
        let (dominant, other) = if parent_1.fitness > parent_2.fitness
            || (tied && rng.random_bool(0.5))
        {
            (parent_1, parent_2)
        } else {
            (parent_2, parent_1)
        };

        let mut inherited: Vec<ConnectionGene> = Vec::new();
        for (conn_id, gene) in &dominant.connections {
            if let Some(other_gene) = other.connections.get(conn_id) {
                inherited.push(gene.crossover(other_gene, rng));
            }
        }
        let dominant_only = dominant
            .connections
            .values()
            .filter(|c| !other.connections.contains_key(&c.id));
        let other_only = other
            .connections
            .values()
            .filter(|c| !dominant.connections.contains_key(&c.id));
        if tied {
            let mut unmatched: Vec<&ConnectionGene> = dominant_only.chain(other_only).collect();
            unmatched.sort_by_key(|c| c.id);
            for gene in unmatched {
                if rng.random_bool(0.5) {
                    inherited.push(gene.clone());
                }
            }
        } else {
            inherited.extend(dominant_only.cloned());
        }

        let universe: BTreeSet<NodeId> = dominant.node_ids.all.union(&other.node_ids.all).copied().collect();
        let mut accepted: Vec<ConnectionGene> = Vec::with_capacity(inherited.len());
        let mut seen_pairs: BTreeSet<Connector> = BTreeSet::new();
        let mut topology = GraphTopology::from_edges(universe.iter().copied(), std::iter::empty());
        for gene in inherited {
            if !seen_pairs.insert((gene.source, gene.target)) {
                continue;
            }
            if config.genome.feed_forward && topology.would_create_cycle(gene.source, gene.target) {
                continue;
            }
            accepted.push(gene);
            if config.genome.feed_forward {
                topology = GraphTopology::from_edges(
                    universe.iter().copied(),
                    accepted.iter().map(|c| (c.id, c.source, c.target)),
                );
            }
        }

        let required: BTreeSet<NodeId> = accepted
            .iter()
            .flat_map(|c| [c.source, c.target])
            .collect();

        let mut child = Self::new(id, birth_generation);
        for node_id in &universe {
            let node = match (dominant.nodes.get(node_id), other.nodes.get(node_id)) {
                (Some(a), Some(b)) => a.crossover(b, rng),
                (Some(n), None) | (None, Some(n)) => n.clone(),
                (None, None) => continue,
            };
            if node.node_type != NodeType::Hidden || required.contains(node_id) {
                child.insert_node(node);
            }
        }
        for gene in accepted {
            child.insert_connection(gene);
        }
        child.next_node_id = parent_1.next_node_id.max(parent_2.next_node_id);
        child
    }

    /// Copy all genes and the node counter of `parent` into a fresh genome.
    #[must_use]
    pub fn crossover_asexual(id: GenomeId, birth_generation: usize, parent: &Self) -> Self {
        Self {
            id,
            birth_generation,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            is_damaged: false,
            nodes: parent.nodes.clone(),
            connections: parent.connections.clone(),
            node_ids: parent.node_ids.clone(),
            connectors: parent.connectors.clone(),
            next_node_id: parent.next_node_id,
        }
    }

    /// Genomic distance in [0, 1].
    ///
    /// A weighted mean of the disjoint fraction, the excess fraction (both
    /// relative to the union of connection ids) and the mean distance of
    /// matching connection genes.
    #[must_use]
    pub fn distance(&self, other: &Self, config: &Config) -> f32 {
        let genome = &config.genome;
        let (c_d, c_e, c_w) = (
            genome.compatibility_disjoint_contribution,
            genome.compatibility_excess_contribution,
            genome.compatibility_weight_contribution,
        );
        let total_weight = c_d + c_e + c_w;
        if total_weight <= 0.0 {
            return 0.0;
        }

        let (disjoint_frac, excess_frac) = match (
            self.connections.keys().next_back(),
            other.connections.keys().next_back(),
        ) {
            (None, None) => (0.0, 0.0),
            (Some(_), None) | (None, Some(_)) => (0.0, 1.0),
            (Some(&max_a), Some(&max_b)) => {
                let threshold = max_a.min(max_b);
                let mut union = 0usize;
                let mut disjoint = 0usize;
                let mut excess = 0usize;
                let mut classify = |id: ConnectionId| {
                    if id <= threshold {
                        disjoint += 1;
                    } else {
                        excess += 1;
                    }
                };
                for &conn_id in self.connections.keys() {
                    union += 1;
                    if !other.connections.contains_key(&conn_id) {
                        classify(conn_id);
                    }
                }
                for &conn_id in other.connections.keys() {
                    if !self.connections.contains_key(&conn_id) {
                        union += 1;
                        classify(conn_id);
                    }
                }
                (disjoint as f32 / union as f32, excess as f32 / union as f32)
            }
        };

        let mut matched = 0usize;
        let mut matched_sum = 0.0f32;
        for (conn_id, gene) in &self.connections {
            if let Some(other_gene) = other.connections.get(conn_id) {
                matched += 1;
                matched_sum += gene.distance(other_gene, &config.connection);
            }
        }
        let matched_term = if matched == 0 {
            0.0
        } else {
            matched_sum / matched as f32
        };

        ((c_d * disjoint_frac + c_e * excess_frac + c_w * matched_term) / total_weight).clamp(0.0, 1.0)
    }

    /// Recompute the connector index from the node partition and edges.
    pub fn rebuild_connectors(&mut self) {
        self.connectors = ConnectorIndex::rebuild(
            &self.node_ids,
            self.connections.values().map(|c| (c.source, c.target)),
        );
    }

    fn full_connectors(&self, direct: bool, feed_forward: bool) -> Vec<Connector> {
        let ids = &self.node_ids;
        let mut connectors = Vec::new();
        if !ids.hidden.is_empty() {
            for &source in &ids.input {
                for &target in &ids.hidden {
                    connectors.push((source, target));
                }
            }
            for &source in &ids.hidden {
                for &target in &ids.output {
                    connectors.push((source, target));
                }
            }
        }
        if direct || ids.hidden.is_empty() {
            for &source in &ids.input {
                for &target in &ids.output {
                    connectors.push((source, target));
                }
            }
        }
        if !feed_forward {
            for &hidden in &ids.hidden {
                connectors.push((hidden, hidden));
            }
        }
        connectors
    }

    fn allocate_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        assert!(!self.nodes.contains_key(&id), "node id {id} allocated twice");
        self.next_node_id += 1;
        id
    }

    fn prune_if_redundant(&mut self, node_id: NodeId) {
        let is_hidden = self.node_ids.hidden.contains(&node_id);
        if is_hidden
            && !self
                .connections
                .values()
                .any(|c| c.source == node_id || c.target == node_id)
        {
            self.remove_node(node_id);
        }
    }

    fn insert_node(&mut self, node: NodeGene) {
        let (node_id, node_type) = (node.id, node.node_type);
        assert!(
            self.nodes.insert(node_id, node).is_none(),
            "duplicate node id {node_id}"
        );
        self.node_ids.insert(node_id, node_type);
        self.connectors.insert_node(node_id, node_type, &self.node_ids);
    }

    fn remove_node(&mut self, node_id: NodeId) {
        self.nodes.remove(&node_id);
        self.node_ids.remove(node_id);
        self.connectors.remove_node(node_id);
    }

    fn insert_connection(&mut self, conn: ConnectionGene) {
        let conn_id = conn.id;
        self.connectors.insert_connection((conn.source, conn.target));
        assert!(
            self.connections.insert(conn_id, conn).is_none(),
            "duplicate connection id {conn_id}"
        );
    }

    fn remove_connection(&mut self, conn_id: ConnectionId) -> Option<ConnectionGene> {
        let conn = self.connections.remove(&conn_id)?;
        self.connectors.remove_connection((conn.source, conn.target));
        Some(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn assert_consistent(genome: &Genome) {
        for conn in genome.connections().values() {
            assert!(genome.nodes().contains_key(&conn.source));
            assert!(genome.nodes().contains_key(&conn.target));
        }
        let ids = genome.node_ids();
        assert_eq!(ids.all.len(), ids.input.len() + ids.hidden.len() + ids.output.len());
        assert_eq!(ids.all, genome.nodes().keys().copied().collect());
        let mut rebuilt = genome.clone();
        rebuilt.rebuild_connectors();
        assert_eq!(&rebuilt.connectors, genome.connectors());
        assert!(genome.node_id_counter() > genome.nodes().keys().copied().max().unwrap_or(0));
    }

    #[test]
    fn test_initialize_full_direct() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.genome.num_hidden = 2;
        let genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();

        assert_eq!(genome.node_ids().input, BTreeSet::from([0, 1]));
        assert_eq!(genome.node_ids().hidden, BTreeSet::from([2, 3]));
        assert_eq!(genome.node_ids().output, BTreeSet::from([4]));
        // 2x2 input->hidden, 2x1 hidden->output, 2x1 direct
        assert_eq!(genome.complexity(), 8);
        assert_eq!(genome.node_id_counter(), 5);
        assert_consistent(&genome);
    }

    #[test]
    fn test_initialize_strategies() {
        let mut rng = test_rng();
        let mut config = Config::minimal(3, 2);
        config.genome.num_hidden = 1;

        let cases = [
            (InitialConnection::Unconnected, 0),
            (InitialConnection::FsNeatNoHidden, 2),
            (InitialConnection::FsNeatHidden, 3),
            (InitialConnection::FullNoDirect, 5),
            (InitialConnection::FullDirect, 11),
        ];
        for (strategy, expected) in cases {
            let mut registry = InnovationRegistry::new();
            config.genome.initial_connection = strategy;
            let genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
            assert_eq!(genome.complexity(), expected, "{strategy:?}");
        }

        let mut registry = InnovationRegistry::new();
        config.genome.initial_connection = InitialConnection::PartialDirect;
        config.genome.partial_connection_rate = 0.5;
        let genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        assert_eq!(genome.complexity(), 6); // round(11 * 0.5)
    }

    #[test]
    fn test_unwired_initial_hidden_nodes_kept() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.genome.num_hidden = 2;
        for strategy in [InitialConnection::Unconnected, InitialConnection::FsNeatNoHidden] {
            config.genome.initial_connection = strategy;
            let genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
            assert_eq!(genome.node_ids().hidden, BTreeSet::from([2, 3]), "{strategy:?}");
            let hidden = &genome.node_ids().hidden;
            assert!(genome
                .connections()
                .values()
                .all(|c| !hidden.contains(&c.source) && !hidden.contains(&c.target)));
            assert_consistent(&genome);
        }

        // Wired later, then pruned once the wiring goes away.
        config.genome.initial_connection = InitialConnection::Unconnected;
        let mut genome = Genome::initialize(1, 0, &config, &mut registry, &mut rng).unwrap();
        genome.add_connection(0, 4, 0.5, true, &mut registry).unwrap();
        let into_hidden = genome.add_connection(0, 2, 0.5, true, &mut registry).unwrap();
        assert!(genome.delete_connection(into_hidden));
        assert_eq!(genome.node_ids().hidden, BTreeSet::from([3]));
        assert_consistent(&genome);
    }

    #[test]
    fn test_recurrent_full_adds_self_loops() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(1, 1);
        config.genome.num_hidden = 2;
        config.genome.feed_forward = false;
        config.genome.initial_connection = InitialConnection::FullNoDirect;
        let genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        assert!(genome.connections().values().any(|c| c.source == 1 && c.target == 1));
        assert_eq!(genome.complexity(), 6);
    }

    #[test]
    fn test_initialize_rejects_empty_shape() {
        let mut config = Config::minimal(2, 1);
        config.genome.num_outputs = 0;
        let result = Genome::initialize(0, 0, &config, &mut InnovationRegistry::new(), &mut test_rng());
        assert!(matches!(result, Err(NeatError::Configuration(_))));
    }

    #[test]
    fn test_add_node_splits_connection() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(1, 1);
        let mut genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        let original = genome.connections().values().next().cloned().unwrap();

        assert!(genome.mutate_add_node(&config, &mut registry, &mut rng));
        assert_eq!(genome.complexity(), 3);
        assert!(!genome.connections()[&original.id].enabled);

        let new_node = *genome.node_ids().hidden.iter().next().unwrap();
        let incoming = genome
            .connections()
            .values()
            .find(|c| c.target == new_node)
            .unwrap();
        let outgoing = genome
            .connections()
            .values()
            .find(|c| c.source == new_node)
            .unwrap();
        assert_eq!(incoming.weight, 1.0);
        assert_eq!(outgoing.weight, original.weight);
        assert_eq!(genome.num_enabled_connections(), 2);
        assert_consistent(&genome);
    }

    #[test]
    fn test_add_node_needs_enabled_connection() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(1, 1);
        config.genome.initial_connection = InitialConnection::Unconnected;
        let mut genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        assert!(!genome.mutate_add_node(&config, &mut registry, &mut rng));
    }

    #[test]
    fn test_delete_connection_prunes_isolated_hidden() {
        let nodes = [
            NodeGene::input(0),
            NodeGene::new(1, NodeType::Output, &Default::default(), &mut test_rng()),
            NodeGene::new(2, NodeType::Hidden, &Default::default(), &mut test_rng()),
        ];
        let conns = [
            ConnectionGene::with_weight(0, 0, 1, 0.5, true),
            ConnectionGene::with_weight(1, 0, 2, 0.5, true),
        ];
        let mut genome = Genome::from_genes(0, 0, nodes, conns).unwrap();

        assert!(genome.delete_connection(1));
        assert!(genome.node_ids().hidden.is_empty());
        assert!(!genome.nodes().contains_key(&2));
        assert_eq!(genome.complexity(), 1);
        assert_consistent(&genome);

        // A single remaining connection is never deleted by mutation.
        assert!(!genome.mutate_delete_connection(&mut test_rng()));
    }

    #[test]
    fn test_delete_node_removes_incident_connections() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(2, 1);
        let mut genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        assert!(!genome.mutate_delete_node(&mut rng));
        genome.mutate_add_node(&config, &mut registry, &mut rng);
        assert_eq!(genome.complexity(), 4);

        assert!(genome.mutate_delete_node(&mut rng));
        assert!(genome.node_ids().hidden.is_empty());
        assert_eq!(genome.complexity(), 2);
        assert_consistent(&genome);
    }

    #[test]
    fn test_add_connection_same_innovation_across_genomes() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.genome.initial_connection = InitialConnection::Unconnected;
        let mut a = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        let mut b = Genome::initialize(1, 0, &config, &mut registry, &mut rng).unwrap();

        let id_a = a.add_connection(1, 2, 0.3, true, &mut registry).unwrap();
        let id_b = b.add_connection(1, 2, -0.7, true, &mut registry).unwrap();
        assert_eq!(id_a, id_b);
        assert!(a.add_connection(1, 2, 0.3, true, &mut registry).is_none());
        assert!(a.add_connection(2, 0, 0.3, true, &mut registry).is_none());
    }

    #[test]
    fn test_add_connection_respects_feed_forward() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(2, 1);
        let mut genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        // Fully connected without hidden nodes: nothing left to add.
        assert!(!genome.mutate_add_connection(&config, &mut registry, &mut rng));
        for _ in 0..30 {
            genome.mutate_add_node(&config, &mut registry, &mut rng);
            genome.mutate_add_connection(&config, &mut registry, &mut rng);
            assert!(!genome.has_cycle());
        }
        assert_consistent(&genome);
    }

    #[test]
    fn test_mutation_keeps_invariants() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(3, 2);
        config.genome.single_structural_mutation = true;
        let mut genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        let rates = StructuralRates::from_config(&config);
        for _ in 0..200 {
            genome.mutate(rates, &config, &mut registry, &mut rng);
            assert!(!genome.has_cycle());
        }
        assert_consistent(&genome);
        assert_eq!(genome.node_ids().input.len(), 3);
        assert_eq!(genome.node_ids().output.len(), 2);
    }

    #[test]
    fn test_recurrent_mutation_allows_cycles() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.genome.feed_forward = false;
        let mut genome = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        genome.mutate_add_node(&config, &mut registry, &mut rng);
        let mut added = 0;
        while genome.mutate_add_connection(&config, &mut registry, &mut rng) {
            added += 1;
        }
        // Second input to the new node, its self loop, output back into it,
        // and the output self loop.
        assert_eq!(added, 4);
        assert!(genome.has_cycle());
        assert_consistent(&genome);
    }

    #[test]
    fn test_crossover_asexual_copies_structure() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(2, 1);
        let mut parent = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        parent.mutate_add_node(&config, &mut registry, &mut rng);
        parent.fitness = 2.0;

        let child = Genome::crossover_asexual(9, 1, &parent);
        assert_eq!(child.id, 9);
        assert_eq!(child.fitness, 0.0);
        assert_eq!(child.nodes(), parent.nodes());
        assert_eq!(child.connections(), parent.connections());
        assert_eq!(child.node_id_counter(), parent.node_id_counter());
    }

    #[test]
    fn test_crossover_sexual_dominant_parent() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(2, 1);
        let base = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        let mut fit = base.clone();
        fit.mutate_add_node(&config, &mut registry, &mut rng);
        fit.fitness = 3.0;
        let mut weak = base.clone();
        weak.id = 1;
        weak.fitness = 1.0;

        let child = Genome::crossover_sexual(2, 1, &weak, &fit, &config, &mut rng);
        let child_ids: BTreeSet<_> = child.connections().keys().copied().collect();
        let fit_ids: BTreeSet<_> = fit.connections().keys().copied().collect();
        assert_eq!(child_ids, fit_ids);
        assert_eq!(child.node_ids().hidden, fit.node_ids().hidden);
        assert_eq!(child.node_id_counter(), fit.node_id_counter());
        assert_consistent(&child);

        // The weaker parent's extra genes never reach the child.
        let strong = base_with_fitness(&base, 3.0);
        let split = weak_with_split(&base, &config, &mut registry);
        let child = Genome::crossover_sexual(3, 1, &strong, &split, &config, &mut rng);
        assert!(child.node_ids().hidden.is_empty());
        assert_eq!(child.complexity(), 2);
    }

    fn base_with_fitness(base: &Genome, fitness: f32) -> Genome {
        let mut genome = base.clone();
        genome.fitness = fitness;
        genome
    }

    fn weak_with_split(base: &Genome, config: &Config, registry: &mut InnovationRegistry) -> Genome {
        let mut genome = base.clone();
        genome.mutate_add_node(config, registry, &mut ChaCha8Rng::seed_from_u64(7));
        genome.fitness = 0.5;
        genome
    }

    #[test]
    fn test_crossover_sexual_keeps_feed_forward() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(3, 2);
        let base = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        let rates = StructuralRates::from_config(&config);
        for round in 0..20 {
            let mut a = base.clone();
            let mut b = base.clone();
            for _ in 0..10 {
                a.mutate(rates, &config, &mut registry, &mut rng);
                b.mutate(rates, &config, &mut registry, &mut rng);
            }
            a.fitness = 1.0;
            b.fitness = 1.0;
            let child = Genome::crossover_sexual(round, 1, &a, &b, &config, &mut rng);
            assert!(!child.has_cycle());
            assert_consistent(&child);
            assert_eq!(child.node_ids().input, base.node_ids().input);
            assert_eq!(child.node_ids().output, base.node_ids().output);
        }
    }

    #[test]
    fn test_distance_properties() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(2, 1);
        let a = Genome::initialize(0, 0, &config, &mut registry, &mut rng).unwrap();
        assert_eq!(a.distance(&a, &config), 0.0);

        let mut b = a.clone();
        b.mutate_add_node(&config, &mut registry, &mut rng);
        let d_ab = a.distance(&b, &config);
        assert!(d_ab > 0.0 && d_ab <= 1.0);
        assert!((d_ab - b.distance(&a, &config)).abs() < 1e-6);

        let empty = Genome::new(5, 0);
        assert_eq!(empty.distance(&Genome::new(6, 0), &config), 0.0);
        let expected = config.genome.compatibility_excess_contribution
            / (config.genome.compatibility_disjoint_contribution
                + config.genome.compatibility_excess_contribution
                + config.genome.compatibility_weight_contribution);
        assert!((empty.distance(&a, &config) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_distance_disjoint_and_excess() {
        let mut config = Config::minimal(1, 1);
        config.genome.compatibility_disjoint_contribution = 1.0;
        config.genome.compatibility_excess_contribution = 1.0;
        config.genome.compatibility_weight_contribution = 0.0;
        let nodes = || {
            [
                NodeGene::input(0),
                NodeGene::input(1),
                NodeGene::new(2, NodeType::Output, &Default::default(), &mut test_rng()),
                NodeGene::new(3, NodeType::Hidden, &Default::default(), &mut test_rng()),
            ]
        };
        // a: {0, 1, 4}, b: {0, 2}; threshold 2, disjoint {1, 2}, excess {4}, union 4
        let a = Genome::from_genes(
            0,
            0,
            nodes(),
            [
                ConnectionGene::with_weight(0, 0, 2, 0.0, true),
                ConnectionGene::with_weight(1, 1, 2, 0.0, true),
                ConnectionGene::with_weight(4, 3, 2, 0.0, true),
            ],
        )
        .unwrap();
        let b = Genome::from_genes(
            1,
            0,
            nodes(),
            [
                ConnectionGene::with_weight(0, 0, 2, 0.0, true),
                ConnectionGene::with_weight(2, 0, 3, 0.0, true),
            ],
        )
        .unwrap();
        let expected = (0.5 + 0.25) / 2.0;
        assert!((a.distance(&b, &config) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_from_genes_validation() {
        let output = NodeGene::new(1, NodeType::Output, &Default::default(), &mut test_rng());
        let into_input = Genome::from_genes(
            0,
            0,
            [NodeGene::input(0), output.clone()],
            [ConnectionGene::with_weight(0, 1, 0, 1.0, true)],
        );
        assert!(matches!(into_input, Err(NeatError::InvalidRecord(_))));

        let dangling = Genome::from_genes(
            0,
            0,
            [NodeGene::input(0), output.clone()],
            [ConnectionGene::with_weight(0, 0, 7, 1.0, true)],
        );
        assert!(dangling.is_err());

        let duplicate = Genome::from_genes(0, 0, [NodeGene::input(0), NodeGene::input(0)], []);
        assert!(duplicate.is_err());
    }
}
