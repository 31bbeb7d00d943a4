//! Feed-forward phenotype built from a genome.
//!
//! Construction resolves, for every output node, the dependency layers of its
//! ancestors over the enabled connections:
//!
//! ```text
//! L0 = [output]
//! L(k+1) = distinct sources feeding any node of L(k)
//! ```
//!
//! until a layer comes back empty, which the acyclicity check guarantees.
//! Walking the layers deepest first and keeping each node's first occurrence
//! yields that output's activation path, in which every node appears after
//! all of its sources. Only nodes on some path are materialised as runtime
//! neurons, stored in a `slotmap` arena.
//!
//! Activation resets the per-neuron `activated` flags, assigns the raw
//! inputs and walks each output's path, evaluating every neuron once as
//! `activation(aggregation(weighted inputs) * response + bias)`.

use std::collections::{BTreeMap, BTreeSet};

use slotmap::{new_key_type, SlotMap};
use tracing::trace;

use crate::activation::{ActivationFn, Activations};
use crate::aggregation::{AggregationFn, Aggregations};
use crate::error::{NeatError, Result};
use crate::gene::{NodeId, NodeType};
use crate::genome::Genome;
use crate::topology::{EdgeFilter, GraphTopology};

new_key_type! {
    /// Arena key of a runtime neuron.
    pub struct NeuronKey;
}

#[derive(Debug, Clone)]
struct Neuron {
    node_id: NodeId,
    node_type: NodeType,
    bias: f32,
    response: f32,
    activation: ActivationFn,
    aggregation: AggregationFn,
    /// (source neuron, weight) for every enabled incoming connection.
    incoming: Vec<(NeuronKey, f32)>,
    value: f32,
    activated: bool,
}

/// An evaluable, acyclic network derived from a genome's enabled connections.
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    neurons: SlotMap<NeuronKey, Neuron>,
    /// One slot per genome input node, ascending id. `None` when the input
    /// feeds no output.
    inputs: Vec<Option<NeuronKey>>,
    /// Output neurons, ascending id.
    outputs: Vec<NeuronKey>,
    /// Activation path per output, parallel to `outputs`.
    paths: Vec<Vec<NeuronKey>>,
    damaged: bool,
    scratch: Vec<f32>,
}

impl FeedForwardNetwork {
    /// Build the phenotype of `genome`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::CyclicGenome`] if the enabled connections contain
    /// a cycle, and [`NeatError::UnknownActivation`] /
    /// [`NeatError::UnknownAggregation`] if a materialised node uses an
    /// unregistered key.
    pub fn new(
        genome: &Genome,
        activations: &Activations,
        aggregations: &Aggregations,
    ) -> Result<Self> {
        let topology = GraphTopology::from_genome(genome, EdgeFilter::Enabled);
        if topology.has_cycle() {
            return Err(NeatError::CyclicGenome);
        }

        let output_ids: Vec<NodeId> = genome.node_ids().output.iter().copied().collect();
        let id_paths: Vec<Vec<NodeId>> = output_ids
            .iter()
            .map(|&output| activation_path(&topology, output))
            .collect();

        let required: BTreeSet<NodeId> = id_paths.iter().flatten().copied().collect();
        let mut neurons = SlotMap::with_key();
        let mut keys: BTreeMap<NodeId, NeuronKey> = BTreeMap::new();
        for &node_id in &required {
            let Some(gene) = genome.nodes().get(&node_id) else {
                continue;
            };
            let neuron = Neuron {
                node_id,
                node_type: gene.node_type,
                bias: gene.bias,
                response: gene.response,
                activation: activations.get(&gene.activation)?,
                aggregation: aggregations.get(&gene.aggregation)?,
                incoming: Vec::new(),
                value: 0.0,
                activated: false,
            };
            keys.insert(node_id, neurons.insert(neuron));
        }

        // Connections are visited in innovation order, fixing the summation order.
        for conn in genome.connections().values().filter(|c| c.enabled) {
            if let (Some(&source), Some(&target)) = (keys.get(&conn.source), keys.get(&conn.target)) {
                neurons[target].incoming.push((source, conn.weight));
            }
        }

        let inputs = genome
            .node_ids()
            .input
            .iter()
            .map(|id| keys.get(id).copied())
            .collect();
        let outputs = output_ids.iter().filter_map(|id| keys.get(id).copied()).collect();
        let paths = id_paths
            .iter()
            .map(|path| path.iter().filter_map(|id| keys.get(id).copied()).collect())
            .collect();

        Ok(Self {
            neurons,
            inputs,
            outputs,
            paths,
            damaged: false,
            scratch: Vec::new(),
        })
    }

    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Number of materialised neurons.
    #[must_use]
    pub fn num_neurons(&self) -> usize {
        self.neurons.len()
    }

    /// Node ids of the activation path of the `index`-th output.
    #[must_use]
    pub fn activation_path(&self, index: usize) -> Option<Vec<NodeId>> {
        self.paths
            .get(index)
            .map(|path| path.iter().map(|&key| self.neurons[key].node_id).collect())
    }

    /// Whether a non-finite value has been produced since the last hard reset.
    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.damaged
    }

    /// Clear all neuron values and activation flags. A hard reset also
    /// clears the damaged flag.
    pub fn reset(&mut self, hard: bool) {
        for neuron in self.neurons.values_mut() {
            neuron.value = 0.0;
            neuron.activated = false;
        }
        if hard {
            self.damaged = false;
        }
    }

    /// Propagate `inputs` and return one value per output, ascending output id.
    ///
    /// On a non-finite intermediate value the network is marked damaged and
    /// a zero vector is returned.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InputMismatch`] if `inputs` does not have one
    /// value per genome input node.
    pub fn activate(&mut self, inputs: &[f32]) -> Result<Vec<f32>> {
        if inputs.len() != self.inputs.len() {
            return Err(NeatError::InputMismatch {
                expected: self.inputs.len(),
                actual: inputs.len(),
            });
        }
        self.reset(false);

        for (slot, &value) in self.inputs.iter().zip(inputs) {
            if let Some(key) = *slot {
                let neuron = &mut self.neurons[key];
                neuron.value = value;
                neuron.activated = true;
            }
        }

        for path in &self.paths {
            for &key in path {
                if self.neurons[key].activated {
                    continue;
                }
                let Some(value) = fire(&self.neurons, key, &mut self.scratch) else {
                    trace!(node = self.neurons[key].node_id, "non-finite activation");
                    self.damaged = true;
                    return Ok(vec![0.0; self.outputs.len()]);
                };
                let neuron = &mut self.neurons[key];
                neuron.value = value;
                neuron.activated = true;
            }
        }

        Ok(self.outputs.iter().map(|&key| self.neurons[key].value).collect())
    }
}

/// Compute one neuron's output from its sources. `None` on a non-finite value.
fn fire(neurons: &SlotMap<NeuronKey, Neuron>, key: NeuronKey, scratch: &mut Vec<f32>) -> Option<f32> {
    let neuron = &neurons[key];
    if neuron.node_type == NodeType::Input {
        return Some(neuron.value);
    }
    if neuron.incoming.is_empty() {
        return Some(0.0);
    }
    scratch.clear();
    scratch.extend(
        neuron
            .incoming
            .iter()
            .map(|&(source, weight)| neurons[source].value * weight),
    );
    let aggregated = (neuron.aggregation)(scratch.as_slice());
    let pre_activation = aggregated * neuron.response + neuron.bias;
    let value = (neuron.activation)(pre_activation);
    (aggregated.is_finite() && pre_activation.is_finite() && value.is_finite()).then_some(value)
}

/// Dependency layers of `output`, flattened deepest first with duplicates
/// removed.
fn activation_path(topology: &GraphTopology, output: NodeId) -> Vec<NodeId> {
    let Some(start) = topology.node_index(output) else {
        return vec![output];
    };

    let mut layers: Vec<Vec<usize>> = vec![vec![start]];
    loop {
        let Some(last) = layers.last() else { break };
        let mut seen = BTreeSet::new();
        let next: Vec<usize> = last
            .iter()
            .flat_map(|&idx| topology.predecessors(idx))
            .filter(|idx| seen.insert(*idx))
            .collect();
        if next.is_empty() {
            break;
        }
        layers.push(next);
    }

    let mut emitted = BTreeSet::new();
    layers
        .iter()
        .rev()
        .flatten()
        .filter(|&&idx| emitted.insert(idx))
        .filter_map(|&idx| topology.node_id(idx))
        .collect()
}
