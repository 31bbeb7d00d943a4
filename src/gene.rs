//! Gene types for NEAT genomes.
//!
//! This module defines the fundamental building blocks of NEAT networks:
//! - [`NodeGene`]: a neuron with bias, response gain, activation and aggregation
//! - [`ConnectionGene`]: a weighted, possibly disabled edge identified by its
//!   innovation number
//!
//! Identity fields (ids, node type, endpoints) never change after creation.
//! Value fields are changed by [`NodeGene::mutate`] / [`ConnectionGene::mutate`]
//! and mixed by the `crossover` methods.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ConnectionConfig, NodeConfig};
use crate::math;

/// Identifier of a node, unique within a genome.
pub type NodeId = u64;

/// Identifier of a connection: its run-wide innovation number.
pub type ConnectionId = u64;

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Receives an external value; identity activation, never mutated.
    Input,
    /// Internal node added by initialization or mutation.
    Hidden,
    /// Produces a network output.
    Output,
}

/// A node gene representing a neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Added after aggregation and response scaling.
    pub bias: f32,
    /// Multiplicative gain applied to the aggregated input.
    pub response: f32,
    /// Activation function key.
    pub activation: String,
    /// Aggregation function key.
    pub aggregation: String,
}

impl NodeGene {
    /// Create an input node: identity activation, sum aggregation, bias 0, response 1.
    #[must_use]
    pub fn input(id: NodeId) -> Self {
        Self {
            id,
            node_type: NodeType::Input,
            bias: 0.0,
            response: 1.0,
            activation: "identity".to_string(),
            aggregation: "sum".to_string(),
        }
    }

    /// Create a node of `node_type` with attributes drawn from `config`.
    ///
    /// Input nodes ignore the configuration, see [`NodeGene::input`].
    pub fn new<R: Rng + ?Sized>(
        id: NodeId,
        node_type: NodeType,
        config: &NodeConfig,
        rng: &mut R,
    ) -> Self {
        if node_type == NodeType::Input {
            return Self::input(id);
        }
        let activation = match node_type {
            NodeType::Output => config.activation_default_output.clone(),
            _ => config.activation_default.clone(),
        };
        Self {
            id,
            node_type,
            bias: fresh_bias(config, rng),
            response: fresh_response(config, rng),
            activation,
            aggregation: config.aggregation_default.clone(),
        }
    }

    /// Inherit all value fields from one parent chosen by a fair coin.
    ///
    /// # Panics
    ///
    /// Panics if the two genes differ in id or node type.
    #[must_use]
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Self, rng: &mut R) -> Self {
        assert_eq!(self.id, other.id, "node crossover between different ids");
        assert_eq!(
            self.node_type, other.node_type,
            "node crossover between different node types"
        );
        if rng.random_bool(0.5) {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// Apply parametric mutation under the configured single/independent policy.
    ///
    /// Input nodes are left untouched.
    pub fn mutate<R: Rng + ?Sized>(&mut self, config: &NodeConfig, rng: &mut R) {
        if self.node_type == NodeType::Input {
            return;
        }
        let rates = [
            config.bias_mutate_rate,
            config.bias_replace_rate,
            config.response_mutate_rate,
            config.response_replace_rate,
            config.activation_mutate_rate,
            config.aggregation_mutate_rate,
        ];
        if config.single_structural_mutation {
            apply_single(&rates, rng, |op, rng| self.apply_operator(op, config, rng));
        } else {
            for (op, rate) in rates.into_iter().enumerate() {
                if rng.random::<f32>() < rate {
                    self.apply_operator(op, config, rng);
                }
            }
        }
    }

    fn apply_operator<R: Rng + ?Sized>(&mut self, op: usize, config: &NodeConfig, rng: &mut R) -> bool {
        match op {
            0 => {
                self.bias = math::perturb(
                    self.bias,
                    config.bias_mutate_stdev,
                    config.bias_min_value,
                    config.bias_max_value,
                    rng,
                );
                true
            }
            1 => {
                self.bias = fresh_bias(config, rng);
                true
            }
            2 => {
                self.response = math::perturb(
                    self.response,
                    config.response_mutate_stdev,
                    config.response_min_value,
                    config.response_max_value,
                    rng,
                );
                true
            }
            3 => {
                self.response = fresh_response(config, rng);
                true
            }
            4 => {
                if self.node_type != NodeType::Hidden || config.activation_options.len() < 2 {
                    return false;
                }
                match pick_other(&config.activation_options, &self.activation, rng) {
                    Some(key) => {
                        self.activation = key;
                        true
                    }
                    None => false,
                }
            }
            _ => match pick_other(&config.aggregation_options, &self.aggregation, rng) {
                Some(key) => {
                    self.aggregation = key;
                    true
                }
                None => false,
            },
        }
    }
}

/// A connection gene: a weighted edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    /// Innovation number shared by every genome holding the same edge.
    pub id: ConnectionId,
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f32,
    /// Disabled connections are skipped by the phenotype but kept for
    /// crossover alignment and cycle checks.
    pub enabled: bool,
}

impl ConnectionGene {
    /// Create a connection with an explicit weight and enabled flag.
    #[must_use]
    pub fn with_weight(
        id: ConnectionId,
        source: NodeId,
        target: NodeId,
        weight: f32,
        enabled: bool,
    ) -> Self {
        Self {
            id,
            source,
            target,
            weight,
            enabled,
        }
    }

    /// Create a connection with a weight drawn from `config` and the
    /// configured default enabled flag.
    pub fn new<R: Rng + ?Sized>(
        id: ConnectionId,
        source: NodeId,
        target: NodeId,
        config: &ConnectionConfig,
        rng: &mut R,
    ) -> Self {
        Self::with_weight(id, source, target, fresh_weight(config, rng), config.enabled_default)
    }

    /// Inherit weight and enabled flag from one parent chosen by a fair coin.
    ///
    /// # Panics
    ///
    /// Panics if the two genes differ in id or endpoints.
    #[must_use]
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Self, rng: &mut R) -> Self {
        assert_eq!(self.id, other.id, "connection crossover between different ids");
        assert_eq!(
            (self.source, self.target),
            (other.source, other.target),
            "connection crossover between different endpoints"
        );
        if rng.random_bool(0.5) {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// Apply parametric mutation (weight perturb, weight replace, enabled toggle).
    pub fn mutate<R: Rng + ?Sized>(&mut self, config: &ConnectionConfig, rng: &mut R) {
        let rates = [
            config.weight_mutate_rate,
            config.weight_replace_rate,
            config.enabled_mutate_rate,
        ];
        if config.single_structural_mutation {
            apply_single(&rates, rng, |op, rng| self.apply_operator(op, config, rng));
        } else {
            for (op, rate) in rates.into_iter().enumerate() {
                if rng.random::<f32>() < rate {
                    self.apply_operator(op, config, rng);
                }
            }
        }
    }

    fn apply_operator<R: Rng + ?Sized>(
        &mut self,
        op: usize,
        config: &ConnectionConfig,
        rng: &mut R,
    ) -> bool {
        match op {
            0 => {
                self.weight = math::perturb(
                    self.weight,
                    config.weight_mutate_stdev,
                    config.weight_min_value,
                    config.weight_max_value,
                    rng,
                );
            }
            1 => self.weight = fresh_weight(config, rng),
            _ => self.enabled = !self.enabled,
        }
        true
    }

    /// Distance between two genes with the same id, in [0, 1].
    ///
    /// Half comes from the weight difference relative to the configured
    /// weight range, half from an enabled-flag mismatch.
    #[must_use]
    pub fn distance(&self, other: &Self, config: &ConnectionConfig) -> f32 {
        let range = config.weight_max_value - config.weight_min_value;
        let weight_term = if range > 0.0 {
            ((self.weight - other.weight).abs() / range).min(1.0)
        } else {
            0.0
        };
        let enabled_term = if self.enabled == other.enabled { 0.0 } else { 1.0 };
        0.5 * weight_term + 0.5 * enabled_term
    }
}

/// Draw one operator by normalised rate, retrying with a failed operator's
/// mass removed, until one succeeds or no mass is left.
fn apply_single<R, F>(rates: &[f32], rng: &mut R, mut apply: F)
where
    R: Rng + ?Sized,
    F: FnMut(usize, &mut R) -> bool,
{
    let mut weights = rates.to_vec();
    while let Some(op) = math::weighted_choice(&weights, rng) {
        if apply(op, rng) {
            return;
        }
        weights[op] = 0.0;
    }
}

fn pick_other<R: Rng + ?Sized>(options: &[String], current: &str, rng: &mut R) -> Option<String> {
    let candidates: Vec<&String> = options.iter().filter(|o| o.as_str() != current).collect();
    candidates.choose(rng).map(|key| (*key).clone())
}

fn fresh_bias<R: Rng + ?Sized>(config: &NodeConfig, rng: &mut R) -> f32 {
    math::sample_initial(
        config.bias_init_type,
        config.bias_init_mean,
        config.bias_init_stdev,
        config.bias_min_value,
        config.bias_max_value,
        rng,
    )
}

fn fresh_response<R: Rng + ?Sized>(config: &NodeConfig, rng: &mut R) -> f32 {
    math::sample_initial(
        config.response_init_type,
        config.response_init_mean,
        config.response_init_stdev,
        config.response_min_value,
        config.response_max_value,
        rng,
    )
}

fn fresh_weight<R: Rng + ?Sized>(config: &ConnectionConfig, rng: &mut R) -> f32 {
    math::sample_initial(
        config.weight_init_type,
        config.weight_init_mean,
        config.weight_init_stdev,
        config.weight_min_value,
        config.weight_max_value,
        rng,
    )
}
