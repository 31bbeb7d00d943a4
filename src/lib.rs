//! # Evolving Networks
//!
//! A NEAT-style neuroevolution engine: networks grow and shrink their
//! topology and tune their parameters through a generational genetic
//! algorithm driven by a user-supplied fitness function.
//!
//! ## Features
//!
//! - **Run-scoped innovation tracking**: an explicit [`InnovationRegistry`]
//!   gives every structural edge one id for the whole run, so crossover and
//!   distance align genes by history rather than by position
//! - **Speciation**: nearest-representative clustering under a normalised
//!   [0, 1] compatibility distance, with stagnation pruning
//! - **Exact-size reproduction**: species budgets are rounded stochastically
//!   and corrected until they sum to the population size
//! - **Complexity regulation**: phased complexify/simplify cycles, or fixed
//!   blended, additive or parametric-only search
//! - **Feed-forward phenotypes**: cycle-checked topologies compiled into an
//!   arena of neurons with per-output activation paths
//!
//! ## Quick Start
//!
//! ```rust
//! use evolving_networks::{
//!     Activations, Aggregations, Config, FeedForwardNetwork, Genome, GenomeId, Population,
//! };
//!
//! const XOR: [([f32; 2], f32); 4] = [
//!     ([0.0, 0.0], 0.0),
//!     ([0.0, 1.0], 1.0),
//!     ([1.0, 0.0], 1.0),
//!     ([1.0, 1.0], 0.0),
//! ];
//!
//! fn xor_fitness(genomes: &mut [(GenomeId, &mut Genome)], _config: &Config) {
//!     let activations = Activations::default();
//!     let aggregations = Aggregations::default();
//!     for (_, genome) in genomes.iter_mut() {
//!         let Ok(mut network) = FeedForwardNetwork::new(genome, &activations, &aggregations) else {
//!             genome.is_damaged = true;
//!             continue;
//!         };
//!         let mut fitness = 4.0;
//!         for (inputs, expected) in XOR {
//!             let output = network.activate(&inputs).map_or(f32::NAN, |o| o[0]);
//!             fitness -= (output - expected).powi(2);
//!         }
//!         genome.fitness = fitness;
//!         genome.is_damaged |= network.is_damaged();
//!     }
//! }
//!
//! let mut config = Config::minimal(2, 1);
//! config.neat.population_size = 50;
//! config.neat.seed = Some(42);
//!
//! let mut population = Population::new(config)?;
//! population.initialize(xor_fitness)?;
//! let best = population.fit(Some(10))?;
//! assert!(best.fitness <= 4.0);
//! # Ok::<(), evolving_networks::NeatError>(())
//! ```
//!
//! ## Architecture
//!
//! ### Genome
//!
//! A [`Genome`] keeps node and connection genes in ordered maps keyed by id,
//! a [`NodePartition`] of node ids by role and a [`ConnectorIndex`] of the
//! edges an add-connection mutation may still create. Every structural edit
//! goes through a small set of insert/remove methods that keep all three in
//! step.
//!
//! ### Strategies
//!
//! [`Population`] drives three strategy objects chosen at construction:
//! [`Speciation`], [`Reproduction`] and [`ComplexityRegulation`]. The
//! defaults are [`TraditionalSpeciation`], [`TraditionalReproduction`] and
//! whatever `neat.regulation` names.
//!
//! ### Topology
//!
//! [`GraphTopology`] is a CSR snapshot of a genome's graph. It answers the
//! cycle questions asked by mutation and crossover in feed-forward mode and
//! the dependency walk of [`FeedForwardNetwork`].

pub mod activation;
pub mod aggregation;
pub mod config;
pub mod connectors;
pub mod error;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod math;
pub mod persistence;
pub mod phenotype;
pub mod population;
pub mod regulation;
pub mod reproduction;
pub mod speciation;
pub mod species;
pub mod statistics;
pub mod topology;

// Re-exports for convenience
pub use activation::{ActivationFn, Activations};
pub use aggregation::{AggregationFn, Aggregations};
pub use config::{
    ComplexityType, Config, ConnectionConfig, FitnessCriterion, GenomeConfig, InitType,
    InitialConnection, NeatConfig, NodeConfig, RegulationKind, ReproductionConfig, SpeciesConfig,
};
pub use connectors::{Connector, ConnectorIndex};
pub use error::{NeatError, Result};
pub use gene::{ConnectionGene, ConnectionId, NodeGene, NodeId, NodeType};
pub use genome::{Genome, GenomeId, NodePartition};
pub use innovation::{InnovationRegistry, InnovationSnapshot};
pub use persistence::GenomeRecord;
pub use phenotype::FeedForwardNetwork;
pub use population::{FitnessFunction, Population};
pub use regulation::{
    Blended, ComplexityRegulation, Complexify, NoRegulation, Phased, RegulationInput,
    RegulationMode, StructuralRates,
};
pub use reproduction::{Reproduction, TraditionalReproduction};
pub use speciation::{Speciation, TraditionalSpeciation};
pub use species::{Species, SpeciesId};
pub use statistics::{GenerationStatistics, SpeciesStatistics, Summary};
pub use topology::{EdgeFilter, GraphTopology};
