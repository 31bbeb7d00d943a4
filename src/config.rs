//! Run configuration.
//!
//! A configuration is a TOML document with six required tables:
//!
//! ```toml
//! [neat]
//! population_size = 150
//! fitness_threshold = 3.9
//!
//! [node]
//! [connection]
//! [genome]
//! num_inputs = 2
//! num_outputs = 1
//! initial_connection = "full_direct"
//!
//! [species]
//! [reproduction]
//! ```
//!
//! A missing table, an unknown key or an invalid enum value is rejected when
//! the document is parsed. Keys omitted inside a present table take the
//! section's default. [`Config::validate`] then checks value ranges.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NeatError, Result};
use crate::math;

/// How a population-level or species-level fitness value is derived from a
/// set of member fitnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessCriterion {
    /// Largest member fitness.
    Max,
    /// Smallest member fitness.
    Min,
    /// Arithmetic mean.
    Mean,
    /// Median.
    Median,
}

impl FitnessCriterion {
    /// Reduce `values` according to this criterion. Zero for an empty slice.
    #[must_use]
    pub fn apply(self, values: &[f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Max => values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            Self::Min => values.iter().copied().fold(f32::INFINITY, f32::min),
            Self::Mean => math::mean(values),
            Self::Median => math::median(values),
        }
    }
}

/// Which complexity regulation strategy drives the structural mutation rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationKind {
    /// Alternate between complexifying and simplifying phases.
    Phased,
    /// Add and delete rates all active, fixed.
    Blended,
    /// Only add rates active, fixed.
    Complexify,
    /// All structural rates zero.
    #[serde(rename = "none")]
    NoRegulation,
}

/// Whether the phased complexity ceiling is absolute or re-anchored relative
/// to the current mean complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityType {
    /// The ceiling is `phased_complexity_threshold`.
    Absolute,
    /// The ceiling is mean complexity plus `phased_complexity_threshold`,
    /// recomputed on each return to complexifying.
    Relative,
}

/// Distribution used to draw fresh attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitType {
    /// Clamped normal distribution.
    Normal,
    /// Uniform over mean ± 2 stdev, intersected with the value range.
    Uniform,
}

/// Initial wiring strategy for generation-zero genomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialConnection {
    /// No connections.
    Unconnected,
    /// One random input connected to every output.
    FsNeatNoHidden,
    /// One random input connected to every hidden and output node.
    FsNeatHidden,
    /// Input→hidden→output, with direct input→output only when there are no hidden nodes.
    FullNoDirect,
    /// Input→hidden→output plus direct input→output.
    FullDirect,
    /// Random subset of `FullNoDirect`.
    PartialNoDirect,
    /// Random subset of `FullDirect`.
    PartialDirect,
}

/// `[neat]`: population-wide parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeatConfig {
    /// Number of genomes per generation.
    pub population_size: usize,
    /// Criterion compared against `fitness_threshold` for termination.
    pub fitness_criterion: FitnessCriterion,
    /// Disable fitness-threshold termination.
    pub no_fitness_termination: bool,
    /// Stop once the fitness criterion reaches this value.
    pub fitness_threshold: f32,
    /// Complexity regulation strategy.
    pub regulation: RegulationKind,
    /// Ceiling mode for phased regulation.
    pub phased_complexity_type: ComplexityType,
    /// Absolute ceiling or relative margin for phased regulation.
    pub phased_complexity_threshold: f32,
    /// Generations without best-fitness improvement before simplifying.
    pub phase_fitness_plateau_threshold: usize,
    /// Minimum generations spent simplifying before complexifying again.
    pub phase_simplification_generations_threshold: usize,
    /// Window of the mean-complexity moving average that must stop falling
    /// before complexifying again. Zero disables the condition.
    pub phase_complexity_moving_average_window: usize,
    /// Seed for the engine's random number generator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            population_size: 150,
            fitness_criterion: FitnessCriterion::Max,
            no_fitness_termination: false,
            fitness_threshold: 3.9,
            regulation: RegulationKind::Blended,
            phased_complexity_type: ComplexityType::Absolute,
            phased_complexity_threshold: 30.0,
            phase_fitness_plateau_threshold: 10,
            phase_simplification_generations_threshold: 10,
            phase_complexity_moving_average_window: 0,
            seed: None,
        }
    }
}

/// `[node]`: node gene attribute distributions and mutation rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub bias_init_mean: f32,
    pub bias_init_stdev: f32,
    pub bias_init_type: InitType,
    pub bias_min_value: f32,
    pub bias_max_value: f32,
    pub bias_mutate_rate: f32,
    pub bias_mutate_stdev: f32,
    pub bias_replace_rate: f32,

    pub response_init_mean: f32,
    pub response_init_stdev: f32,
    pub response_init_type: InitType,
    pub response_min_value: f32,
    pub response_max_value: f32,
    pub response_mutate_rate: f32,
    pub response_mutate_stdev: f32,
    pub response_replace_rate: f32,

    /// Activation key for new hidden nodes.
    pub activation_default: String,
    /// Activation key for output nodes.
    pub activation_default_output: String,
    pub activation_mutate_rate: f32,
    /// Keys a hidden node's activation may mutate to.
    pub activation_options: Vec<String>,

    /// Aggregation key for new hidden and output nodes.
    pub aggregation_default: String,
    pub aggregation_mutate_rate: f32,
    /// Keys a node's aggregation may mutate to.
    pub aggregation_options: Vec<String>,

    /// Apply exactly one parametric operator per selected node.
    pub single_structural_mutation: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bias_init_mean: 0.0,
            bias_init_stdev: 1.0,
            bias_init_type: InitType::Normal,
            bias_min_value: -30.0,
            bias_max_value: 30.0,
            bias_mutate_rate: 0.7,
            bias_mutate_stdev: 0.5,
            bias_replace_rate: 0.1,
            response_init_mean: 1.0,
            response_init_stdev: 0.0,
            response_init_type: InitType::Normal,
            response_min_value: -30.0,
            response_max_value: 30.0,
            response_mutate_rate: 0.0,
            response_mutate_stdev: 0.0,
            response_replace_rate: 0.0,
            activation_default: "sigmoid".to_string(),
            activation_default_output: "sigmoid".to_string(),
            activation_mutate_rate: 0.0,
            activation_options: vec!["sigmoid".to_string()],
            aggregation_default: "sum".to_string(),
            aggregation_mutate_rate: 0.0,
            aggregation_options: vec!["sum".to_string()],
            single_structural_mutation: false,
        }
    }
}

/// `[connection]`: connection gene weight distribution and mutation rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub weight_init_mean: f32,
    pub weight_init_stdev: f32,
    pub weight_init_type: InitType,
    pub weight_min_value: f32,
    pub weight_max_value: f32,
    pub weight_mutate_rate: f32,
    pub weight_mutate_stdev: f32,
    pub weight_replace_rate: f32,
    /// Enabled flag of newly created connections.
    pub enabled_default: bool,
    /// Probability of toggling the enabled flag.
    pub enabled_mutate_rate: f32,
    /// Apply exactly one parametric operator per selected connection.
    pub single_structural_mutation: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            weight_init_mean: 0.0,
            weight_init_stdev: 1.0,
            weight_init_type: InitType::Normal,
            weight_min_value: -30.0,
            weight_max_value: 30.0,
            weight_mutate_rate: 0.8,
            weight_mutate_stdev: 0.5,
            weight_replace_rate: 0.1,
            enabled_default: true,
            enabled_mutate_rate: 0.01,
            single_structural_mutation: false,
        }
    }
}

/// `[genome]`: topology shape, structural mutation rates and distance weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenomeConfig {
    pub num_inputs: usize,
    pub num_hidden: usize,
    pub num_outputs: usize,
    pub initial_connection: InitialConnection,
    /// Fraction of the full connector set used by the `partial_*` strategies.
    pub partial_connection_rate: f32,
    /// Forbid cycles.
    pub feed_forward: bool,
    pub node_add_rate: f32,
    pub node_delete_rate: f32,
    pub conn_add_rate: f32,
    pub conn_delete_rate: f32,
    /// Apply exactly one structural operator per mutation.
    pub single_structural_mutation: bool,
    pub compatibility_disjoint_contribution: f32,
    pub compatibility_excess_contribution: f32,
    pub compatibility_weight_contribution: f32,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_hidden: 0,
            num_outputs: 1,
            initial_connection: InitialConnection::FullDirect,
            partial_connection_rate: 0.5,
            feed_forward: true,
            node_add_rate: 0.2,
            node_delete_rate: 0.2,
            conn_add_rate: 0.5,
            conn_delete_rate: 0.5,
            single_structural_mutation: false,
            compatibility_disjoint_contribution: 1.0,
            compatibility_excess_contribution: 1.0,
            compatibility_weight_contribution: 0.5,
        }
    }
}

/// `[species]`: clustering and per-species breeding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeciesConfig {
    /// Genomes closer than this to a representative join its species.
    pub compatibility_threshold: f32,
    /// How a species' fitness is derived from its members.
    pub fitness_criterion: FitnessCriterion,
    /// Generations without improvement before a species is stagnant.
    pub max_stagnation: usize,
    /// Fraction of each species copied unchanged as elites.
    pub elitism: f32,
    /// Fraction of offspring produced asexually.
    pub off_spring_asexual_rate: f32,
    /// Fraction of each species eligible as parents.
    pub survivor_rate: f32,
    /// Fraction of sexual offspring with a parent from another species.
    pub inter_species_mating_rate: f32,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            compatibility_threshold: 0.25,
            fitness_criterion: FitnessCriterion::Max,
            max_stagnation: 20,
            elitism: 0.1,
            off_spring_asexual_rate: 0.5,
            survivor_rate: 0.2,
            inter_species_mating_rate: 0.01,
        }
    }
}

/// `[reproduction]`: population-level breeding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReproductionConfig {
    /// Number of fittest species never removed for stagnation.
    pub species_elitism: usize,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self { species_elitism: 2 }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub neat: NeatConfig,
    pub node: NodeConfig,
    pub connection: ConnectionConfig,
    pub genome: GenomeConfig,
    pub species: SpeciesConfig,
    pub reproduction: ReproductionConfig,
}

impl Config {
    /// Create a default configuration with the given input/output counts.
    #[must_use]
    pub fn minimal(num_inputs: usize, num_outputs: usize) -> Self {
        let mut config = Self::default();
        config.genome.num_inputs = num_inputs;
        config.genome.num_outputs = num_outputs;
        config
    }

    /// Parse and validate a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::ConfigParse`] for structural problems and
    /// [`NeatError::Configuration`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Io`] if the file cannot be read, otherwise as
    /// [`Config::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| NeatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Render this configuration as a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::ConfigSerialize`] if a value cannot be encoded.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check value ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let neat = &self.neat;
        if neat.population_size == 0 {
            return invalid("neat.population_size must be at least 1");
        }
        if !neat.fitness_threshold.is_finite() {
            return invalid("neat.fitness_threshold must be finite");
        }
        non_negative("neat.phased_complexity_threshold", neat.phased_complexity_threshold)?;

        let node = &self.node;
        range(
            "node.bias",
            node.bias_min_value,
            node.bias_max_value,
            node.bias_init_stdev,
            node.bias_mutate_stdev,
        )?;
        range(
            "node.response",
            node.response_min_value,
            node.response_max_value,
            node.response_init_stdev,
            node.response_mutate_stdev,
        )?;
        for (name, rate) in [
            ("node.bias_mutate_rate", node.bias_mutate_rate),
            ("node.bias_replace_rate", node.bias_replace_rate),
            ("node.response_mutate_rate", node.response_mutate_rate),
            ("node.response_replace_rate", node.response_replace_rate),
            ("node.activation_mutate_rate", node.activation_mutate_rate),
            ("node.aggregation_mutate_rate", node.aggregation_mutate_rate),
        ] {
            probability(name, rate)?;
        }
        if node.activation_options.is_empty() {
            return invalid("node.activation_options must not be empty");
        }
        if node.aggregation_options.is_empty() {
            return invalid("node.aggregation_options must not be empty");
        }

        let conn = &self.connection;
        range(
            "connection.weight",
            conn.weight_min_value,
            conn.weight_max_value,
            conn.weight_init_stdev,
            conn.weight_mutate_stdev,
        )?;
        for (name, rate) in [
            ("connection.weight_mutate_rate", conn.weight_mutate_rate),
            ("connection.weight_replace_rate", conn.weight_replace_rate),
            ("connection.enabled_mutate_rate", conn.enabled_mutate_rate),
        ] {
            probability(name, rate)?;
        }

        let genome = &self.genome;
        if genome.num_inputs == 0 {
            return invalid("genome.num_inputs must be at least 1");
        }
        if genome.num_outputs == 0 {
            return invalid("genome.num_outputs must be at least 1");
        }
        for (name, rate) in [
            ("genome.partial_connection_rate", genome.partial_connection_rate),
            ("genome.node_add_rate", genome.node_add_rate),
            ("genome.node_delete_rate", genome.node_delete_rate),
            ("genome.conn_add_rate", genome.conn_add_rate),
            ("genome.conn_delete_rate", genome.conn_delete_rate),
        ] {
            probability(name, rate)?;
        }
        for (name, value) in [
            (
                "genome.compatibility_disjoint_contribution",
                genome.compatibility_disjoint_contribution,
            ),
            (
                "genome.compatibility_excess_contribution",
                genome.compatibility_excess_contribution,
            ),
            (
                "genome.compatibility_weight_contribution",
                genome.compatibility_weight_contribution,
            ),
        ] {
            non_negative(name, value)?;
        }

        let species = &self.species;
        non_negative("species.compatibility_threshold", species.compatibility_threshold)?;
        for (name, rate) in [
            ("species.elitism", species.elitism),
            ("species.off_spring_asexual_rate", species.off_spring_asexual_rate),
            ("species.survivor_rate", species.survivor_rate),
            ("species.inter_species_mating_rate", species.inter_species_mating_rate),
        ] {
            probability(name, rate)?;
        }

        Ok(())
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(NeatError::Configuration(message.to_string()))
}

fn probability(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(NeatError::Configuration(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(NeatError::Configuration(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

fn range(prefix: &str, min: f32, max: f32, init_stdev: f32, mutate_stdev: f32) -> Result<()> {
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(NeatError::Configuration(format!(
            "{prefix}_min_value must not exceed {prefix}_max_value"
        )));
    }
    non_negative(&format!("{prefix}_init_stdev"), init_stdev)?;
    non_negative(&format!("{prefix}_mutate_stdev"), mutate_stdev)
}
