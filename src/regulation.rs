//! Complexity regulation strategies.
//!
//! A regulation strategy decides, once per generation, which structural
//! mutation rates the next round of asexual offspring is mutated with.
//! [`Phased`] alternates between growing and pruning phases; the other
//! strategies hold fixed rates.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ComplexityType, Config, RegulationKind};
use crate::math;

/// The four structural mutation probabilities handed to `Genome::mutate`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuralRates {
    pub node_add: f32,
    pub node_delete: f32,
    pub conn_add: f32,
    pub conn_delete: f32,
}

impl StructuralRates {
    /// Every rate as configured in `[genome]`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            node_add: config.genome.node_add_rate,
            node_delete: config.genome.node_delete_rate,
            conn_add: config.genome.conn_add_rate,
            conn_delete: config.genome.conn_delete_rate,
        }
    }

    /// Configured add rates, delete rates zeroed.
    #[must_use]
    pub fn additive(config: &Config) -> Self {
        Self {
            node_delete: 0.0,
            conn_delete: 0.0,
            ..Self::from_config(config)
        }
    }

    /// Configured delete rates, add rates zeroed.
    #[must_use]
    pub fn subtractive(config: &Config) -> Self {
        Self {
            node_add: 0.0,
            conn_add: 0.0,
            ..Self::from_config(config)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationMode {
    Complexifying,
    Simplifying,
}

impl fmt::Display for RegulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complexifying => f.write_str("complexifying"),
            Self::Simplifying => f.write_str("simplifying"),
        }
    }
}

/// Population summary a regulation strategy reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulationInput {
    pub generation: usize,
    /// Mean connection count over the evaluated population.
    pub mean_complexity: f32,
    /// Best fitness seen so far in the run.
    pub best_fitness: f32,
}

/// Strategy interface selected by `neat.regulation`.
pub trait ComplexityRegulation: fmt::Debug {
    fn mode(&self) -> RegulationMode;

    /// Structural rates for the next mutation round.
    fn rates(&self) -> StructuralRates;

    /// Observe one generation and possibly change phase.
    fn determine_mode(&mut self, input: &RegulationInput);
}

/// Build the strategy named by `neat.regulation`.
#[must_use]
pub fn from_config(config: &Config) -> Box<dyn ComplexityRegulation> {
    match config.neat.regulation {
        RegulationKind::Phased => Box::new(Phased::new(config)),
        RegulationKind::Blended => Box::new(Blended::new(config)),
        RegulationKind::Complexify => Box::new(Complexify::new(config)),
        RegulationKind::NoRegulation => Box::new(NoRegulation),
    }
}

/// Always grow: add rates as configured, no deletions.
#[derive(Debug, Clone)]
pub struct Complexify {
    rates: StructuralRates,
}

impl Complexify {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            rates: StructuralRates::additive(config),
        }
    }
}

impl ComplexityRegulation for Complexify {
    fn mode(&self) -> RegulationMode {
        RegulationMode::Complexifying
    }

    fn rates(&self) -> StructuralRates {
        self.rates
    }

    fn determine_mode(&mut self, _input: &RegulationInput) {}
}

/// Fixed-rate search where additions and deletions compete every generation.
#[derive(Debug, Clone)]
pub struct Blended {
    rates: StructuralRates,
}

impl Blended {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            rates: StructuralRates::from_config(config),
        }
    }
}

impl ComplexityRegulation for Blended {
    fn mode(&self) -> RegulationMode {
        RegulationMode::Complexifying
    }

    fn rates(&self) -> StructuralRates {
        self.rates
    }

    fn determine_mode(&mut self, _input: &RegulationInput) {}
}

/// No structural mutation at all; only parameters evolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegulation;

impl ComplexityRegulation for NoRegulation {
    fn mode(&self) -> RegulationMode {
        RegulationMode::Complexifying
    }

    fn rates(&self) -> StructuralRates {
        StructuralRates::default()
    }

    fn determine_mode(&mut self, _input: &RegulationInput) {}
}

/// Two-phase regulation.
///
/// Complexifying runs with add rates only. Once mean complexity rises above
/// the ceiling while the best fitness has stalled for
/// `phase_fitness_plateau_threshold` generations, the strategy switches to
/// simplifying (delete rates only). It switches back after at least
/// `phase_simplification_generations_threshold` generations, once mean
/// complexity is below the ceiling again and, with a non-zero moving-average
/// window, the windowed mean complexity has stopped falling.
///
/// In [`ComplexityType::Relative`] mode the ceiling is the mean complexity
/// plus `phased_complexity_threshold`, taken from the first generation and
/// again at every return to complexifying.
#[derive(Debug, Clone)]
pub struct Phased {
    mode: RegulationMode,
    rates: StructuralRates,
    additive: StructuralRates,
    subtractive: StructuralRates,
    complexity_type: ComplexityType,
    threshold: f32,
    ceiling: Option<f32>,
    plateau_threshold: usize,
    simplification_threshold: usize,
    window: usize,
    last_transition: usize,
    plateau: usize,
    best_fitness: f32,
    history: VecDeque<f32>,
}

impl Phased {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let neat = &config.neat;
        let additive = StructuralRates::additive(config);
        let ceiling = match neat.phased_complexity_type {
            ComplexityType::Absolute => Some(neat.phased_complexity_threshold),
            ComplexityType::Relative => None,
        };
        Self {
            mode: RegulationMode::Complexifying,
            rates: additive,
            additive,
            subtractive: StructuralRates::subtractive(config),
            complexity_type: neat.phased_complexity_type,
            threshold: neat.phased_complexity_threshold,
            ceiling,
            plateau_threshold: neat.phase_fitness_plateau_threshold,
            simplification_threshold: neat.phase_simplification_generations_threshold,
            window: neat.phase_complexity_moving_average_window,
            last_transition: 0,
            plateau: 0,
            best_fitness: f32::NEG_INFINITY,
            history: VecDeque::new(),
        }
    }

    /// Current complexity ceiling, once known.
    #[must_use]
    pub fn ceiling(&self) -> Option<f32> {
        self.ceiling
    }

    /// Generations in the current complexifying phase without a better best fitness.
    #[must_use]
    pub fn plateau(&self) -> usize {
        self.plateau
    }

    fn record(&mut self, mean_complexity: f32) {
        if self.window == 0 {
            return;
        }
        self.history.push_back(mean_complexity);
        while self.history.len() > 2 * self.window {
            self.history.pop_front();
        }
    }

    /// Whether the latest window mean is at least the previous window mean.
    /// Holds trivially with a zero window; fails until two full windows are
    /// recorded.
    fn moving_average_settled(&self) -> bool {
        if self.window == 0 {
            return true;
        }
        if self.history.len() < 2 * self.window {
            return false;
        }
        let values: Vec<f32> = self.history.iter().copied().collect();
        let (previous, current) = values.split_at(self.window);
        math::mean(current) >= math::mean(previous)
    }
}

impl ComplexityRegulation for Phased {
    fn mode(&self) -> RegulationMode {
        self.mode
    }

    fn rates(&self) -> StructuralRates {
        self.rates
    }

    fn determine_mode(&mut self, input: &RegulationInput) {
        self.record(input.mean_complexity);
        match self.mode {
            RegulationMode::Complexifying => {
                let ceiling = *self
                    .ceiling
                    .get_or_insert(input.mean_complexity + self.threshold);
                if input.best_fitness > self.best_fitness {
                    self.best_fitness = input.best_fitness;
                    self.plateau = 0;
                } else {
                    self.plateau += 1;
                }

                if input.mean_complexity > ceiling && self.plateau >= self.plateau_threshold {
                    debug!(
                        generation = input.generation,
                        mean_complexity = input.mean_complexity,
                        ceiling,
                        "regulation switching to simplifying"
                    );
                    self.mode = RegulationMode::Simplifying;
                    self.rates = self.subtractive;
                    self.last_transition = input.generation;
                    self.plateau = 0;
                }
            }
            RegulationMode::Simplifying => {
                let Some(ceiling) = self.ceiling else {
                    return;
                };
                let elapsed = input.generation.saturating_sub(self.last_transition);
                if elapsed >= self.simplification_threshold
                    && input.mean_complexity < ceiling
                    && self.moving_average_settled()
                {
                    if self.complexity_type == ComplexityType::Relative {
                        self.ceiling = Some(input.mean_complexity + self.threshold);
                    }
                    debug!(
                        generation = input.generation,
                        mean_complexity = input.mean_complexity,
                        ceiling = ?self.ceiling,
                        "regulation switching to complexifying"
                    );
                    self.mode = RegulationMode::Complexifying;
                    self.rates = self.additive;
                    self.last_transition = input.generation;
                    self.plateau = 0;
                }
            }
        }
    }
}
