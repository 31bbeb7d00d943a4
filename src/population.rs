//! The generational engine.
//!
//! [`Population`] owns everything a run needs: the configuration, the
//! innovation registry, the random number generator, the three swappable
//! strategies and the current genomes. Each generation is bred, evaluated
//! by the user's [`FitnessFunction`], cleaned of damaged genomes and
//! speciated, strictly in that order on one thread.
//!
//! ```rust
//! use evolving_networks::{Config, Genome, GenomeId, Population};
//!
//! let mut config = Config::minimal(2, 1);
//! config.neat.population_size = 20;
//! config.neat.no_fitness_termination = true;
//! config.neat.seed = Some(7);
//!
//! let mut population = Population::new(config)?;
//! population.initialize(|genomes: &mut [(GenomeId, &mut Genome)], _: &Config| {
//!     for (_, genome) in genomes.iter_mut() {
//!         genome.fitness = genome.complexity() as f32;
//!     }
//! })?;
//! let best = population.fit(Some(3))?;
//! assert!(best.fitness >= 2.0);
//! # Ok::<(), evolving_networks::NeatError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{NeatError, Result};
use crate::genome::{Genome, GenomeId};
use crate::innovation::InnovationRegistry;
use crate::math;
use crate::regulation::{self, ComplexityRegulation, RegulationInput, RegulationMode};
use crate::reproduction::{Reproduction, TraditionalReproduction};
use crate::speciation::{Speciation, TraditionalSpeciation};
use crate::species::{Species, SpeciesId};
use crate::statistics::GenerationStatistics;

/// Assigns fitness to a whole generation.
///
/// Every genome must receive a `fitness` before `evaluate` returns. A genome
/// may instead be flagged `is_damaged`; a non-finite fitness counts as
/// damaged too. Order of evaluation is up to the implementation.
///
/// The engine never sees the phenotypes built here. A
/// [`FeedForwardNetwork`](crate::phenotype::FeedForwardNetwork) that hit a
/// non-finite value returns zeros and only flags itself, so the
/// implementation must copy that flag onto the genome:
///
/// ```text
/// genome.is_damaged |= network.is_damaged();
/// ```
///
/// Otherwise the zeros are scored like any other output and the genome
/// stays in the population.
pub trait FitnessFunction {
    fn evaluate(&mut self, genomes: &mut [(GenomeId, &mut Genome)], config: &Config);
}

impl<F> FitnessFunction for F
where
    F: FnMut(&mut [(GenomeId, &mut Genome)], &Config),
{
    fn evaluate(&mut self, genomes: &mut [(GenomeId, &mut Genome)], config: &Config) {
        self(genomes, config);
    }
}

pub struct Population {
    config: Config,
    registry: InnovationRegistry,
    rng: ChaCha8Rng,
    speciation: Box<dyn Speciation>,
    reproduction: Box<dyn Reproduction>,
    regulation: Box<dyn ComplexityRegulation>,
    fitness_function: Option<Box<dyn FitnessFunction>>,
    genomes: BTreeMap<GenomeId, Genome>,
    best_genome: Option<Genome>,
    generation: usize,
    solved: bool,
    history: Vec<GenerationStatistics>,
}

impl Population {
    /// Engine with the traditional speciation and reproduction strategies and
    /// the regulation strategy named by `neat.regulation`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Configuration`] when `config` fails validation.
    pub fn new(config: Config) -> Result<Self> {
        let regulation = regulation::from_config(&config);
        Self::with_strategies(
            config,
            Box::new(TraditionalSpeciation::new()),
            Box::new(TraditionalReproduction::new()),
            regulation,
        )
    }

    /// Engine with caller-supplied strategies.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Configuration`] when `config` fails validation.
    pub fn with_strategies(
        config: Config,
        speciation: Box<dyn Speciation>,
        reproduction: Box<dyn Reproduction>,
        regulation: Box<dyn ComplexityRegulation>,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.neat.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            config,
            registry: InnovationRegistry::new(),
            rng,
            speciation,
            reproduction,
            regulation,
            fitness_function: None,
            genomes: BTreeMap::new(),
            best_genome: None,
            generation: 0,
            solved: false,
            history: Vec::new(),
        })
    }

    /// Build, evaluate and speciate generation zero.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Extinction`] if every genome comes back damaged,
    /// or propagates genome initialisation errors.
    pub fn initialize<F>(&mut self, fitness_function: F) -> Result<()>
    where
        F: FitnessFunction + 'static,
    {
        self.genomes = self.reproduction.populate(
            self.config.neat.population_size,
            self.generation,
            &self.config,
            &mut self.registry,
            &mut self.rng,
        )?;
        self.fitness_function = Some(Box::new(fitness_function));
        self.evaluate()
    }

    /// Run generations until the fitness threshold is met or
    /// `max_generations` more generations have been bred.
    ///
    /// Returns a copy of the best genome seen in the run.
    ///
    /// # Errors
    ///
    /// * [`NeatError::UnboundedRun`] when `max_generations` is `None` and
    ///   fitness termination is disabled.
    /// * [`NeatError::NotInitialized`] before [`Population::initialize`].
    /// * [`NeatError::Extinction`] if a whole generation is damaged.
    pub fn fit(&mut self, max_generations: Option<usize>) -> Result<Genome> {
        if max_generations.is_none() && self.config.neat.no_fitness_termination {
            return Err(NeatError::UnboundedRun);
        }
        if self.fitness_function.is_none() {
            return Err(NeatError::NotInitialized);
        }

        let mut bred = 0;
        while !self.solved && max_generations.map_or(true, |limit| bred < limit) {
            self.step()?;
            bred += 1;
        }
        self.best_genome.clone().ok_or(NeatError::NotInitialized)
    }

    /// Breed, evaluate and speciate one generation.
    ///
    /// # Errors
    ///
    /// As [`Population::fit`], minus the run-bound check.
    pub fn step(&mut self) -> Result<()> {
        if self.fitness_function.is_none() {
            return Err(NeatError::NotInitialized);
        }
        let rates = self.regulation.rates();
        self.genomes = self.reproduction.reproduce(
            self.speciation.as_mut(),
            &self.genomes,
            self.generation,
            &self.config,
            rates,
            &mut self.registry,
            &mut self.rng,
        )?;
        self.evaluate()
    }

    fn evaluate(&mut self) -> Result<()> {
        let generation = self.generation;
        let Some(fitness_function) = self.fitness_function.as_mut() else {
            return Err(NeatError::NotInitialized);
        };
        {
            let mut batch: Vec<(GenomeId, &mut Genome)> =
                self.genomes.iter_mut().map(|(&id, g)| (id, g)).collect();
            fitness_function.evaluate(&mut batch, &self.config);
        }

        for (id, genome) in &mut self.genomes {
            if !genome.fitness.is_finite() && !genome.is_damaged {
                warn!(genome = id, fitness = genome.fitness, generation, "non-finite fitness");
                genome.is_damaged = true;
            }
        }
        let before = self.genomes.len();
        self.genomes.retain(|_, g| !g.is_damaged);
        let damaged = before - self.genomes.len();
        if damaged > 0 {
            warn!(generation, damaged, "dropping damaged genomes");
        }
        if self.genomes.is_empty() {
            return Err(NeatError::Extinction { generation });
        }

        let fitness: Vec<f32> = self.genomes.values().map(|g| g.fitness).collect();
        let min = fitness.iter().copied().fold(f32::INFINITY, f32::min);
        let max = fitness.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        for genome in self.genomes.values_mut() {
            genome.adjusted_fitness = if min == max {
                0.0
            } else {
                math::normalize(min, max, genome.fitness, 0.0, 1.0)
            };
        }

        let champion = self
            .genomes
            .values()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness).then(b.id.cmp(&a.id)));
        if let Some(champion) = champion {
            if self
                .best_genome
                .as_ref()
                .map_or(true, |best| champion.fitness > best.fitness)
            {
                self.best_genome = Some(champion.clone());
            }
        }

        self.speciation
            .speciate(&self.genomes, generation, &self.config, &mut self.rng);
        self.speciation
            .calc_specie_stats(&self.genomes, &self.config, &mut self.rng);

        let neat = &self.config.neat;
        self.solved = !neat.no_fitness_termination
            && neat.fitness_criterion.apply(&fitness) >= neat.fitness_threshold;

        let best_fitness = self.best_genome.as_ref().map_or(f32::NEG_INFINITY, |g| g.fitness);
        let stats = GenerationStatistics::collect(
            generation,
            &self.genomes,
            self.speciation.species(),
            best_fitness,
            damaged,
            self.regulation.mode(),
        );
        info!(
            generation,
            best_fitness,
            mean_fitness = stats.fitness.mean,
            mean_complexity = stats.complexity.mean,
            species = stats.species_count(),
            mode = %stats.regulation_mode,
            "generation evaluated"
        );

        if !self.solved {
            self.regulation.determine_mode(&RegulationInput {
                generation,
                mean_complexity: stats.complexity.mean,
                best_fitness,
            });
        }
        self.history.push(stats);
        self.generation += 1;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of generations evaluated so far.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Genomes of the last evaluated generation, damaged ones removed.
    #[must_use]
    pub fn genomes(&self) -> &BTreeMap<GenomeId, Genome> {
        &self.genomes
    }

    /// Fittest genome seen in the run.
    #[must_use]
    pub fn best_genome(&self) -> Option<&Genome> {
        self.best_genome.as_ref()
    }

    #[must_use]
    pub fn species(&self) -> &BTreeMap<SpeciesId, Species> {
        self.speciation.species()
    }

    /// Whether the last evaluated generation met the fitness threshold.
    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    #[must_use]
    pub fn statistics(&self) -> &[GenerationStatistics] {
        &self.history
    }

    #[must_use]
    pub fn registry(&self) -> &InnovationRegistry {
        &self.registry
    }

    #[must_use]
    pub fn regulation_mode(&self) -> RegulationMode {
        self.regulation.mode()
    }
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("generation", &self.generation)
            .field("genomes", &self.genomes.len())
            .field("species", &self.speciation.species().len())
            .field("regulation", &self.regulation)
            .field("solved", &self.solved)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(population_size: usize) -> Config {
        let mut config = Config::minimal(2, 1);
        config.neat.population_size = population_size;
        config.neat.no_fitness_termination = true;
        config.neat.seed = Some(42);
        config
    }

    fn sum_of_weights(genomes: &mut [(GenomeId, &mut Genome)], _: &Config) {
        for (_, genome) in genomes.iter_mut() {
            genome.fitness = genome
                .connections()
                .values()
                .filter(|c| c.enabled)
                .map(|c| c.weight)
                .sum();
        }
    }

    #[test]
    fn test_fit_requires_bound() {
        let mut population = Population::new(config(10)).unwrap();
        assert!(matches!(population.fit(None), Err(NeatError::UnboundedRun)));
    }

    #[test]
    fn test_fit_requires_initialize() {
        let mut population = Population::new(config(10)).unwrap();
        assert!(matches!(population.fit(Some(1)), Err(NeatError::NotInitialized)));
        assert!(matches!(population.step(), Err(NeatError::NotInitialized)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config(10);
        bad.neat.population_size = 0;
        assert!(matches!(Population::new(bad), Err(NeatError::Configuration(_))));
    }

    #[test]
    fn test_generations_keep_population_size() {
        let mut population = Population::new(config(30)).unwrap();
        population.initialize(sum_of_weights).unwrap();
        assert_eq!(population.generation(), 1);
        assert_eq!(population.genomes().len(), 30);

        population.fit(Some(5)).unwrap();
        assert_eq!(population.generation(), 6);
        assert_eq!(population.genomes().len(), 30);
        assert_eq!(population.statistics().len(), 6);
        for (index, stats) in population.statistics().iter().enumerate() {
            assert_eq!(stats.generation, index);
        }
    }

    #[test]
    fn test_best_genome_never_regresses() {
        let mut population = Population::new(config(30)).unwrap();
        population.initialize(sum_of_weights).unwrap();
        population.fit(Some(8)).unwrap();
        let history: Vec<f32> = population.statistics().iter().map(|s| s.best_fitness).collect();
        for pair in history.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        let best = population.best_genome().unwrap();
        assert_eq!(best.fitness, *history.last().unwrap());
    }

    #[test]
    fn test_adjusted_fitness_normalised() {
        let mut population = Population::new(config(20)).unwrap();
        population.initialize(sum_of_weights).unwrap();
        let adjusted: Vec<f32> = population.genomes().values().map(|g| g.adjusted_fitness).collect();
        assert!(adjusted.iter().all(|a| (0.0..=1.0).contains(a)));
        assert!(adjusted.contains(&0.0));
        assert!(adjusted.contains(&1.0));
    }

    #[test]
    fn test_damaged_genomes_dropped() {
        let mut population = Population::new(config(20)).unwrap();
        population
            .initialize(|genomes: &mut [(GenomeId, &mut Genome)], _: &Config| {
                for (id, genome) in genomes.iter_mut() {
                    genome.fitness = if *id % 2 == 0 { f32::NAN } else { 1.0 };
                }
            })
            .unwrap();
        assert_eq!(population.genomes().len(), 10);
        assert!(population.genomes().keys().all(|id| id % 2 == 1));
        assert_eq!(population.statistics()[0].damaged, 10);

        // The next generation is bred back to full size.
        population.step().unwrap();
        assert_eq!(population.statistics()[1].damaged + population.genomes().len(), 20);
    }

    #[test]
    fn test_damaged_phenotypes_dropped() {
        use crate::activation::Activations;
        use crate::aggregation::Aggregations;
        use crate::phenotype::FeedForwardNetwork;

        let mut population = Population::new(config(20)).unwrap();
        population
            .initialize(|genomes: &mut [(GenomeId, &mut Genome)], _: &Config| {
                let activations = Activations::default();
                let aggregations = Aggregations::default();
                for (id, genome) in genomes.iter_mut() {
                    let mut network =
                        FeedForwardNetwork::new(genome, &activations, &aggregations).unwrap();
                    let x = if *id % 2 == 0 { f32::INFINITY } else { 0.5 };
                    let output = network.activate(&[x, 0.0]).unwrap();
                    genome.fitness = 1.0 + output[0];
                    genome.is_damaged |= network.is_damaged();
                }
            })
            .unwrap();
        assert_eq!(population.statistics()[0].damaged, 10);
        assert!(population.genomes().keys().all(|id| id % 2 == 1));
    }

    #[test]
    fn test_total_damage_is_extinction() {
        let mut population = Population::new(config(10)).unwrap();
        let result = population.initialize(|genomes: &mut [(GenomeId, &mut Genome)], _: &Config| {
            for (_, genome) in genomes.iter_mut() {
                genome.is_damaged = true;
            }
        });
        assert!(matches!(result, Err(NeatError::Extinction { generation: 0 })));
    }

    #[test]
    fn test_fitness_threshold_stops_run() {
        let mut config = config(10);
        config.neat.no_fitness_termination = false;
        config.neat.fitness_threshold = 1.0;
        let mut population = Population::new(config).unwrap();
        population
            .initialize(|genomes: &mut [(GenomeId, &mut Genome)], _: &Config| {
                for (_, genome) in genomes.iter_mut() {
                    genome.fitness = 1.0;
                }
            })
            .unwrap();
        assert!(population.is_solved());
        population.fit(None).unwrap();
        assert_eq!(population.generation(), 1, "no generation bred after solving");
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut population = Population::new(config(25)).unwrap();
            population.initialize(sum_of_weights).unwrap();
            population.fit(Some(4)).unwrap();
            population.statistics().to_vec()
        };
        assert_eq!(run(), run());
    }
}
