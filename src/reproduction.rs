//! Fitness-proportionate reproduction.
//!
//! [`TraditionalReproduction`] prunes stagnant species, then fills each
//! surviving species' target size with elites, asexual offspring and
//! intra- or inter-species crossovers.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{NeatError, Result};
use crate::genome::{Genome, GenomeId};
use crate::innovation::InnovationRegistry;
use crate::math;
use crate::regulation::StructuralRates;
use crate::speciation::{self, Speciation};
use crate::species::{Species, SpeciesId};

/// Strategy interface for building populations.
pub trait Reproduction: fmt::Debug {
    /// Build generation `generation` from scratch.
    ///
    /// # Errors
    ///
    /// Propagates genome initialisation errors.
    fn populate(
        &mut self,
        population_size: usize,
        generation: usize,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<BTreeMap<GenomeId, Genome>>;

    /// Breed the next population from the speciated `population`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Extinction`] when no species is left to breed from.
    #[allow(clippy::too_many_arguments)]
    fn reproduce(
        &mut self,
        speciation: &mut dyn Speciation,
        population: &BTreeMap<GenomeId, Genome>,
        generation: usize,
        config: &Config,
        rates: StructuralRates,
        registry: &mut InnovationRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<BTreeMap<GenomeId, Genome>>;
}

/// Offspring plan for one species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Plan {
    survivors: usize,
    elites: usize,
    asexual: usize,
    inter: usize,
    intra: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TraditionalReproduction {
    next_genome_id: GenomeId,
}

impl TraditionalReproduction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next genome id to be issued.
    #[must_use]
    pub fn genome_id_counter(&self) -> GenomeId {
        self.next_genome_id
    }

    fn next_id(&mut self) -> GenomeId {
        let id = self.next_genome_id;
        self.next_genome_id += 1;
        id
    }
}

impl Reproduction for TraditionalReproduction {
    fn populate(
        &mut self,
        population_size: usize,
        generation: usize,
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<BTreeMap<GenomeId, Genome>> {
        let mut population = BTreeMap::new();
        for _ in 0..population_size {
            let id = self.next_id();
            let genome = Genome::initialize(id, generation, config, registry, rng)?;
            let previous = population.insert(id, genome);
            assert!(previous.is_none(), "genome id {id} allocated twice");
        }
        Ok(population)
    }

    fn reproduce(
        &mut self,
        speciation: &mut dyn Speciation,
        population: &BTreeMap<GenomeId, Genome>,
        generation: usize,
        config: &Config,
        rates: StructuralRates,
        registry: &mut InnovationRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<BTreeMap<GenomeId, Genome>> {
        let population_size = config.neat.population_size;
        let best_species = speciation.best_species();
        let species = speciation.species_mut();

        for s in species.values_mut() {
            s.record_fitness(generation);
        }
        species.retain(|&id, s| {
            if s.is_empty() {
                debug!(species = id, generation, "removing empty species");
            }
            !s.is_empty()
        });
        mark_stagnation(species, best_species, generation, config);
        species.retain(|&id, s| {
            if s.is_stagnant {
                debug!(species = id, generation, last_improved = s.last_improved, "removing stagnant species");
            }
            !s.is_stagnant
        });
        if species.is_empty() {
            return Err(NeatError::Extinction { generation });
        }
        speciation::allocate_targets(species, best_species, population_size, rng);

        let plans: BTreeMap<SpeciesId, Plan> = species
            .values()
            .map(|s| (s.id, plan_offspring(s, Some(s.id) == best_species, config, rng)))
            .collect();
        let breeding: Vec<SpeciesId> = plans
            .iter()
            .filter(|(_, p)| p.survivors > 0)
            .map(|(&id, _)| id)
            .collect();

        let mut next = BTreeMap::new();
        for (&species_id, plan) in &plans {
            let s = &species[&species_id];
            let parents = &s.members[..plan.survivors];
            let weights = parent_weights(parents, population);
            let (inter, intra) = sexual_split(plan, breeding.len());
            trace!(
                species = species_id,
                target = s.target_size,
                elites = plan.elites,
                asexual = plan.asexual,
                inter,
                intra,
                "breeding species"
            );

            for &elite in &s.members[..plan.elites] {
                if let Some(genome) = population.get(&elite) {
                    next.insert(elite, genome.clone());
                }
            }

            for _ in 0..plan.asexual {
                let parent = pick(parents, &weights, population, rng);
                let mut child = Genome::crossover_asexual(self.next_id(), generation, parent);
                child.mutate(rates, config, registry, rng);
                insert_child(&mut next, child);
            }

            for _ in 0..inter {
                let parent_1 = pick(parents, &weights, population, rng);
                let partner = partner_species(species_id, &breeding, &plans, rng).map(|id| {
                    let members = &species[&id].members[..plans[&id].survivors];
                    (members, parent_weights(members, population))
                });
                let child = match partner {
                    Some((members, partner_weights)) => {
                        let parent_2 = pick(members, &partner_weights, population, rng);
                        Genome::crossover_sexual(self.next_id(), generation, parent_1, parent_2, config, rng)
                    }
                    None => self.mate_within(parents, &weights, population, generation, config, rng),
                };
                insert_child(&mut next, child);
            }

            for _ in 0..intra {
                let child = self.mate_within(parents, &weights, population, generation, config, rng);
                insert_child(&mut next, child);
            }
        }

        assert_eq!(
            next.len(),
            population_size,
            "reproduction produced {} genomes for a population of {population_size}",
            next.len()
        );
        Ok(next)
    }
}

impl TraditionalReproduction {
    /// Sexual offspring of two distinct survivors, or an asexual copy when no
    /// second parent can be drawn.
    fn mate_within(
        &mut self,
        parents: &[GenomeId],
        weights: &[f32],
        population: &BTreeMap<GenomeId, Genome>,
        generation: usize,
        config: &Config,
        rng: &mut dyn RngCore,
    ) -> Genome {
        let first = weighted_index(weights, rng);
        let parent_1 = &population[&parents[first]];
        if parents.len() > 1 {
            let mut remaining = weights.to_vec();
            remaining[first] = 0.0;
            if let Some(second) = math::weighted_choice(&remaining, rng) {
                let parent_2 = &population[&parents[second]];
                return Genome::crossover_sexual(self.next_id(), generation, parent_1, parent_2, config, rng);
            }
        }
        Genome::crossover_asexual(self.next_id(), generation, parent_1)
    }
}

/// Mark species stagnant, sparing the `species_elitism` fittest and `best`.
fn mark_stagnation(
    species: &mut BTreeMap<SpeciesId, Species>,
    best: Option<SpeciesId>,
    generation: usize,
    config: &Config,
) {
    let mut ascending: Vec<SpeciesId> = species.keys().copied().collect();
    ascending.sort_by(|a, b| species[a].fitness.total_cmp(&species[b].fitness).then(a.cmp(b)));

    let protected = config.reproduction.species_elitism;
    let mut remaining = ascending.len();
    for id in ascending {
        let Some(s) = species.get_mut(&id) else {
            continue;
        };
        s.is_stagnant = remaining > protected
            && Some(id) != best
            && s.stagnant_time(generation) >= config.species.max_stagnation;
        if s.is_stagnant {
            remaining -= 1;
        }
    }
}

fn plan_offspring<R: Rng + ?Sized>(species: &Species, is_best: bool, config: &Config, rng: &mut R) -> Plan {
    let size = species.len();
    let target = species.target_size;
    let rates = &config.species;

    let survivors = ((size as f32 * rates.survivor_rate).round() as usize).clamp(1, size.max(1));
    let mut elites = target.min((size as f32 * rates.elitism).round() as usize);
    if is_best && elites == 0 && target > 0 {
        elites = 1;
    }
    let offspring = target - elites;
    let asexual = math::probabilistic_round(offspring as f32 * rates.off_spring_asexual_rate, rng).min(offspring);
    let sexual = offspring - asexual;
    let inter = math::probabilistic_round(sexual as f32 * rates.inter_species_mating_rate, rng).min(sexual);

    Plan {
        survivors,
        elites,
        asexual,
        inter,
        intra: sexual - inter,
    }
}

/// Inter- and intra-species offspring counts. Inter-species mating needs a
/// second breeding species; without one its share goes to intra.
fn sexual_split(plan: &Plan, breeding_species: usize) -> (usize, usize) {
    if breeding_species > 1 {
        (plan.inter, plan.intra)
    } else {
        (0, plan.inter + plan.intra)
    }
}

/// Normalised fitness of the survivors as selection weights, uniform when
/// they sum to zero.
fn parent_weights(parents: &[GenomeId], population: &BTreeMap<GenomeId, Genome>) -> Vec<f32> {
    let weights: Vec<f32> = parents
        .iter()
        .map(|id| population.get(id).map_or(0.0, |g| g.adjusted_fitness.max(0.0)))
        .collect();
    if weights.iter().sum::<f32>() > 0.0 {
        weights
    } else {
        vec![1.0; parents.len()]
    }
}

/// Weighted index, uniform when no weight is usable.
fn weighted_index<R: Rng + ?Sized>(weights: &[f32], rng: &mut R) -> usize {
    math::weighted_choice(weights, rng).unwrap_or_else(|| rng.random_range(0..weights.len()))
}

fn pick<'a, R: Rng + ?Sized>(
    parents: &[GenomeId],
    weights: &[f32],
    population: &'a BTreeMap<GenomeId, Genome>,
    rng: &mut R,
) -> &'a Genome {
    &population[&parents[weighted_index(weights, rng)]]
}

/// Another breeding species, drawn in proportion to its survivor count.
fn partner_species<R: Rng + ?Sized>(
    own: SpeciesId,
    breeding: &[SpeciesId],
    plans: &BTreeMap<SpeciesId, Plan>,
    rng: &mut R,
) -> Option<SpeciesId> {
    let candidates: Vec<SpeciesId> = breeding.iter().copied().filter(|&id| id != own).collect();
    let weights: Vec<f32> = candidates.iter().map(|id| plans[id].survivors as f32).collect();
    math::weighted_choice(&weights, rng)
        .map(|index| candidates[index])
        .or_else(|| candidates.choose(rng).copied())
}

fn insert_child(next: &mut BTreeMap<GenomeId, Genome>, child: Genome) {
    let id = child.id;
    let previous = next.insert(id, child);
    assert!(previous.is_none(), "genome id {id} allocated twice");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speciation::TraditionalSpeciation;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    /// Populate, assign distinct fitness, speciate and compute stats.
    fn generation_zero(
        config: &Config,
        registry: &mut InnovationRegistry,
        rng: &mut ChaCha8Rng,
    ) -> (TraditionalReproduction, TraditionalSpeciation, BTreeMap<GenomeId, Genome>) {
        let mut reproduction = TraditionalReproduction::new();
        let mut population = reproduction
            .populate(config.neat.population_size, 0, config, registry, rng)
            .unwrap();
        let size = population.len() as f32;
        for genome in population.values_mut() {
            genome.fitness = genome.id as f32;
            genome.adjusted_fitness = genome.id as f32 / (size - 1.0);
        }
        let mut speciation = TraditionalSpeciation::new();
        speciation.speciate(&population, 0, config, rng);
        speciation.calc_specie_stats(&population, config, rng);
        (reproduction, speciation, population)
    }

    #[test]
    fn test_populate_issues_sequential_ids() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let config = Config::minimal(2, 1);
        let mut reproduction = TraditionalReproduction::new();
        let population = reproduction.populate(5, 0, &config, &mut registry, &mut rng).unwrap();
        assert_eq!(population.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(reproduction.genome_id_counter(), 5);
        // Same edges, same innovations.
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reproduce_keeps_population_size() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.neat.population_size = 40;
        config.species.compatibility_threshold = 0.05;
        let (mut reproduction, mut speciation, population) =
            generation_zero(&config, &mut registry, &mut rng);
        let rates = StructuralRates::from_config(&config);

        let next = reproduction
            .reproduce(&mut speciation, &population, 1, &config, rates, &mut registry, &mut rng)
            .unwrap();
        assert_eq!(next.len(), 40);
        for (id, genome) in &next {
            assert_eq!(*id, genome.id);
            if !population.contains_key(id) {
                assert_eq!(genome.birth_generation, 1);
                assert!(*id >= 40, "fresh ids continue after generation zero");
            }
        }
    }

    #[test]
    fn test_elites_are_preserved() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.neat.population_size = 20;
        config.connection.weight_init_stdev = 0.0;
        config.species.elitism = 0.1;
        let (mut reproduction, mut speciation, population) =
            generation_zero(&config, &mut registry, &mut rng);
        assert_eq!(speciation.species().len(), 1);

        let rates = StructuralRates::from_config(&config);
        let next = reproduction
            .reproduce(&mut speciation, &population, 1, &config, rates, &mut registry, &mut rng)
            .unwrap();
        // round(20 * 0.1) = 2 elites: the two fittest genomes.
        for id in [19, 18] {
            let elite = &next[&id];
            assert_eq!(elite.fitness, population[&id].fitness);
            assert_eq!(elite.connections(), population[&id].connections());
        }
        assert!(!next.contains_key(&17));
    }

    #[test]
    fn test_stagnant_species_removed() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.neat.population_size = 10;
        config.species.compatibility_threshold = 0.0;
        config.species.max_stagnation = 0;
        config.reproduction.species_elitism = 2;
        let (mut reproduction, mut speciation, population) =
            generation_zero(&config, &mut registry, &mut rng);
        assert_eq!(speciation.species().len(), 10);

        let rates = StructuralRates::from_config(&config);
        let next = reproduction
            .reproduce(&mut speciation, &population, 1, &config, rates, &mut registry, &mut rng)
            .unwrap();
        assert_eq!(next.len(), 10);
        // Everything is stagnant immediately, only the two fittest survive.
        let mut kept: Vec<GenomeId> = speciation
            .species()
            .values()
            .map(|s| s.representative.id)
            .collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![8, 9]);
    }

    #[test]
    fn test_plan_counts() {
        let mut rng = test_rng();
        let mut config = Config::minimal(2, 1);
        config.species.survivor_rate = 0.2;
        config.species.elitism = 0.1;
        config.species.off_spring_asexual_rate = 1.0;
        let mut species = Species::new(0, 0, &Genome::new(0, 0));
        species.members = (0..10).collect();
        species.target_size = 12;

        let p = plan_offspring(&species, false, &config, &mut rng);
        assert_eq!(p.survivors, 2);
        assert_eq!(p.elites, 1);
        assert_eq!(p.asexual, 11);
        assert_eq!(p.inter + p.intra, 0);

        species.members = vec![0];
        species.target_size = 3;
        config.species.elitism = 0.0;
        let p = plan_offspring(&species, true, &config, &mut rng);
        assert_eq!(p.survivors, 1);
        assert_eq!(p.elites, 1, "best species keeps its champion");
    }

    fn plan(survivors: usize, inter: usize, intra: usize) -> Plan {
        Plan {
            survivors,
            elites: 0,
            asexual: 0,
            inter,
            intra,
        }
    }

    #[test]
    fn test_partner_species_excludes_own_and_follows_survivors() {
        let mut rng = test_rng();
        let plans: BTreeMap<SpeciesId, Plan> =
            BTreeMap::from([(0, plan(2, 1, 0)), (1, plan(1, 1, 0)), (2, plan(4, 1, 0))]);
        let breeding = vec![0, 1, 2];

        let mut counts = [0usize; 3];
        for _ in 0..2000 {
            let partner = partner_species(0, &breeding, &plans, &mut rng).unwrap();
            counts[partner as usize] += 1;
        }
        assert_eq!(counts[0], 0, "a species never mates with itself");
        // Weights 1 : 4.
        assert!(counts[1] > 250 && counts[1] < 550, "{counts:?}");
        assert!(counts[2] > 1450, "{counts:?}");

        assert_eq!(partner_species(0, &[0], &plans, &mut rng), None);
    }

    #[test]
    fn test_single_breeding_species_mates_within() {
        let p = plan(3, 4, 2);
        assert_eq!(sexual_split(&p, 1), (0, 6));
        assert_eq!(sexual_split(&p, 0), (0, 6));
        assert_eq!(sexual_split(&p, 2), (4, 2));
    }

    #[test]
    fn test_reproduce_with_inter_species_mating() {
        let mut rng = test_rng();
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(2, 1);
        config.neat.population_size = 12;
        config.species.compatibility_threshold = 0.0;
        config.species.elitism = 0.0;
        config.species.off_spring_asexual_rate = 0.0;
        config.species.inter_species_mating_rate = 1.0;
        let (mut reproduction, mut speciation, population) =
            generation_zero(&config, &mut registry, &mut rng);
        assert!(speciation.species().len() > 1);

        let rates = StructuralRates::from_config(&config);
        let next = reproduction
            .reproduce(&mut speciation, &population, 1, &config, rates, &mut registry, &mut rng)
            .unwrap();
        assert_eq!(next.len(), 12);
        // Only the best species' champion is carried over.
        let carried = next.keys().filter(|id| population.contains_key(id)).count();
        assert!(carried <= 1);
        for genome in next.values().filter(|g| !population.contains_key(&g.id)) {
            assert_eq!(genome.birth_generation, 1);
            assert!(!genome.has_cycle());
        }
    }

    #[test]
    fn test_mark_stagnation_protects_best() {
        let mut config = Config::minimal(2, 1);
        config.species.max_stagnation = 1;
        config.reproduction.species_elitism = 0;
        let mut species: BTreeMap<SpeciesId, Species> = (0..3)
            .map(|i| {
                let mut s = Species::new(i, 0, &Genome::new(i, 0));
                s.fitness = i as f32;
                (i, s)
            })
            .collect();
        mark_stagnation(&mut species, Some(0), 5, &config);
        assert!(!species[&0].is_stagnant);
        assert!(species[&1].is_stagnant);
        assert!(species[&2].is_stagnant);
    }
}
