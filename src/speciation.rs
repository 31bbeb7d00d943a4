//! Compatibility-distance speciation.
//!
//! [`TraditionalSpeciation`] keeps species alive across generations by
//! re-electing each representative as the nearest genome to the previous
//! one, then clusters the remaining genomes around the representatives.
//! [`allocate_targets`] turns species fitness into offspring budgets that
//! always add up to the population size.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, RngCore};
use tracing::{debug, trace};

use crate::config::Config;
use crate::genome::{Genome, GenomeId};
use crate::math;
use crate::species::{Species, SpeciesId};

/// Strategy interface for clustering a population into species.
pub trait Speciation: fmt::Debug {
    /// Assign every genome of `population` to a species.
    fn speciate(
        &mut self,
        population: &BTreeMap<GenomeId, Genome>,
        generation: usize,
        config: &Config,
        rng: &mut dyn RngCore,
    );

    /// Sort members, compute species fitness and allocate target sizes.
    fn calc_specie_stats(
        &mut self,
        population: &BTreeMap<GenomeId, Genome>,
        config: &Config,
        rng: &mut dyn RngCore,
    );

    fn species(&self) -> &BTreeMap<SpeciesId, Species>;

    fn species_mut(&mut self) -> &mut BTreeMap<SpeciesId, Species>;

    /// Species the genome was assigned to by the last `speciate` call.
    fn species_of(&self, genome_id: GenomeId) -> Option<SpeciesId>;

    /// Species holding the fittest genome of the last `calc_specie_stats` call.
    fn best_species(&self) -> Option<SpeciesId>;
}

/// Nearest-representative speciation with a strict distance threshold.
#[derive(Debug, Clone, Default)]
pub struct TraditionalSpeciation {
    species: BTreeMap<SpeciesId, Species>,
    genome_to_species: BTreeMap<GenomeId, SpeciesId>,
    next_species_id: SpeciesId,
    best_genome: Option<GenomeId>,
}

impl TraditionalSpeciation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Genome with the highest raw fitness, lowest id on ties.
    #[must_use]
    pub fn best_genome(&self) -> Option<GenomeId> {
        self.best_genome
    }

    fn found(&mut self, generation: usize, founder: &Genome) -> SpeciesId {
        let id = self.next_species_id;
        self.next_species_id += 1;
        debug!(species = id, founder = founder.id, generation, "new species");
        self.species.insert(id, Species::new(id, generation, founder));
        id
    }
}

impl Speciation for TraditionalSpeciation {
    fn speciate(
        &mut self,
        population: &BTreeMap<GenomeId, Genome>,
        generation: usize,
        config: &Config,
        rng: &mut dyn RngCore,
    ) {
        let mut unassigned: BTreeSet<GenomeId> = population.keys().copied().collect();

        let mut order: Vec<SpeciesId> = self.species.keys().copied().collect();
        order.shuffle(rng);
        for species_id in order {
            let Some(species) = self.species.get_mut(&species_id) else {
                continue;
            };
            let nearest = unassigned
                .iter()
                .filter_map(|id| population.get(id))
                .map(|genome| (genome.distance(&species.representative, config), genome))
                .min_by(|a, b| a.0.total_cmp(&b.0));
            match nearest {
                Some((distance, genome)) => {
                    trace!(species = species_id, genome = genome.id, distance, "representative re-elected");
                    species.representative = genome.clone();
                    species.members = vec![genome.id];
                    unassigned.remove(&genome.id);
                }
                None => species.members.clear(),
            }
        }

        let threshold = config.species.compatibility_threshold;
        for genome_id in unassigned {
            let Some(genome) = population.get(&genome_id) else {
                continue;
            };
            let nearest = self
                .species
                .values()
                .filter(|s| !s.is_empty())
                .map(|s| (genome.distance(&s.representative, config), s.id))
                .min_by(|a, b| a.0.total_cmp(&b.0));
            match nearest {
                Some((distance, species_id)) if distance < threshold => {
                    if let Some(species) = self.species.get_mut(&species_id) {
                        species.members.push(genome_id);
                    }
                }
                _ => {
                    self.found(generation, genome);
                }
            }
        }

        self.genome_to_species = self
            .species
            .values()
            .flat_map(|s| s.members.iter().map(move |&m| (m, s.id)))
            .collect();
    }

    fn calc_specie_stats(
        &mut self,
        population: &BTreeMap<GenomeId, Genome>,
        config: &Config,
        rng: &mut dyn RngCore,
    ) {
        for species in self.species.values_mut() {
            species.members.retain(|id| population.contains_key(id));
            species.members.sort_by(|a, b| {
                population[b]
                    .fitness
                    .total_cmp(&population[a].fitness)
                    .then(a.cmp(b))
            });
            species.is_stagnant = false;
            if species.members.is_empty() {
                continue;
            }
            let fitness: Vec<f32> = species.members.iter().map(|id| population[id].fitness).collect();
            let adjusted: Vec<f32> = species
                .members
                .iter()
                .map(|id| population[id].adjusted_fitness)
                .collect();
            species.fitness = config.species.fitness_criterion.apply(&fitness);
            species.adjusted_fitness = math::mean(&adjusted);
        }

        self.best_genome = population
            .values()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness).then(b.id.cmp(&a.id)))
            .map(|g| g.id);
        let best_species = self.best_species();
        allocate_targets(
            &mut self.species,
            best_species,
            config.neat.population_size,
            rng,
        );
    }

    fn species(&self) -> &BTreeMap<SpeciesId, Species> {
        &self.species
    }

    fn species_mut(&mut self) -> &mut BTreeMap<SpeciesId, Species> {
        &mut self.species
    }

    fn species_of(&self, genome_id: GenomeId) -> Option<SpeciesId> {
        self.genome_to_species.get(&genome_id).copied()
    }

    fn best_species(&self) -> Option<SpeciesId> {
        self.best_genome.and_then(|id| self.species_of(id))
    }
}

/// Allocate `target_size` over the non-empty, non-stagnant species so the
/// targets sum to exactly `population_size`.
///
/// Each species' share is its adjusted fitness over the total (equal split
/// when the total is zero), probabilistically rounded. `best` is raised to at
/// least one. The remaining error is corrected one unit at a time, adding to
/// species weighted by how far they were rounded down and removing from
/// species weighted by how far they were rounded up. `best` is never taken
/// below one. Every other species gets a zero target.
pub fn allocate_targets<R: Rng + ?Sized>(
    species: &mut BTreeMap<SpeciesId, Species>,
    best: Option<SpeciesId>,
    population_size: usize,
    rng: &mut R,
) {
    for s in species.values_mut() {
        s.target_size = 0;
    }
    let eligible: Vec<SpeciesId> = species
        .values()
        .filter(|s| !s.is_empty() && !s.is_stagnant)
        .map(|s| s.id)
        .collect();
    if eligible.is_empty() || population_size == 0 {
        return;
    }

    let total_size = population_size as f32;
    let shares: Vec<f32> = eligible
        .iter()
        .map(|id| species[id].adjusted_fitness.max(0.0))
        .collect();
    let total: f32 = shares.iter().sum();
    let raw: Vec<f32> = if total > 0.0 {
        shares.iter().map(|share| share / total * total_size).collect()
    } else {
        vec![total_size / eligible.len() as f32; eligible.len()]
    };
    let mut targets: Vec<usize> = raw
        .iter()
        .map(|&r| math::probabilistic_round(r, rng))
        .collect();

    let best_index = best.and_then(|b| eligible.iter().position(|&id| id == b));
    if let Some(index) = best_index {
        targets[index] = targets[index].max(1);
    }

    let mut sum: usize = targets.iter().sum();
    while sum < population_size {
        let residuals: Vec<f32> = raw
            .iter()
            .zip(&targets)
            .map(|(&r, &t)| (r - t as f32).max(0.0))
            .collect();
        let index = math::weighted_choice(&residuals, rng)
            .unwrap_or_else(|| rng.random_range(0..targets.len()));
        targets[index] += 1;
        sum += 1;
    }
    while sum > population_size {
        let floor = |index: usize| usize::from(Some(index) == best_index);
        let reducible: Vec<usize> = (0..targets.len()).filter(|&i| targets[i] > floor(i)).collect();
        let residuals: Vec<f32> = reducible
            .iter()
            .map(|&i| (targets[i] as f32 - raw[i]).max(0.0))
            .collect();
        let index = match math::weighted_choice(&residuals, rng) {
            Some(k) => reducible[k],
            None => match reducible.choose(rng) {
                Some(&i) => i,
                None => break,
            },
        };
        targets[index] -= 1;
        sum -= 1;
    }

    for (id, target) in eligible.iter().zip(targets) {
        if let Some(s) = species.get_mut(id) {
            s.target_size = target;
        }
    }
}
