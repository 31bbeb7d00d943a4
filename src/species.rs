//! The species record shared by speciation and reproduction.

use crate::genome::{Genome, GenomeId};

pub type SpeciesId = u64;

/// A lineage of genomes clustered around a representative.
#[derive(Debug, Clone)]
pub struct Species {
    pub id: SpeciesId,
    /// Generation the species was founded in.
    pub created: usize,
    /// Owned copy of the genome the species is measured against.
    pub representative: Genome,
    /// Member ids, fitness descending (id ascending on ties) once stats are computed.
    pub members: Vec<GenomeId>,
    /// Species fitness criterion over the members' raw fitness.
    pub fitness: f32,
    /// Mean normalised fitness of the members.
    pub adjusted_fitness: f32,
    /// Species fitness recorded at every reproduction pass.
    pub fitness_history: Vec<f32>,
    /// Generation the species last beat its historical best.
    pub last_improved: usize,
    /// Offspring budget for the next generation.
    pub target_size: usize,
    pub is_stagnant: bool,
}

impl Species {
    /// Found a species with `founder` as its only member and representative.
    #[must_use]
    pub fn new(id: SpeciesId, generation: usize, founder: &Genome) -> Self {
        Self {
            id,
            created: generation,
            representative: founder.clone(),
            members: vec![founder.id],
            fitness: 0.0,
            adjusted_fitness: 0.0,
            fitness_history: Vec::new(),
            last_improved: generation,
            target_size: 0,
            is_stagnant: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Best fitness recorded in the history, if any.
    #[must_use]
    pub fn historical_best(&self) -> Option<f32> {
        self.fitness_history.iter().copied().reduce(f32::max)
    }

    /// Append the current fitness to the history, moving `last_improved` to
    /// `generation` when it beats every earlier entry.
    pub fn record_fitness(&mut self, generation: usize) {
        if self.historical_best().map_or(true, |best| self.fitness > best) {
            self.last_improved = generation;
        }
        self.fitness_history.push(self.fitness);
    }

    /// Generations since the last improvement.
    #[must_use]
    pub fn stagnant_time(&self, generation: usize) -> usize {
        generation.saturating_sub(self.last_improved)
    }
}
