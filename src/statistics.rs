//! Per-generation statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::genome::{Genome, GenomeId};
use crate::math;
use crate::regulation::RegulationMode;
use crate::species::{Species, SpeciesId};

/// Min/max/mean/stdev of one quantity over the population.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub stdev: f32,
}

impl Summary {
    /// Summarise `values`; all zero for an empty slice.
    #[must_use]
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            min: values.iter().copied().fold(f32::INFINITY, f32::min),
            max: values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            mean: math::mean(values),
            stdev: math::stdev(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesStatistics {
    pub id: SpeciesId,
    pub size: usize,
    pub fitness: f32,
    pub adjusted_fitness: f32,
    pub last_improved: usize,
    pub target_size: usize,
}

impl From<&Species> for SpeciesStatistics {
    fn from(species: &Species) -> Self {
        Self {
            id: species.id,
            size: species.len(),
            fitness: species.fitness,
            adjusted_fitness: species.adjusted_fitness,
            last_improved: species.last_improved,
            target_size: species.target_size,
        }
    }
}

/// Snapshot of one evaluated, speciated generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStatistics {
    pub generation: usize,
    pub fitness: Summary,
    /// Connection gene counts.
    pub complexity: Summary,
    /// Best fitness seen in the run so far.
    pub best_fitness: f32,
    pub species: Vec<SpeciesStatistics>,
    /// Genomes dropped this generation for non-finite output or fitness.
    pub damaged: usize,
    pub regulation_mode: RegulationMode,
}

impl GenerationStatistics {
    #[must_use]
    pub fn collect(
        generation: usize,
        population: &BTreeMap<GenomeId, Genome>,
        species: &BTreeMap<SpeciesId, Species>,
        best_fitness: f32,
        damaged: usize,
        regulation_mode: RegulationMode,
    ) -> Self {
        let fitness: Vec<f32> = population.values().map(|g| g.fitness).collect();
        let complexity: Vec<f32> = population.values().map(|g| g.complexity() as f32).collect();
        Self {
            generation,
            fitness: Summary::of(&fitness),
            complexity: Summary::of(&complexity),
            best_fitness,
            species: species
                .values()
                .filter(|s| !s.is_empty())
                .map(SpeciesStatistics::from)
                .collect(),
            damaged,
            regulation_mode,
        }
    }

    #[must_use]
    pub fn species_count(&self) -> usize {
        self.species.len()
    }
}
