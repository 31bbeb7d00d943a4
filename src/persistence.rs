//! Persisted genome records.
//!
//! A [`GenomeRecord`] carries everything needed to rebuild a genome exactly,
//! plus a snapshot of the innovation registry it was evolved with so that a
//! restored run keeps numbering new edges where the old one stopped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{NeatError, Result};
use crate::gene::{ConnectionGene, NodeGene, NodeId};
use crate::genome::{Genome, GenomeId, NodePartition};
use crate::innovation::{InnovationRegistry, InnovationSnapshot};

/// Logical schema of a saved genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeRecord {
    pub id: GenomeId,
    pub birth_generation: usize,
    pub fitness: f32,
    pub adjusted_fitness: f32,
    pub is_damaged: bool,
    /// Next node id the genome would allocate.
    pub node_id_counter: NodeId,
    pub nodes: Vec<NodeGene>,
    pub connections: Vec<ConnectionGene>,
    pub node_ids: NodePartition,
    pub innovations: InnovationSnapshot,
}

impl Genome {
    /// Capture this genome and the registry it was evolved with.
    #[must_use]
    pub fn to_record(&self, registry: &InnovationRegistry) -> GenomeRecord {
        GenomeRecord {
            id: self.id,
            birth_generation: self.birth_generation,
            fitness: self.fitness,
            adjusted_fitness: self.adjusted_fitness,
            is_damaged: self.is_damaged,
            node_id_counter: self.node_id_counter(),
            nodes: self.nodes().values().cloned().collect(),
            connections: self.connections().values().cloned().collect(),
            node_ids: self.node_ids().clone(),
            innovations: registry.snapshot(),
        }
    }

    /// Rebuild a genome from a record for a run configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InvalidRecord`] when the genes are inconsistent,
    /// the stored partition disagrees with the node types, the node counter
    /// lags behind an existing node id, or `genome.feed_forward` is set and
    /// the connections contain a cycle.
    pub fn from_record(record: &GenomeRecord, config: &Config) -> Result<Self> {
        let mut genome = Self::from_genes(
            record.id,
            record.birth_generation,
            record.nodes.iter().cloned(),
            record.connections.iter().cloned(),
        )?;
        if genome.node_ids() != &record.node_ids {
            return Err(NeatError::InvalidRecord(
                "node partition does not match node types".into(),
            ));
        }
        if record.node_id_counter < genome.node_id_counter() {
            return Err(NeatError::InvalidRecord(format!(
                "node counter {} is behind node id {}",
                record.node_id_counter,
                genome.node_id_counter() - 1
            )));
        }
        if config.genome.feed_forward && genome.has_cycle() {
            return Err(NeatError::InvalidRecord(
                "connections form a cycle in a feed-forward run".into(),
            ));
        }
        genome.advance_node_counter(record.node_id_counter);
        genome.fitness = record.fitness;
        genome.adjusted_fitness = record.adjusted_fitness;
        genome.is_damaged = record.is_damaged;
        Ok(genome)
    }
}

impl GenomeRecord {
    /// Registry restored from the snapshot.
    #[must_use]
    pub fn registry(&self) -> InnovationRegistry {
        InnovationRegistry::from_snapshot(&self.innovations)
    }

    /// # Errors
    ///
    /// Returns [`NeatError::Json`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// Returns [`NeatError::Json`] for malformed input.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Write the record as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| NeatError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a JSON record.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::Io`] if the file cannot be read and
    /// [`NeatError::Json`] if it does not hold a record.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| NeatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn evolved(rng: &mut ChaCha8Rng) -> (Genome, InnovationRegistry, Config) {
        let mut registry = InnovationRegistry::new();
        let mut config = Config::minimal(3, 2);
        config.genome.num_hidden = 1;
        let mut genome = Genome::initialize(5, 2, &config, &mut registry, rng).unwrap();
        for _ in 0..3 {
            genome.mutate_add_node(&config, &mut registry, rng);
        }
        genome.fitness = 1.5;
        (genome, registry, config)
    }

    #[test]
    fn test_record_round_trip() {
        let mut rng = test_rng();
        let (genome, registry, config) = evolved(&mut rng);
        let record = genome.to_record(&registry);
        let json = record.to_json().unwrap();
        let restored_record = GenomeRecord::from_json(&json).unwrap();
        assert_eq!(restored_record, record);

        let restored = Genome::from_record(&restored_record, &config).unwrap();
        assert_eq!(restored.nodes(), genome.nodes());
        assert_eq!(restored.connections(), genome.connections());
        assert_eq!(restored.node_ids(), genome.node_ids());
        assert_eq!(restored.connectors(), genome.connectors());
        assert_eq!(restored.node_id_counter(), genome.node_id_counter());
        assert_eq!(restored.fitness, 1.5);
        assert_eq!(restored_record.registry(), registry);
    }

    #[test]
    fn test_restored_counters_continue() {
        let mut rng = test_rng();
        let (genome, registry, config) = evolved(&mut rng);
        let record = genome.to_record(&registry);
        let mut restored = Genome::from_record(&record, &config).unwrap();
        let mut restored_registry = record.registry();

        let existing: Vec<NodeId> = restored.nodes().keys().copied().collect();
        assert!(restored.mutate_add_node(&config, &mut restored_registry, &mut rng));
        let added: Vec<NodeId> = restored
            .nodes()
            .keys()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        assert_eq!(added, vec![genome.node_id_counter()]);
        assert!(restored_registry.counter() > registry.counter());
        // The original is untouched.
        assert_eq!(genome.nodes().len(), existing.len());
    }

    #[test]
    fn test_rejects_inconsistent_partition() {
        let mut rng = test_rng();
        let (genome, registry, config) = evolved(&mut rng);
        let mut record = genome.to_record(&registry);
        let hidden = *record.node_ids.hidden.iter().next().unwrap();
        record.node_ids.hidden.remove(&hidden);
        record.node_ids.output.insert(hidden);
        assert!(matches!(
            Genome::from_record(&record, &config),
            Err(NeatError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_rejects_stale_node_counter() {
        let mut rng = test_rng();
        let (genome, registry, config) = evolved(&mut rng);
        let mut record = genome.to_record(&registry);
        record.node_id_counter = 1;
        assert!(matches!(
            Genome::from_record(&record, &config),
            Err(NeatError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_rejects_dangling_connection() {
        let mut rng = test_rng();
        let (genome, registry, config) = evolved(&mut rng);
        let mut record = genome.to_record(&registry);
        record.connections[0].target = 999;
        assert!(matches!(
            Genome::from_record(&record, &config),
            Err(NeatError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_rejects_cycle_in_feed_forward_run() {
        let mut config = Config::minimal(1, 1);
        config.genome.num_hidden = 2;
        config.genome.initial_connection = crate::config::InitialConnection::FullNoDirect;
        let mut registry = InnovationRegistry::new();
        let genome = Genome::initialize(0, 0, &config, &mut registry, &mut test_rng()).unwrap();
        let mut record = genome.to_record(&registry);
        // 1 -> 2 -> 1 between the two hidden nodes.
        for (id, (source, target)) in [(100, (1, 2)), (101, (2, 1))] {
            record.connections.push(ConnectionGene::with_weight(id, source, target, 0.5, true));
        }

        assert!(matches!(
            Genome::from_record(&record, &config),
            Err(NeatError::InvalidRecord(_))
        ));
        config.genome.feed_forward = false;
        let restored = Genome::from_record(&record, &config).unwrap();
        assert!(restored.has_cycle());
    }

    #[test]
    fn test_save_and_load() {
        let mut rng = test_rng();
        let (genome, registry, _) = evolved(&mut rng);
        let record = genome.to_record(&registry);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.json");
        record.save(&path).unwrap();
        assert_eq!(GenomeRecord::load(&path).unwrap(), record);

        let missing = dir.path().join("missing.json");
        assert!(matches!(GenomeRecord::load(&missing), Err(NeatError::Io { .. })));
    }
}
