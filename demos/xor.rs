//! XOR example.
//!
//! Evolves a feed-forward network for the XOR truth table under phased
//! complexity regulation, then saves the champion as JSON.
//!
//! Run with: `cargo run --example xor [config.toml]`
//! Set `RUST_LOG=evolving_networks=debug` for per-species events.

use evolving_networks::{
    Activations, Aggregations, Config, FeedForwardNetwork, Genome, GenomeId, RegulationKind,
};
use tracing_subscriber::EnvFilter;

const XOR: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

/// Maximum fitness is 4.0 (zero squared error).
fn xor_fitness(genomes: &mut [(GenomeId, &mut Genome)], _config: &Config) {
    let activations = Activations::default();
    let aggregations = Aggregations::default();
    for (_, genome) in genomes.iter_mut() {
        let Ok(mut network) = FeedForwardNetwork::new(genome, &activations, &aggregations) else {
            genome.is_damaged = true;
            continue;
        };
        let mut fitness = 4.0;
        for (inputs, expected) in XOR {
            let output = network.activate(&inputs).map_or(f32::NAN, |o| o[0]);
            fitness -= (output - expected).powi(2);
        }
        genome.fitness = fitness;
        genome.is_damaged |= network.is_damaged();
    }
}

fn default_config() -> Config {
    let mut config = Config::minimal(2, 1);
    config.neat.population_size = 150;
    config.neat.fitness_threshold = 3.9;
    config.neat.regulation = RegulationKind::Phased;
    config.neat.phased_complexity_threshold = 20.0;
    config.neat.seed = Some(42);
    config.genome.node_add_rate = 0.1;
    config.genome.conn_add_rate = 0.3;
    config
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => default_config(),
    };

    let mut population = evolving_networks::Population::new(config)?;
    population.initialize(xor_fitness)?;
    let champion = population.fit(Some(300))?;

    println!();
    println!("Evolution complete after {} generations", population.generation());
    println!("Solved: {}", population.is_solved());
    println!("Best fitness: {:.4}", champion.fitness);
    println!("Hidden nodes: {}", champion.node_ids().hidden.len());
    println!("Enabled connections: {}", champion.num_enabled_connections());

    println!("\nChampion XOR outputs:");
    let mut network =
        FeedForwardNetwork::new(&champion, &Activations::default(), &Aggregations::default())?;
    for (inputs, expected) in XOR {
        let output = network.activate(&inputs)?[0];
        let status = if (output.round() - expected).abs() < 0.1 {
            "ok"
        } else {
            "wrong"
        };
        println!(
            "  {} XOR {} = {:.4} (expected {}) {}",
            inputs[0] as i32, inputs[1] as i32, output, expected as i32, status
        );
    }

    let path = std::env::temp_dir().join("xor_champion.json");
    champion.to_record(population.registry()).save(&path)?;
    println!("\nSaved champion to {}", path.display());
    Ok(())
}
