//! Error types for the evolution engine.
//!
//! Only configuration problems, malformed persisted records and misuse of the
//! engine surface as [`NeatError`]. Broken internal invariants (duplicate ids,
//! mismatched gene identity during crossover) are assertion failures.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the evolution engine.
#[derive(Debug, Error)]
pub enum NeatError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The configuration document could not be parsed (missing section,
    /// unknown key, invalid enum value, type mismatch).
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration could not be rendered back to TOML.
    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Reading or writing a file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File that was being accessed.
        path: PathBuf,
        /// Underlying i/o failure.
        source: std::io::Error,
    },

    /// No activation function is registered under this key.
    #[error("no such activation function: {0}")]
    UnknownActivation(String),

    /// No aggregation function is registered under this key.
    #[error("no such aggregation function: {0}")]
    UnknownAggregation(String),

    /// The genome's enabled connections contain a cycle.
    ///
    /// Feed-forward phenotypes require an acyclic graph.
    #[error("genome contains cycles; feed-forward activation requires an acyclic graph")]
    CyclicGenome,

    /// The phenotype was activated with the wrong number of inputs.
    #[error("expected {expected} inputs, got {actual}")]
    InputMismatch {
        /// Number of input nodes in the genome.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A persisted genome record is internally inconsistent.
    #[error("invalid genome record: {0}")]
    InvalidRecord(String),

    /// JSON encoding or decoding of a genome record failed.
    #[error("genome record json error: {0}")]
    Json(#[from] serde_json::Error),

    /// `fit` was asked to run without a generation bound while fitness
    /// termination is disabled.
    #[error("cannot run without a generation limit when fitness termination is disabled")]
    UnboundedRun,

    /// `fit` was called before `initialize`.
    #[error("population has not been initialized")]
    NotInitialized,

    /// Every genome of a generation was damaged.
    #[error("no undamaged genome survived evaluation in generation {generation}")]
    Extinction {
        /// Generation in which the population died out.
        generation: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NeatError>;
