//! Error types shared across the solver.
//!
//! Configuration problems are detected before any timestep runs; communication
//! mismatches and numerical divergence abort a run. A missing restart file is
//! not an error (see [`crate::io::CheckpointStore`]).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LbmError>;

/// Top-level error for a simulation run.
#[derive(Debug, Error)]
pub enum LbmError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("communication error: {0}")]
    Comm(#[from] CommError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("numerical divergence: {0}")]
    Divergence(#[from] DivergenceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid or inconsistent run configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required parameter `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("component label list has {labels} entries but affinity list has {affinities}")]
    AffinityMismatch { labels: usize, affinities: usize },
    #[error("global extent {global:?} is not divisible by process grid {nproc:?}")]
    IndivisibleGrid { global: [usize; 3], nproc: [usize; 3] },
    #[error("label grid of {expected} sites expected, got {actual}")]
    LabelCount { expected: usize, actual: usize },
    #[error("partition {rank} contains no simulated sites")]
    NoSimulatedSites { rank: usize },
    #[error("partition {rank} failed to set up")]
    PartitionFailed { rank: usize },
    #[error("{required} compact sites exceed allocated capacity {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Inter-partition exchange failures. These are programming errors.
#[derive(Debug, Error, PartialEq)]
pub enum CommError {
    #[error(
        "buffer from rank {source_rank} (tag {tag:#x}) has {actual} values, expected {expected}"
    )]
    BufferSizeMismatch {
        source_rank: usize,
        tag: u32,
        expected: usize,
        actual: usize,
    },
    #[error("rank {0} disconnected")]
    Disconnected(usize),
    #[error("rank {rank} out of range for a world of {size}")]
    InvalidRank { rank: usize, size: usize },
}

/// Restart file problems other than a missing file.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint {path} holds {actual} bytes, expected {expected}")]
    Truncated {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("malformed restart timestep: {0}")]
    Timestep(String),
}

/// Fatal loss of numerical health.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DivergenceError {
    #[error("non-positive density {value:e} at site {site} (timestep {timestep})")]
    NonPositiveDensity {
        timestep: usize,
        site: usize,
        value: f64,
    },
    #[error("non-finite velocity at site {site} (timestep {timestep})")]
    NonFiniteVelocity { timestep: usize, site: usize },
    #[error("non-finite diagnostic `{name}` at timestep {timestep}")]
    NonFiniteDiagnostic {
        timestep: usize,
        name: &'static str,
    },
    #[error("divergence reported by another partition at timestep {timestep}")]
    Reported { timestep: usize },
}
