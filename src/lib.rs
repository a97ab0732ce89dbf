//! # porous-lbm
//!
//! A domain-decomposed multiphase lattice-Boltzmann solver for flow in
//! porous media.
//!
//! This crate provides:
//! - Sparse compaction of a labeled 3-D grid with exterior/interior ordering
//! - D3Q19 flow and D3Q7 component transport with AA-pattern addressing
//! - Neighbor exchange overlapped with interior updates
//! - Pressure and flux inlet/outlet conditions
//! - A two-component color-gradient model and a single-phase model with an
//!   optional passive scalar
//! - An adaptive control loop for capillary-number targeting, steady-state
//!   detection and morphological saturation changes
//! - Restart checkpoints and a steady-state log
//!
//! Partitions run as threads of one process, each owning its arrays and
//! talking to its neighbors only through [`comm::Endpoint`].

pub mod analysis;
pub mod boundary;
pub mod comm;
pub mod config;
pub mod control;
pub mod domain;
pub mod error;
pub mod io;
pub mod kernel;
pub mod lattice;
pub mod phase;
pub mod simulation;
pub mod types;

// Re-export main types for convenience
pub use analysis::{StabilityMonitor, StabilityThresholds};
pub use boundary::{BoundaryConditionEnforcer, BoundaryMode, ColorSetpoints, Setpoints};
pub use comm::{Channel, Communicator, Endpoint, World};
pub use config::{Geometry, ModelKind, RunConfig};
pub use control::{
    Actuators, AdaptationStrategy, ControlLoop, ControlParams, ControlPhase, Diagnostics, InjectionKind,
    MorphologyOracle, SteadySample,
};
pub use domain::{ComponentTable, DomainIndexBuilder, LabelGrid, Layout, ProcessGrid, Subdomain};
pub use error::{CheckpointError, CommError, ConfigError, DivergenceError, LbmError, Result};
pub use io::{CheckpointStore, SteadyStateLog};
pub use kernel::{AaAddressing, CollisionModel, Parity};
pub use phase::PhaseFieldTracker;
pub use simulation::{Cluster, ColorSimulation, FlowSimulation, RunSummary, StopReason};
pub use types::{Extent3, GridIndex, SiteIndex};
