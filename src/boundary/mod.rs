//! Open boundary conditions.
//!
//! [`zou_he`] holds the per-site density closures, [`enforcer`] applies
//! them to the inlet and outlet planes of a partition.

pub mod enforcer;
pub mod zou_he;

pub use enforcer::{BoundaryConditionEnforcer, BoundaryMode, ColorSetpoints, Setpoints};
