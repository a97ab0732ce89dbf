//! Numerical health checks of the lattice state.

pub mod stability;

pub use stability::{StabilityMonitor, StabilityStatus, StabilityThresholds, StabilityWarning};
