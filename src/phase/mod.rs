//! Phase field of the two-component model.
//!
//! The [`PhaseFieldTracker`] owns the full-grid phase indicator, the
//! component densities and the D3Q7 component populations of a partition.

mod tracker;

pub use tracker::PhaseFieldTracker;
