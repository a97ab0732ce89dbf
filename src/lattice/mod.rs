//! Lattice velocity sets and collision building blocks.
//!
//! - [`d3q19`]: flow stencil, equilibrium, Guo forcing
//! - [`d3q7`]: transport stencil for the two-component color model
//! - [`mrt`]: orthogonal moment basis for multi-relaxation-time collision

pub mod d3q19;
pub mod d3q7;
pub mod mrt;

pub use d3q19::{E, OPP, Q, W};
pub use mrt::MrtBasis;
