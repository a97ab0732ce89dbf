//! Collision-streaming kernels.
//!
//! Every kernel takes an explicit [`Parity`] and a compact index range and
//! works through [`AaAddressing`] on a single population arena. The
//! caller runs the interior range while boundary exchange is in flight
//! and the exterior range after it has been drained.

pub mod addressing;
pub mod collision;
pub mod color;
pub mod flow;
pub mod phase;
pub mod scalar;

pub use addressing::{AaAddressing, Parity};
pub use collision::CollisionModel;
pub use color::{color_update, lattice_strides, ColorParams, PhaseView};
pub use flow::{flow_update, FlowParams};
pub use phase::{phase_indicator, phase_update};
pub use scalar::{scalar_omega, scalar_update};
