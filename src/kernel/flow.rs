//! Single-phase flow update.

use std::ops::Range;

use crate::kernel::addressing::{AaAddressing, Parity};
use crate::kernel::collision::{collide, CollisionModel};
use crate::lattice::d3q19::Q;

/// Parameters of the single-phase collision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    pub model: CollisionModel,
    pub tau: f64,
    pub force: [f64; 3],
}

/// Collide and stream the sites in `range`, storing their velocity.
///
/// `velocity` is laid out component-major: `velocity[d*np + n]`.
pub fn flow_update(
    aa: &AaAddressing<'_>,
    parity: Parity,
    dist: &mut [f64],
    velocity: &mut [f64],
    params: &FlowParams,
    range: Range<usize>,
) {
    let np = aa.np();
    for n in range {
        let mut f: [f64; Q] = aa.gather(parity, dist, n);
        let (rho, u) = collide(params.model, &mut f, params.tau, params.force);
        debug_assert!(rho > 0.0, "non-positive density {} at site {}", rho, n);
        velocity[n] = u[0];
        velocity[np + n] = u[1];
        velocity[2 * np + n] = u[2];
        aa.scatter(parity, dist, n, &f);
    }
}
