//! Passive scalar transport.
//!
//! A D3Q19 advection-diffusion BGK update carried by the flow velocity.
//! The diffusivity is `D = (τ - 1/2)/3`, so `ω = 1/(3D + 1/2)`.

use std::ops::Range;

use crate::kernel::addressing::{AaAddressing, Parity};
use crate::kernel::collision::collide_scalar;
use crate::lattice::d3q19::Q;

/// Relaxation rate for a diffusivity.
#[inline]
pub fn scalar_omega(diffusivity: f64) -> f64 {
    1.0 / (3.0 * diffusivity + 0.5)
}

/// Collide and stream the scalar populations in `range`.
pub fn scalar_update(
    aa: &AaAddressing<'_>,
    parity: Parity,
    cq: &mut [f64],
    velocity: &[f64],
    concentration: &mut [f64],
    omega: f64,
    range: Range<usize>,
) {
    let np = aa.np();
    for n in range {
        let u = [velocity[n], velocity[np + n], velocity[2 * np + n]];
        let mut f: [f64; Q] = aa.gather(parity, cq, n);
        concentration[n] = collide_scalar(&mut f, omega, u);
        aa.scatter(parity, cq, n, &f);
    }
}
