//! Two-component color-gradient update.
//!
//! Per site: relaxation with a phase-weighted relaxation time, Guo
//! forcing, the surface-tension perturbation scaled by `alpha`, then the
//! recoloring of the two D3Q7 component populations with sharpness
//! `beta`. The color gradient is estimated from the 18 neighboring φ
//! values of the full-grid array, so exterior sites need a current halo.

use std::ops::Range;

use crate::kernel::addressing::{AaAddressing, Parity};
use crate::kernel::collision::{collide, perturb, CollisionModel};
use crate::lattice::d3q19::{project, E, Q, W};
use crate::lattice::d3q7::{advected, Q7, W7};
use crate::types::Extent3;

/// Parameters of the color collision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorParams {
    pub model: CollisionModel,
    pub tau_a: f64,
    pub tau_b: f64,
    pub alpha: f64,
    pub beta: f64,
    pub force: [f64; 3],
}

impl ColorParams {
    /// Relaxation time at phase indicator `phi`.
    #[inline]
    pub fn tau(&self, phi: f64) -> f64 {
        self.tau_a + 0.5 * (1.0 - phi) * (self.tau_b - self.tau_a)
    }
}

/// Read-only phase state consumed by the color update.
#[derive(Clone, Copy, Debug)]
pub struct PhaseView<'a> {
    /// Full-grid phase indicator, halo included.
    pub phi: &'a [f64],
    /// Component densities, `den[n]` for A and `den[np + n]` for B.
    pub den: &'a [f64],
    /// Site-to-grid table.
    pub grid_of: &'a [u32],
    /// Grid offsets of the 19 lattice vectors.
    pub strides: &'a [isize; Q],
}

/// Grid offsets of every lattice vector on a halo-inclusive extent.
pub fn lattice_strides(extent: Extent3) -> [isize; Q] {
    let mut s = [0isize; Q];
    for (q, sq) in s.iter_mut().enumerate() {
        *sq = extent.stride(E[q]);
    }
    s
}

/// Isotropic gradient of the phase field at grid position `g`.
#[inline]
pub fn phase_gradient(phi: &[f64], g: usize, strides: &[isize; Q]) -> [f64; 3] {
    let mut grad = [0.0; 3];
    for q in 1..Q {
        let value = phi[(g as isize + strides[q]) as usize];
        let e = E[q];
        grad[0] += W[q] * e[0] as f64 * value;
        grad[1] += W[q] * e[1] as f64 * value;
        grad[2] += W[q] * e[2] as f64 * value;
    }
    [3.0 * grad[0], 3.0 * grad[1], 3.0 * grad[2]]
}

/// Collide, perturb and recolor the sites in `range`.
#[allow(clippy::too_many_arguments)]
pub fn color_update(
    aa: &AaAddressing<'_>,
    parity: Parity,
    dist: &mut [f64],
    aq: &mut [f64],
    bq: &mut [f64],
    velocity: &mut [f64],
    view: &PhaseView<'_>,
    params: &ColorParams,
    range: Range<usize>,
) {
    let np = aa.np();
    for n in range {
        let na = view.den[n];
        let nb = view.den[np + n];
        let total = na + nb;
        let phi = if total > 0.0 { (na - nb) / total } else { 0.0 };

        let g = view.grid_of[n] as usize;
        let grad = phase_gradient(view.phi, g, view.strides);
        let c = (grad[0] * grad[0] + grad[1] * grad[1] + grad[2] * grad[2]).sqrt();
        let normal = if c > 0.0 {
            [grad[0] / c, grad[1] / c, grad[2] / c]
        } else {
            [0.0; 3]
        };

        let mut f: [f64; Q] = aa.gather(parity, dist, n);
        let (rho, u) = collide(params.model, &mut f, params.tau(phi), params.force);
        debug_assert!(rho > 0.0, "non-positive density {} at site {}", rho, n);
        perturb(&mut f, params.alpha, grad);
        aa.scatter(parity, dist, n, &f);

        velocity[n] = u[0];
        velocity[np + n] = u[1];
        velocity[2 * np + n] = u[2];

        let segregation = if total > 0.0 { params.beta * na * nb / total } else { 0.0 };
        let mut a = [0.0; Q7];
        let mut b = [0.0; Q7];
        a[0] = W7[0] * na;
        b[0] = W7[0] * nb;
        for q in 1..Q7 {
            let delta = segregation * W7[q] * project(q, normal);
            a[q] = advected(q, na, u) + delta;
            b[q] = advected(q, nb, u) - delta;
        }
        aa.scatter(parity, aq, n, &a);
        aa.scatter(parity, bq, n, &b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-14;

    #[test]
    fn test_tau_interpolation() {
        let p = ColorParams {
            model: CollisionModel::Bgk,
            tau_a: 0.7,
            tau_b: 1.1,
            alpha: 0.005,
            beta: 0.95,
            force: [0.0; 3],
        };
        assert!((p.tau(1.0) - 0.7).abs() < TOL);
        assert!((p.tau(-1.0) - 1.1).abs() < TOL);
        assert!((p.tau(0.0) - 0.9).abs() < TOL);
    }

    #[test]
    fn test_gradient_of_linear_field() {
        let extent = Extent3::new(5, 5, 5);
        let strides = lattice_strides(extent);
        let mut phi = vec![0.0; extent.len()];
        for k in 0..5 {
            for j in 0..5 {
                for i in 0..5 {
                    phi[extent.linear(i, j, k).get()] = 0.1 * i as f64 - 0.2 * j as f64 + 0.3 * k as f64;
                }
            }
        }
        let grad = phase_gradient(&phi, extent.linear(2, 2, 2).get(), &strides);
        assert!((grad[0] - 0.1).abs() < 1e-12);
        assert!((grad[1] + 0.2).abs() < 1e-12);
        assert!((grad[2] - 0.3).abs() < 1e-12);
    }
}
