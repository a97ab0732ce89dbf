//! Local collision operators.

use serde::{Deserialize, Serialize};

use crate::lattice::d3q19::{equilibrium_all, guo_source, moments, project, Q, W};
use crate::lattice::mrt::{relaxation_rates, MrtBasis};

/// Flow collision operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionModel {
    /// Single relaxation time.
    Bgk,
    /// Two-rate multiple relaxation time.
    #[default]
    Mrt,
}

/// Relax `f` in place with Guo forcing and return `(ρ, u)`.
///
/// The returned velocity is the half-force corrected `u = (j + F/2)/ρ`.
#[inline]
pub fn collide(model: CollisionModel, f: &mut [f64; Q], tau: f64, force: [f64; 3]) -> (f64, [f64; 3]) {
    let (rho, j) = moments(f);
    let u = [
        (j[0] + 0.5 * force[0]) / rho,
        (j[1] + 0.5 * force[1]) / rho,
        (j[2] + 0.5 * force[2]) / rho,
    ];
    let feq = equilibrium_all(rho, u);
    let src = guo_source(u, force);
    match model {
        CollisionModel::Bgk => {
            let omega = 1.0 / tau;
            let pre = 1.0 - 0.5 * omega;
            for q in 0..Q {
                f[q] += -omega * (f[q] - feq[q]) + pre * src[q];
            }
        }
        CollisionModel::Mrt => {
            let basis = MrtBasis::get();
            let m = basis.to_moments(f);
            let meq = basis.to_moments(&feq);
            let ms = basis.to_moments(&src);
            let s = relaxation_rates(tau);
            let mut post = [0.0; Q];
            for i in 0..Q {
                post[i] = m[i] - s[i] * (m[i] - meq[i]) + (1.0 - 0.5 * s[i]) * ms[i];
            }
            *f = basis.from_moments(&post);
        }
    }
    (rho, u)
}

/// Rest-direction weight of the surface-tension perturbation.
const PERTURB_REST: f64 = -1.0 / 3.0;

/// Surface-tension perturbation along a color gradient.
///
/// Adds `(α/2)|∇φ| (w_q (e_q·n̂)² - B_q)` with `B_q = w_q` for moving
/// directions. Mass and momentum are unchanged.
#[inline]
pub fn perturb(f: &mut [f64; Q], alpha: f64, grad: [f64; 3]) {
    let c = (grad[0] * grad[0] + grad[1] * grad[1] + grad[2] * grad[2]).sqrt();
    if c <= 0.0 || alpha == 0.0 {
        return;
    }
    let n = [grad[0] / c, grad[1] / c, grad[2] / c];
    let amp = 0.5 * alpha * c;
    f[0] -= amp * PERTURB_REST;
    for q in 1..Q {
        let en = project(q, n);
        f[q] += amp * (W[q] * en * en - W[q]);
    }
}

/// Advection-diffusion BGK for a passive scalar; returns the concentration.
#[inline]
pub fn collide_scalar(f: &mut [f64; Q], omega: f64, u: [f64; 3]) -> f64 {
    let c: f64 = f.iter().sum();
    for q in 0..Q {
        let feq = W[q] * c * (1.0 + 3.0 * project(q, u));
        f[q] -= omega * (f[q] - feq);
    }
    c
}
