//! Multi-relaxation-time moment basis for D3Q19.
//!
//! The 19 rows are the orthogonal polynomial basis of d'Humières et al.
//! (2002): density, energy, energy squared, momentum, heat flux, stress
//! and third-order ghost moments. Because the rows are orthogonal the
//! inverse transform is `Mᵀ D⁻¹` with `D` the squared row norms.
//!
//! Relaxation follows the two-rate scheme: the shear moments relax with
//! `s_ν = 1/τ`, every other non-conserved moment with
//! `8(2 - s_ν)/(8 - s_ν)`.

use std::sync::OnceLock;

use super::d3q19::{E, Q};

/// Shear-stress rows of the basis.
pub const VISCOUS_MOMENTS: [usize; 5] = [9, 11, 13, 14, 15];

/// Conserved rows (density and momentum).
pub const CONSERVED_MOMENTS: [usize; 4] = [0, 3, 5, 7];

/// Orthogonal moment transform.
#[derive(Debug, Clone)]
pub struct MrtBasis {
    m: [[f64; Q]; Q],
    inv_norm: [f64; Q],
}

static BASIS: OnceLock<MrtBasis> = OnceLock::new();

impl MrtBasis {
    /// Shared basis instance.
    pub fn get() -> &'static MrtBasis {
        BASIS.get_or_init(MrtBasis::build)
    }

    fn build() -> Self {
        let mut m = [[0.0; Q]; Q];
        for q in 0..Q {
            let cx = E[q][0] as f64;
            let cy = E[q][1] as f64;
            let cz = E[q][2] as f64;
            let c2 = cx * cx + cy * cy + cz * cz;
            let row = [
                1.0,
                19.0 * c2 - 30.0,
                (21.0 * c2 * c2 - 53.0 * c2 + 24.0) / 2.0,
                cx,
                (5.0 * c2 - 9.0) * cx,
                cy,
                (5.0 * c2 - 9.0) * cy,
                cz,
                (5.0 * c2 - 9.0) * cz,
                3.0 * cx * cx - c2,
                (3.0 * c2 - 5.0) * (3.0 * cx * cx - c2),
                cy * cy - cz * cz,
                (3.0 * c2 - 5.0) * (cy * cy - cz * cz),
                cx * cy,
                cy * cz,
                cx * cz,
                (cy * cy - cz * cz) * cx,
                (cz * cz - cx * cx) * cy,
                (cx * cx - cy * cy) * cz,
            ];
            for (i, value) in row.iter().enumerate() {
                m[i][q] = *value;
            }
        }
        let mut inv_norm = [0.0; Q];
        for i in 0..Q {
            let norm: f64 = m[i].iter().map(|v| v * v).sum();
            inv_norm[i] = 1.0 / norm;
        }
        Self { m, inv_norm }
    }

    /// Row `i` of the transform.
    pub fn row(&self, i: usize) -> &[f64; Q] {
        &self.m[i]
    }

    /// Populations to moments.
    #[inline]
    pub fn to_moments(&self, f: &[f64; Q]) -> [f64; Q] {
        let mut out = [0.0; Q];
        for (i, o) in out.iter_mut().enumerate() {
            let row = &self.m[i];
            let mut acc = 0.0;
            for q in 0..Q {
                acc += row[q] * f[q];
            }
            *o = acc;
        }
        out
    }

    /// Moments to populations.
    #[inline]
    pub fn from_moments(&self, moments: &[f64; Q]) -> [f64; Q] {
        let mut f = [0.0; Q];
        for i in 0..Q {
            let scaled = moments[i] * self.inv_norm[i];
            if scaled == 0.0 {
                continue;
            }
            let row = &self.m[i];
            for q in 0..Q {
                f[q] += row[q] * scaled;
            }
        }
        f
    }
}

/// Relaxation rates for a local relaxation time `tau`.
pub fn relaxation_rates(tau: f64) -> [f64; Q] {
    let s_nu = 1.0 / tau;
    let s_b = 8.0 * (2.0 - s_nu) / (8.0 - s_nu);
    let mut s = [s_b; Q];
    for i in CONSERVED_MOMENTS {
        s[i] = 1.0;
    }
    for i in VISCOUS_MOMENTS {
        s[i] = s_nu;
    }
    s
}
