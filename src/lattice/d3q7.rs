//! D3Q7 transport stencil.
//!
//! The first seven D3Q19 directions (rest plus faces), with weights
//! 1/3 and 1/9 so that `c_s² = 2/9`.

use super::d3q19::E;

/// Number of transport directions.
pub const Q7: usize = 7;

/// Transport weights.
pub const W7: [f64; Q7] = [
    1.0 / 3.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
];

/// Inverse of the D3Q7 sound speed squared.
pub const INV_CS2: f64 = 4.5;

/// Rest-frame equilibrium of a component with density `n`.
#[inline]
pub fn at_rest(q: usize, n: f64) -> f64 {
    W7[q] * n
}

/// First-order advected equilibrium of a component with density `n`.
#[inline]
pub fn advected(q: usize, n: f64, u: [f64; 3]) -> f64 {
    let e = E[q];
    let cu = e[0] as f64 * u[0] + e[1] as f64 * u[1] + e[2] as f64 * u[2];
    W7[q] * n * (1.0 + INV_CS2 * cu)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-14;

    #[test]
    fn test_advected_conserves_density() {
        let n = 0.7;
        let u = [0.05, -0.01, 0.02];
        let total: f64 = (0..Q7).map(|q| advected(q, n, u)).sum();
        assert!((total - n).abs() < TOL);
    }

    #[test]
    fn test_advected_flux() {
        let n = 0.7;
        let u = [0.05, -0.01, 0.02];
        for d in 0..3 {
            let flux: f64 = (0..Q7).map(|q| advected(q, n, u) * E[q][d] as f64).sum();
            assert!((flux - n * u[d]).abs() < TOL);
        }
    }
}
