//! D3Q19 velocity set.
//!
//! Direction 0 is the rest population, 1-6 the face neighbors
//! (±x, ±y, ±z) and 7-18 the edge neighbors. Directions come in
//! opposite pairs `(2k-1, 2k)`.

/// Number of discrete velocities.
pub const Q: usize = 19;

/// Squared lattice sound speed.
pub const CS2: f64 = 1.0 / 3.0;

/// Lattice vectors.
pub const E: [[i32; 3]; Q] = [
    [0, 0, 0],
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [0, 0, 1],
    [0, 0, -1],
    [1, 1, 0],
    [-1, -1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [1, 0, 1],
    [-1, 0, -1],
    [1, 0, -1],
    [-1, 0, 1],
    [0, 1, 1],
    [0, -1, -1],
    [0, 1, -1],
    [0, -1, 1],
];

const W0: f64 = 1.0 / 3.0;
const W1: f64 = 1.0 / 18.0;
const W2: f64 = 1.0 / 36.0;

/// Equilibrium weights.
pub const W: [f64; Q] = [
    W0, W1, W1, W1, W1, W1, W1, W2, W2, W2, W2, W2, W2, W2, W2, W2, W2, W2, W2,
];

/// Index of the opposite direction.
pub const OPP: [usize; Q] = [0, 2, 1, 4, 3, 6, 5, 8, 7, 10, 9, 12, 11, 14, 13, 16, 15, 18, 17];

/// Directions with a positive z component (unknown at a z-min inlet).
pub const Z_POSITIVE: [usize; 5] = [5, 11, 14, 15, 18];

/// Directions with a negative z component (unknown at a z-max outlet).
pub const Z_NEGATIVE: [usize; 5] = [6, 12, 13, 16, 17];

/// Directions with no z component.
pub const Z_ZERO: [usize; 9] = [0, 1, 2, 3, 4, 7, 8, 9, 10];

#[inline]
fn dot(e: [i32; 3], v: [f64; 3]) -> f64 {
    e[0] as f64 * v[0] + e[1] as f64 * v[1] + e[2] as f64 * v[2]
}

/// Second-order equilibrium for direction `q`.
#[inline]
pub fn equilibrium(q: usize, rho: f64, u: [f64; 3]) -> f64 {
    let eu = dot(E[q], u);
    let uu = u[0] * u[0] + u[1] * u[1] + u[2] * u[2];
    W[q] * rho * (1.0 + 3.0 * eu + 4.5 * eu * eu - 1.5 * uu)
}

/// Full equilibrium distribution.
pub fn equilibrium_all(rho: f64, u: [f64; 3]) -> [f64; Q] {
    let mut feq = [0.0; Q];
    for (q, f) in feq.iter_mut().enumerate() {
        *f = equilibrium(q, rho, u);
    }
    feq
}

/// Density and momentum of a distribution.
#[inline]
pub fn moments(f: &[f64; Q]) -> (f64, [f64; 3]) {
    let mut rho = 0.0;
    let mut j = [0.0; 3];
    for q in 0..Q {
        rho += f[q];
        j[0] += f[q] * E[q][0] as f64;
        j[1] += f[q] * E[q][1] as f64;
        j[2] += f[q] * E[q][2] as f64;
    }
    (rho, j)
}

/// Guo body-force source term without the `(1 - ω/2)` prefactor.
///
/// Sums to zero and carries momentum `force`.
pub fn guo_source(u: [f64; 3], force: [f64; 3]) -> [f64; Q] {
    let mut s = [0.0; Q];
    if force == [0.0; 3] {
        return s;
    }
    for (q, sq) in s.iter_mut().enumerate() {
        let e = E[q];
        let eu = dot(e, u);
        let mut acc = 0.0;
        for d in 0..3 {
            acc += (3.0 * (e[d] as f64 - u[d]) + 9.0 * eu * e[d] as f64) * force[d];
        }
        *sq = W[q] * acc;
    }
    s
}

/// Dot product of a lattice vector with a real vector.
#[inline]
pub fn project(q: usize, v: [f64; 3]) -> f64 {
    dot(E[q], v)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-14;

    #[test]
    fn test_weights_sum_to_one() {
        let sum: f64 = W.iter().sum();
        assert!((sum - 1.0).abs() < TOL);
    }

    #[test]
    fn test_opposites() {
        for q in 0..Q {
            let e = E[q];
            let o = E[OPP[q]];
            assert_eq!([e[0] + o[0], e[1] + o[1], e[2] + o[2]], [0, 0, 0]);
            assert_eq!(OPP[OPP[q]], q);
        }
    }

    #[test]
    fn test_second_moment_isotropic() {
        for a in 0..3 {
            for b in 0..3 {
                let m: f64 = (0..Q).map(|q| W[q] * (E[q][a] * E[q][b]) as f64).sum();
                let expected = if a == b { CS2 } else { 0.0 };
                assert!((m - expected).abs() < TOL);
            }
        }
    }

    #[test]
    fn test_equilibrium_moments() {
        let rho = 1.2;
        let u = [0.01, -0.02, 0.03];
        let feq = equilibrium_all(rho, u);
        let (r, j) = moments(&feq);
        assert!((r - rho).abs() < TOL);
        for d in 0..3 {
            assert!((j[d] - rho * u[d]).abs() < TOL);
        }
    }

    #[test]
    fn test_guo_source_moments() {
        let force = [1e-4, 2e-4, -3e-4];
        let s = guo_source([0.02, 0.0, -0.01], force);
        let (m0, m1) = moments(&s);
        assert!(m0.abs() < TOL);
        for d in 0..3 {
            assert!((m1[d] - force[d]).abs() < TOL);
        }
    }

    #[test]
    fn test_z_partitions() {
        for q in Z_POSITIVE {
            assert_eq!(E[q][2], 1);
        }
        for q in Z_NEGATIVE {
            assert_eq!(E[q][2], -1);
        }
        for q in Z_ZERO {
            assert_eq!(E[q][2], 0);
        }
    }
}
