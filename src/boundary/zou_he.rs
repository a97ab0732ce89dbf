//! Zou-He density conditions on z planes.
//!
//! At a z-min inlet the populations with `e_z > 0` are unknown after
//! streaming; at a z-max outlet those with `e_z < 0`. Given the target
//! density, the normal momentum follows from the known populations and
//! the unknown ones are rebuilt from their opposites with transverse
//! momentum corrections, so the site ends up with zero tangential
//! momentum.

use crate::lattice::d3q19::{Q, Z_NEGATIVE, Z_POSITIVE, Z_ZERO};

#[inline]
fn sum(f: &[f64; Q], dirs: &[usize]) -> f64 {
    dirs.iter().map(|&q| f[q]).sum()
}

/// Known contribution at an inlet site: `Σ(e_z=0) + 2Σ(e_z<0)`.
#[inline]
pub fn inlet_known(f: &[f64; Q]) -> f64 {
    sum(f, &Z_ZERO) + 2.0 * sum(f, &Z_NEGATIVE)
}

/// Known contribution at an outlet site: `Σ(e_z=0) + 2Σ(e_z>0)`.
#[inline]
pub fn outlet_known(f: &[f64; Q]) -> f64 {
    sum(f, &Z_ZERO) + 2.0 * sum(f, &Z_POSITIVE)
}

#[inline]
fn transverse(f: &[f64; Q]) -> (f64, f64) {
    let nxz = 0.5 * (f[1] + f[7] + f[9] - f[2] - f[8] - f[10]);
    let nyz = 0.5 * (f[3] + f[7] + f[10] - f[4] - f[8] - f[9]);
    (nxz, nyz)
}

/// Impose density `din` at an inlet site; returns the normal momentum.
pub fn inlet_pressure(f: &mut [f64; Q], din: f64) -> f64 {
    let jz = din - inlet_known(f);
    let (nxz, nyz) = transverse(f);
    f[5] = f[6] + jz / 3.0;
    f[11] = f[12] + jz / 6.0 - nxz;
    f[14] = f[13] + jz / 6.0 + nxz;
    f[15] = f[16] + jz / 6.0 - nyz;
    f[18] = f[17] + jz / 6.0 + nyz;
    jz
}

/// Impose density `dout` at an outlet site; returns the normal momentum.
pub fn outlet_pressure(f: &mut [f64; Q], dout: f64) -> f64 {
    let jz = outlet_known(f) - dout;
    let (nxz, nyz) = transverse(f);
    f[6] = f[5] - jz / 3.0;
    f[12] = f[11] - jz / 6.0 + nxz;
    f[13] = f[14] - jz / 6.0 - nxz;
    f[16] = f[15] - jz / 6.0 + nyz;
    f[17] = f[18] - jz / 6.0 - nyz;
    jz
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::d3q19::{equilibrium_all, moments};

    const TOL: f64 = 1e-14;

    fn skewed() -> [f64; Q] {
        let mut f = equilibrium_all(1.0, [0.01, -0.02, 0.03]);
        for q in 0..Q {
            f[q] *= 1.0 + 0.003 * q as f64;
        }
        f
    }

    #[test]
    fn test_inlet_sets_density_and_zero_tangential() {
        let mut f = skewed();
        let jz = inlet_pressure(&mut f, 1.02);
        let (rho, j) = moments(&f);
        assert!((rho - 1.02).abs() < TOL);
        assert!(j[0].abs() < TOL);
        assert!(j[1].abs() < TOL);
        assert!((j[2] - jz).abs() < TOL);
    }

    #[test]
    fn test_outlet_sets_density_and_zero_tangential() {
        let mut f = skewed();
        let jz = outlet_pressure(&mut f, 0.98);
        let (rho, j) = moments(&f);
        assert!((rho - 0.98).abs() < TOL);
        assert!(j[0].abs() < TOL);
        assert!(j[1].abs() < TOL);
        assert!((j[2] - jz).abs() < TOL);
    }

    #[test]
    fn test_equilibrium_at_rest_is_preserved() {
        let mut f = equilibrium_all(1.0, [0.0; 3]);
        let before = f;
        let jz = inlet_pressure(&mut f, 1.0);
        assert!(jz.abs() < TOL);
        for q in 0..Q {
            assert!((f[q] - before[q]).abs() < TOL);
        }
    }
}
