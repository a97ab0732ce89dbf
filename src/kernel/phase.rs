//! Phase-field update of the two-component model.
//!
//! Sums the incoming D3Q7 component populations of each site into the
//! component densities and writes the phase indicator into the full-grid
//! φ array. Populations are only read; the color update that follows in
//! the same half-step overwrites them.

use std::ops::Range;

use crate::kernel::addressing::{AaAddressing, Parity};
use crate::lattice::d3q7::Q7;

/// Phase indicator of a density pair.
#[inline]
pub fn phase_indicator(na: f64, nb: f64) -> f64 {
    let total = na + nb;
    if total > 0.0 {
        (na - nb) / total
    } else {
        0.0
    }
}

/// Recompute densities and φ for the sites in `range`.
#[allow(clippy::too_many_arguments)]
pub fn phase_update(
    aa: &AaAddressing<'_>,
    parity: Parity,
    aq: &[f64],
    bq: &[f64],
    den: &mut [f64],
    phi: &mut [f64],
    grid_of: &[u32],
    range: Range<usize>,
) {
    let np = aa.np();
    for n in range {
        let a: [f64; Q7] = aa.gather(parity, aq, n);
        let b: [f64; Q7] = aa.gather(parity, bq, n);
        let na: f64 = a.iter().sum();
        let nb: f64 = b.iter().sum();
        den[n] = na;
        den[np + n] = nb;
        phi[grid_of[n] as usize] = phase_indicator(na, nb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_indicator() {
        assert_eq!(phase_indicator(1.0, 0.0), 1.0);
        assert_eq!(phase_indicator(0.0, 2.0), -1.0);
        assert_eq!(phase_indicator(0.5, 0.5), 0.0);
        assert_eq!(phase_indicator(0.0, 0.0), 0.0);
    }
}
