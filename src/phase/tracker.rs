//! Phase indicator, component densities and transport populations.
//!
//! φ lives on the halo-inclusive regular grid so the color gradient can
//! read neighbors directly. Immobile sites hold their wetting affinity in
//! the same array. Densities and populations are compact:
//!
//! - `den[n]`, `den[np + n]`: ρA and ρB
//! - `aq[q*np + n]`, `bq[q*np + n]`: D3Q7 populations, AA-addressed

use std::ops::Range;

use crate::domain::decomposition::Subdomain;
use crate::domain::labels::ComponentTable;
use crate::domain::layout::Layout;
use crate::kernel::addressing::{AaAddressing, Parity};
use crate::kernel::color::{color_update, ColorParams, PhaseView};
use crate::kernel::phase::{phase_indicator, phase_update};
use crate::lattice::d3q19::Q;
use crate::lattice::d3q7::{at_rest, Q7};

/// Phase state of one partition.
#[derive(Clone, Debug)]
pub struct PhaseFieldTracker {
    np: usize,
    phi: Vec<f64>,
    den: Vec<f64>,
    aq: Vec<f64>,
    bq: Vec<f64>,
}

impl PhaseFieldTracker {
    /// Seed φ from the labels and initialize densities and populations for
    /// a run whose next half-step has `parity`.
    pub fn new(
        sub: &Subdomain,
        layout: &Layout,
        components: &ComponentTable,
        affinity_scale: f64,
        parity: Parity,
    ) -> Self {
        let np = layout.np();
        let phi = sub
            .labels()
            .as_slice()
            .iter()
            .map(|&label| components.initial_phi(label, affinity_scale))
            .collect();
        let mut tracker = Self {
            np,
            phi,
            den: vec![0.0; 2 * np],
            aq: vec![0.0; Q7 * np],
            bq: vec![0.0; Q7 * np],
        };
        tracker.reinitialize(layout, parity);
        tracker
    }

    /// Full-grid phase indicator.
    #[inline]
    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    /// Mutable phase indicator, for external edits followed by
    /// [`reinitialize`](Self::reinitialize).
    #[inline]
    pub fn phi_mut(&mut self) -> &mut [f64] {
        &mut self.phi
    }

    /// Component densities, `[ρA | ρB]`.
    #[inline]
    pub fn den(&self) -> &[f64] {
        &self.den
    }

    #[inline]
    pub fn density_a(&self, n: usize) -> f64 {
        self.den[n]
    }

    #[inline]
    pub fn density_b(&self, n: usize) -> f64 {
        self.den[self.np + n]
    }

    /// Component populations `(A, B)`.
    pub fn populations(&self) -> (&[f64], &[f64]) {
        (&self.aq, &self.bq)
    }

    /// Mutable component populations, for the transport exchange.
    pub fn populations_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.aq, &mut self.bq)
    }

    /// Phase indicator of a simulated site.
    #[inline]
    pub fn site_phi(&self, layout: &Layout, n: usize) -> f64 {
        self.phi[layout.grid_of(n)]
    }

    /// Rebuild densities and populations from φ over every simulated site.
    ///
    /// φ is clamped to `[-1, 1]` first. Populations are placed at rest as
    /// if written by the previous half-step, so the next one pulls them from
    /// upstream like any streamed population. Reapplying with an unchanged
    /// φ reproduces the same densities.
    pub fn reinitialize(&mut self, layout: &Layout, parity: Parity) {
        let aa = AaAddressing::new(layout);
        let np = self.np;
        for n in layout.sites() {
            let g = layout.grid_of(n);
            let phi = self.phi[g].clamp(-1.0, 1.0);
            self.phi[g] = phi;
            let na = 0.5 * (1.0 + phi);
            let nb = 0.5 * (1.0 - phi);
            self.den[n] = na;
            self.den[np + n] = nb;
            self.place_at_rest(&aa, parity, n, na, nb);
        }
    }

    /// Rebuild φ and populations from stored densities, keeping the
    /// densities bit-exact.
    pub fn reinitialize_from_densities(&mut self, layout: &Layout, parity: Parity) {
        let aa = AaAddressing::new(layout);
        let np = self.np;
        for n in layout.sites() {
            let na = self.den[n];
            let nb = self.den[np + n];
            self.phi[layout.grid_of(n)] = phase_indicator(na, nb);
            self.place_at_rest(&aa, parity, n, na, nb);
        }
    }

    fn place_at_rest(&mut self, aa: &AaAddressing<'_>, parity: Parity, n: usize, na: f64, nb: f64) {
        let previous = parity.flip();
        for q in 0..Q7 {
            let slot = aa.write_slot(previous, n, q);
            self.aq[slot] = at_rest(q, na);
            self.bq[slot] = at_rest(q, nb);
        }
    }

    /// Overwrite the densities of a site, deriving φ.
    pub fn set_site(&mut self, layout: &Layout, n: usize, na: f64, nb: f64) {
        self.den[n] = na;
        self.den[self.np + n] = nb;
        self.phi[layout.grid_of(n)] = phase_indicator(na, nb);
    }

    /// Overwrite the stored densities wholesale, e.g. from a checkpoint.
    pub fn set_densities(&mut self, den: &[f64]) {
        self.den.copy_from_slice(den);
    }

    /// Reset the φ of immobile sites to their affinity times `scale`.
    pub fn set_affinities(&mut self, sub: &Subdomain, components: &ComponentTable, scale: f64) {
        for (g, &label) in sub.labels().as_slice().iter().enumerate() {
            if components.affinity(label).is_some() {
                self.phi[g] = components.initial_phi(label, scale);
            }
        }
    }

    /// Phase-field update over `range`.
    pub fn update(&mut self, layout: &Layout, parity: Parity, range: Range<usize>) {
        let aa = AaAddressing::new(layout);
        phase_update(
            &aa,
            parity,
            &self.aq,
            &self.bq,
            &mut self.den,
            &mut self.phi,
            layout.grid_table(),
            range,
        );
    }

    /// Color collision over `range`, recoloring the component populations.
    pub fn collide(
        &mut self,
        layout: &Layout,
        parity: Parity,
        dist: &mut [f64],
        velocity: &mut [f64],
        strides: &[isize; Q],
        params: &ColorParams,
        range: Range<usize>,
    ) {
        let aa = AaAddressing::new(layout);
        let view = PhaseView {
            phi: &self.phi,
            den: &self.den,
            grid_of: layout.grid_table(),
            strides,
        };
        color_update(
            &aa,
            parity,
            dist,
            &mut self.aq,
            &mut self.bq,
            velocity,
            &view,
            params,
            range,
        );
    }

    /// Total component densities over the simulated sites, `(ΣρA, ΣρB)`.
    pub fn local_volumes(&self, layout: &Layout) -> (f64, f64) {
        layout.sites().fold((0.0, 0.0), |(va, vb), n| {
            (va + self.den[n], vb + self.den[self.np + n])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decomposition::ProcessGrid;
    use crate::domain::labels::{LabelGrid, COMPONENT_A, COMPONENT_B};
    use crate::domain::layout::DomainIndexBuilder;
    use crate::types::Extent3;
    use approx::assert_relative_eq;

    const TOL: f64 = 1e-14;

    fn setup() -> (Subdomain, Layout, ComponentTable) {
        let labels = LabelGrid::from_fn(Extent3::new(4, 4, 4), |i, _, k| match (i, k) {
            (0, _) => 5,
            (_, k) if k < 2 => COMPONENT_A,
            _ => COMPONENT_B,
        });
        let components = ComponentTable::from_lists(&[5], &[-0.4]).unwrap();
        let sub = Subdomain::extract(&labels, ProcessGrid::serial(), 0).unwrap();
        let layout = DomainIndexBuilder::for_subdomain(&sub, &components).build().unwrap();
        (sub, layout, components)
    }

    #[test]
    fn test_initial_densities_follow_labels() {
        let (sub, layout, components) = setup();
        let tracker = PhaseFieldTracker::new(&sub, &layout, &components, 1.0, Parity::Odd);
        for n in layout.sites() {
            let phi = tracker.site_phi(&layout, n);
            assert!(phi == 1.0 || phi == -1.0);
            assert_eq!(tracker.density_a(n) - tracker.density_b(n), phi);
        }
        // immobile sites keep their affinity, halo included
        let extent = sub.halo_extent();
        assert_eq!(tracker.phi()[extent.linear(1, 2, 2)], -0.4);
        assert_eq!(tracker.phi()[extent.linear(5, 2, 2)], -0.4);
    }

    #[test]
    fn test_reinitialize_is_idempotent_and_clamps() {
        let (sub, layout, components) = setup();
        let mut tracker = PhaseFieldTracker::new(&sub, &layout, &components, 1.0, Parity::Odd);
        for (idx, n) in layout.sites().enumerate() {
            let g = layout.grid_of(n);
            tracker.phi_mut()[g] = 1.5 - 0.1 * idx as f64;
        }
        tracker.reinitialize(&layout, Parity::Odd);
        let first = tracker.den().to_vec();
        tracker.reinitialize(&layout, Parity::Odd);
        assert_eq!(first, tracker.den());
        assert!(tracker.phi().iter().all(|p| (-1.0..=1.0).contains(p)));
    }

    #[test]
    fn test_phase_update_after_reinitialize_recovers_densities() {
        let (sub, layout, components) = setup();
        let mut tracker = PhaseFieldTracker::new(&sub, &layout, &components, 1.0, Parity::Even);
        for n in layout.sites() {
            let g = layout.grid_of(n);
            tracker.phi_mut()[g] = 0.3;
        }
        tracker.reinitialize(&layout, Parity::Even);
        let expected = tracker.den().to_vec();
        tracker.update(&layout, Parity::Even, layout.exterior());
        tracker.update(&layout, Parity::Even, layout.interior());
        for n in layout.sites() {
            assert_relative_eq!(tracker.den()[n], expected[n], epsilon = TOL);
            assert_relative_eq!(tracker.site_phi(&layout, n), 0.3, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_first_update_pulls_from_upstream() {
        let (sub, layout, components) = setup();
        let mut tracker = PhaseFieldTracker::new(&sub, &layout, &components, 1.0, Parity::Odd);
        tracker.update(&layout, Parity::Odd, layout.exterior());
        tracker.update(&layout, Parity::Odd, layout.interior());
        // A/B interface between k = 1 and k = 2; each side receives one
        // face population (weight 1/9) from the other
        let extent = sub.halo_extent();
        for n in layout.sites() {
            let (_, _, k) = extent.coords(layout.grid_of(n));
            let expected = match k - 1 {
                1 => 7.0 / 9.0,
                2 => -7.0 / 9.0,
                0 => 1.0,
                _ => -1.0,
            };
            assert_relative_eq!(tracker.site_phi(&layout, n), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_affinity_scale() {
        let (sub, layout, components) = setup();
        let mut tracker = PhaseFieldTracker::new(&sub, &layout, &components, 0.0, Parity::Odd);
        let g = sub.halo_extent().linear(1, 1, 1);
        assert_eq!(tracker.phi()[g], 0.0);
        tracker.set_affinities(&sub, &components, 0.5);
        assert_relative_eq!(tracker.phi()[g], -0.2, epsilon = TOL);
    }
}
