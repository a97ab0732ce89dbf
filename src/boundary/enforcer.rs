//! Inlet/outlet boundary conditions on the z planes.
//!
//! Conditions are applied after the exchange has been drained and before
//! the exterior update, on every half-step. They overwrite the incoming
//! populations of the first owned z-layer on inlet partitions and the last
//! one on outlet partitions, wherever the AA parity has put them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boundary::zou_he::{inlet_known, inlet_pressure, outlet_pressure};
use crate::comm::Endpoint;
use crate::domain::decomposition::Subdomain;
use crate::domain::layout::Layout;
use crate::error::CommError;
use crate::kernel::addressing::{AaAddressing, Parity};
use crate::lattice::d3q19::{moments, Q};
use crate::phase::PhaseFieldTracker;

/// Boundary-condition mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Fully periodic domain.
    #[default]
    Periodic,
    /// Fixed density at inlet and outlet.
    Pressure,
    /// Fixed volumetric flux at the inlet, fixed density at the outlet.
    Flux,
}

impl BoundaryMode {
    pub fn is_open(self) -> bool {
        !matches!(self, BoundaryMode::Periodic)
    }
}

/// Boundary setpoints owned by the run state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Setpoints {
    pub mode: BoundaryMode,
    /// Inlet density (pressure mode).
    pub din: f64,
    /// Outlet density.
    pub dout: f64,
    /// Target inlet-plane momentum (flux mode).
    pub flux: f64,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self {
            mode: BoundaryMode::Periodic,
            din: 1.0,
            dout: 1.0,
            flux: 0.0,
        }
    }
}

/// Component densities imposed on the inlet and outlet planes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorSetpoints {
    pub inlet_a: f64,
    pub inlet_b: f64,
    pub outlet_a: f64,
    pub outlet_b: f64,
}

impl Default for ColorSetpoints {
    fn default() -> Self {
        Self {
            inlet_a: 1.0,
            inlet_b: 0.0,
            outlet_a: 0.0,
            outlet_b: 1.0,
        }
    }
}

/// Applies inlet/outlet conditions for one partition.
#[derive(Clone, Debug)]
pub struct BoundaryConditionEnforcer {
    inlet: Vec<usize>,
    outlet: Vec<usize>,
    inlet_area: f64,
}

impl BoundaryConditionEnforcer {
    /// Collect the plane sites and the global inlet area (collective).
    pub fn new(sub: &Subdomain, layout: &Layout, ep: &mut Endpoint) -> Result<Self, CommError> {
        let extent = sub.halo_extent();
        let nz = sub.owned().nz();
        let mut inlet = Vec::new();
        let mut outlet = Vec::new();
        for n in layout.exterior() {
            let (_, _, k) = extent.coords(layout.grid_of(n));
            if sub.is_inlet() && k == 1 {
                inlet.push(n);
            }
            if sub.is_outlet() && k == nz {
                outlet.push(n);
            }
        }
        let inlet_area = ep.sum(inlet.len() as f64)?;
        debug!(
            rank = sub.rank(),
            inlet = inlet.len(),
            outlet = outlet.len(),
            inlet_area,
            "boundary planes"
        );
        Ok(Self {
            inlet,
            outlet,
            inlet_area,
        })
    }

    /// Local inlet sites.
    pub fn inlet_sites(&self) -> &[usize] {
        &self.inlet
    }

    /// Local outlet sites.
    pub fn outlet_sites(&self) -> &[usize] {
        &self.outlet
    }

    /// Simulated inlet sites over all partitions.
    pub fn inlet_area(&self) -> f64 {
        self.inlet_area
    }

    fn update_sites(
        aa: &AaAddressing<'_>,
        parity: Parity,
        dist: &mut [f64],
        sites: &[usize],
        mut rule: impl FnMut(&mut [f64; Q]),
    ) {
        for &n in sites {
            let mut f: [f64; Q] = aa.gather(parity, dist, n);
            rule(&mut f);
            for q in 0..Q {
                dist[aa.read_slot(parity, n, q)] = f[q];
            }
        }
    }

    /// Impose fixed densities on both planes.
    pub fn apply_pressure(&self, aa: &AaAddressing<'_>, parity: Parity, dist: &mut [f64], din: f64, dout: f64) {
        Self::update_sites(aa, parity, dist, &self.inlet, |f| {
            inlet_pressure(f, din);
        });
        Self::update_sites(aa, parity, dist, &self.outlet, |f| {
            outlet_pressure(f, dout);
        });
    }

    /// Impose the inlet flux and outlet density; returns the realized inlet
    /// density (collective).
    ///
    /// With `A` inlet sites and `K_s` the known sum at site `s`, every inlet
    /// site gets density `din = (flux + ΣK)/A`, so the inlet momenta add up
    /// to `flux`.
    pub fn apply_flux(
        &self,
        ep: &mut Endpoint,
        aa: &AaAddressing<'_>,
        parity: Parity,
        dist: &mut [f64],
        flux: f64,
        dout: f64,
    ) -> Result<f64, CommError> {
        let local: f64 = self
            .inlet
            .iter()
            .map(|&n| inlet_known(&aa.gather(parity, dist, n)))
            .sum();
        let known = ep.sum(local)?;
        let din = if self.inlet_area > 0.0 {
            (flux + known) / self.inlet_area
        } else {
            0.0
        };
        self.apply_pressure(aa, parity, dist, din, dout);
        Ok(din)
    }

    /// Apply the configured mode; returns the inlet density in effect.
    pub fn apply(
        &self,
        ep: &mut Endpoint,
        aa: &AaAddressing<'_>,
        parity: Parity,
        dist: &mut [f64],
        setpoints: &Setpoints,
    ) -> Result<f64, CommError> {
        match setpoints.mode {
            BoundaryMode::Periodic => Ok(setpoints.din),
            BoundaryMode::Pressure => {
                self.apply_pressure(aa, parity, dist, setpoints.din, setpoints.dout);
                Ok(setpoints.din)
            }
            BoundaryMode::Flux => self.apply_flux(ep, aa, parity, dist, setpoints.flux, setpoints.dout),
        }
    }

    /// Normal momentum of the incoming populations summed over the inlet
    /// plane (collective).
    pub fn inlet_momentum(
        &self,
        ep: &mut Endpoint,
        aa: &AaAddressing<'_>,
        parity: Parity,
        dist: &[f64],
    ) -> Result<f64, CommError> {
        let local: f64 = self
            .inlet
            .iter()
            .map(|&n| moments(&aa.gather(parity, dist, n)).1[2])
            .sum();
        ep.sum(local)
    }

    /// Impose component densities and φ on the inlet and outlet planes.
    pub fn apply_color(&self, layout: &Layout, tracker: &mut PhaseFieldTracker, setpoints: &ColorSetpoints) {
        for &n in &self.inlet {
            tracker.set_site(layout, n, setpoints.inlet_a, setpoints.inlet_b);
        }
        for &n in &self.outlet {
            tracker.set_site(layout, n, setpoints.outlet_a, setpoints.outlet_b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decomposition::ProcessGrid;
    use crate::domain::labels::{ComponentTable, LabelGrid, COMPONENT_A};
    use crate::domain::layout::DomainIndexBuilder;
    use crate::lattice::d3q19::equilibrium;
    use crate::types::Extent3;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_flux_matches_target() {
        let labels = LabelGrid::filled(Extent3::new(4, 4, 6), COMPONENT_A);
        let sub = Subdomain::extract(&labels, ProcessGrid::serial(), 0).unwrap();
        let layout = DomainIndexBuilder::for_subdomain(&sub, &ComponentTable::empty())
            .build()
            .unwrap();
        let mut ep = Endpoint::solo();
        let bc = BoundaryConditionEnforcer::new(&sub, &layout, &mut ep).unwrap();
        assert_eq!(bc.inlet_area(), 16.0);

        let np = layout.np();
        let aa = AaAddressing::new(&layout);
        let mut dist = vec![0.0; Q * np];
        for n in layout.sites() {
            for q in 0..Q {
                dist[q * np + n] = equilibrium(q, 1.0 + 0.001 * (n % 5) as f64, [0.0, 0.0, 0.01]);
            }
        }
        for parity in [Parity::Odd, Parity::Even] {
            let din = bc.apply_flux(&mut ep, &aa, parity, &mut dist, 0.08, 1.0).unwrap();
            assert!(din > 0.9 && din < 1.1);
            let q = bc.inlet_momentum(&mut ep, &aa, parity, &dist).unwrap();
            assert!((q - 0.08).abs() < TOL);
        }
    }
}
