//! Collective diagnostics of the two-component state.
//!
//! Every quantity is reduced over all partitions before the control loop
//! sees it:
//!
//! ```text
//! Ca       = |V_A μ_A |v_A| + V_B μ_B |v_B|| / (α N)
//! settling = sqrt(Σ (φ - φ_prev)²) / N / porosity
//! S        = V_B / (V_A + V_B)
//! ∇p       = |F| + (ρ_in - ρ_out) / (3 N_z)
//! k_i      = μ_i |v_i| / ∇p
//! ```
//!
//! `N` is the global number of owned grid sites; `v_A` and `v_B` are site
//! velocity sums over the respective phase divided by `N`.

use crate::comm::Endpoint;
use crate::domain::layout::Layout;
use crate::error::{DivergenceError, LbmError};

/// Dynamic viscosity of a component.
#[inline]
pub fn dynamic_viscosity(rho: f64, tau: f64) -> f64 {
    rho * (tau - 0.5) / 3.0
}

/// Capillary number from phase volumes and mean velocities.
pub fn capillary_number(
    volumes: (f64, f64),
    viscosities: (f64, f64),
    speeds: (f64, f64),
    alpha: f64,
    total_sites: f64,
) -> f64 {
    (volumes.0 * viscosities.0 * speeds.0 + volumes.1 * viscosities.1 * speeds.1).abs() / (alpha * total_sites)
}

/// Effective pressure gradient of body force plus boundary density drop.
pub fn pressure_gradient(force: [f64; 3], din: f64, dout: f64, nz_global: usize) -> f64 {
    norm(force) + (din - dout) / nz_global as f64 / 3.0
}

/// Darcy permeability in lattice units; zero without a driving gradient.
pub fn permeability(viscosity: f64, speed: f64, grad_p: f64) -> f64 {
    if grad_p.abs() > 0.0 {
        viscosity * speed / grad_p
    } else {
        0.0
    }
}

#[inline]
pub(crate) fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Run constants the reduction needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiagnosticInputs {
    pub viscosity_a: f64,
    pub viscosity_b: f64,
    pub alpha: f64,
    pub force: [f64; 3],
    pub din: f64,
    pub dout: f64,
    /// Global owned grid sites.
    pub total_sites: f64,
    pub nz_global: usize,
    pub porosity: f64,
}

/// One analysis worth of reduced quantities.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Diagnostics {
    pub timestep: usize,
    /// Pore sites with φ > 0.
    pub volume_a: f64,
    /// Pore sites with φ < 0.
    pub volume_b: f64,
    pub saturation: f64,
    pub velocity_a: [f64; 3],
    pub velocity_b: [f64; 3],
    pub capillary_number: f64,
    pub settling: f64,
    pub permeability_a: f64,
    pub permeability_b: f64,
    pub force_magnitude: f64,
}

impl Diagnostics {
    /// Guard against non-finite control inputs.
    pub fn check_finite(&self) -> Result<(), DivergenceError> {
        let fields = [
            ("capillary_number", self.capillary_number),
            ("saturation", self.saturation),
            ("settling", self.settling),
            ("permeability_a", self.permeability_a),
            ("permeability_b", self.permeability_b),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(DivergenceError::NonFiniteDiagnostic {
                    timestep: self.timestep,
                    name,
                });
            }
        }
        Ok(())
    }
}

/// Local sums: `[V_A, V_B, vA(3), vB(3), Σ(Δφ)²]`.
type LocalSums = [f64; 9];

fn accumulate(sums: &mut LocalSums, phi: f64, previous: f64, u: [f64; 3]) {
    // φ == 0 belongs to neither phase
    let base = if phi > 0.0 {
        sums[0] += 1.0;
        Some(2)
    } else if phi < 0.0 {
        sums[1] += 1.0;
        Some(5)
    } else {
        None
    };
    if let Some(base) = base {
        sums[base] += u[0];
        sums[base + 1] += u[1];
        sums[base + 2] += u[2];
    }
    let d = phi - previous;
    sums[8] += d * d;
}

/// Reduces diagnostics and remembers φ for the settling metric.
#[derive(Clone, Debug)]
pub struct DiagnosticsReducer {
    previous: Vec<f64>,
}

impl DiagnosticsReducer {
    /// Start from the current compact φ snapshot.
    pub fn new(layout: &Layout, phi: &[f64]) -> Self {
        let mut previous = vec![0.0; layout.np()];
        for n in layout.sites() {
            previous[n] = phi[layout.grid_of(n)];
        }
        Self { previous }
    }

    /// Reset the snapshot, e.g. after an external φ edit.
    pub fn reset(&mut self, layout: &Layout, phi: &[f64]) {
        for n in layout.sites() {
            self.previous[n] = phi[layout.grid_of(n)];
        }
    }

    #[cfg_attr(feature = "parallel", allow(dead_code))]
    fn local_sums(&self, layout: &Layout, phi: &[f64], velocity: &[f64]) -> LocalSums {
        let np = layout.np();
        let mut sums = [0.0; 9];
        for n in layout.sites() {
            let u = [velocity[n], velocity[np + n], velocity[2 * np + n]];
            accumulate(&mut sums, phi[layout.grid_of(n)], self.previous[n], u);
        }
        sums
    }

    #[cfg(feature = "parallel")]
    fn local_sums_parallel(&self, layout: &Layout, phi: &[f64], velocity: &[f64]) -> LocalSums {
        use rayon::prelude::*;

        let np = layout.np();
        let grid = layout.grid_table();
        let previous = &self.previous;
        layout
            .exterior()
            .into_par_iter()
            .chain(layout.interior().into_par_iter())
            .fold(
                || [0.0; 9],
                |mut sums, n| {
                    let u = [velocity[n], velocity[np + n], velocity[2 * np + n]];
                    accumulate(&mut sums, phi[grid[n] as usize], previous[n], u);
                    sums
                },
            )
            .reduce(
                || [0.0; 9],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            )
    }

    /// Reduce over all partitions (collective).
    pub fn reduce(
        &mut self,
        ep: &mut Endpoint,
        timestep: usize,
        layout: &Layout,
        phi: &[f64],
        velocity: &[f64],
        inputs: &DiagnosticInputs,
    ) -> Result<Diagnostics, LbmError> {
        #[cfg(feature = "parallel")]
        let local = self.local_sums_parallel(layout, phi, velocity);
        #[cfg(not(feature = "parallel"))]
        let local = self.local_sums(layout, phi, velocity);

        let global = ep.all_reduce_sum(&local)?;
        self.reset(layout, phi);
        let diag = Self::assemble(timestep, &global, inputs);
        diag.check_finite()?;
        Ok(diag)
    }

    fn assemble(timestep: usize, global: &[f64], inputs: &DiagnosticInputs) -> Diagnostics {
        let n = inputs.total_sites;
        let volume_a = global[0];
        let volume_b = global[1];
        let velocity_a = [global[2] / n, global[3] / n, global[4] / n];
        let velocity_b = [global[5] / n, global[6] / n, global[7] / n];
        let speeds = (norm(velocity_a), norm(velocity_b));
        let grad_p = pressure_gradient(inputs.force, inputs.din, inputs.dout, inputs.nz_global);
        let occupied = volume_a + volume_b;
        Diagnostics {
            timestep,
            volume_a,
            volume_b,
            saturation: if occupied > 0.0 { volume_b / occupied } else { 0.0 },
            velocity_a,
            velocity_b,
            capillary_number: capillary_number(
                (volume_a, volume_b),
                (inputs.viscosity_a, inputs.viscosity_b),
                speeds,
                inputs.alpha,
                n,
            ),
            settling: global[8].sqrt() / n / inputs.porosity,
            permeability_a: permeability(inputs.viscosity_a, speeds.0, grad_p),
            permeability_b: permeability(inputs.viscosity_b, speeds.1, grad_p),
            force_magnitude: norm(inputs.force),
        }
    }
}
