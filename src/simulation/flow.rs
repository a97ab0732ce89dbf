//! Single-phase flow driver with an optional passive scalar.
//!
//! Within a half-step the flow update finishes first, boundary conditions
//! included; the scalar is then carried by the velocity of that same
//! half-step. Each field has its own exchange channel and both close
//! before the barrier.

use std::time::Instant;

use tracing::info;

use crate::analysis::stability::{StabilityMonitor, StabilityThresholds};
use crate::boundary::{BoundaryConditionEnforcer, Setpoints};
use crate::comm::{Channel, Communicator, Endpoint};
use crate::config::{RunConfig, ThermalConfig};
use crate::control::diagnostics::{norm, permeability, pressure_gradient};
use crate::domain::decomposition::Subdomain;
use crate::domain::labels::ComponentTable;
use crate::domain::layout::Layout;
use crate::error::{DivergenceError, LbmError};
use crate::io::CheckpointStore;
use crate::kernel::addressing::{AaAddressing, Parity};
use crate::kernel::flow::{flow_update, FlowParams};
use crate::kernel::scalar::{scalar_omega, scalar_update};
use crate::simulation::{
    build_layout, check_health, checkpoint_every, rest_populations, restart_timestep, site_density, RunSummary,
    StopReason,
};

/// Reduced state of one analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowDiagnostics {
    pub timestep: usize,
    /// Velocity summed over simulated sites, divided by all grid sites.
    pub mean_velocity: [f64; 3],
    /// Absolute permeability in lattice units.
    pub permeability: f64,
    /// Total density.
    pub mass: f64,
    /// Total scalar, zero without transport.
    pub scalar: f64,
}

struct Scalar {
    populations: Vec<f64>,
    concentration: Vec<f64>,
    omega: f64,
    c_in: f64,
    c_out: f64,
}

impl Scalar {
    fn new(layout: &Layout, parity: Parity, thermal: &ThermalConfig) -> Self {
        // start from the outlet concentration at rest
        let populations = rest_populations(layout, parity, thermal.c_out);
        let mut concentration = vec![0.0; layout.np()];
        for n in layout.sites() {
            concentration[n] = thermal.c_out;
        }
        Self {
            populations,
            concentration,
            omega: scalar_omega(thermal.diffusivity),
            c_in: thermal.c_in,
            c_out: thermal.c_out,
        }
    }
}

/// One partition of a single-phase run.
pub struct FlowSimulation {
    sub: Subdomain,
    layout: Layout,
    comm: Communicator,
    enforcer: BoundaryConditionEnforcer,
    dist: Vec<f64>,
    velocity: Vec<f64>,
    params: FlowParams,
    setpoints: Setpoints,
    din: f64,
    scalar: Option<Scalar>,
    monitor: StabilityMonitor,
    unstable: bool,
    diagnostics: Option<FlowDiagnostics>,
    previous_permeability: Option<f64>,
    converged: bool,
    perm_tolerance: f64,
    analysis_interval: usize,
    total_sites: f64,
    timestep: usize,
    timestep_max: usize,
    checkpoints: CheckpointStore,
    checkpoint_interval: Option<usize>,
}

impl FlowSimulation {
    /// Build the partition state, resuming from a checkpoint when asked
    /// (collective).
    pub fn new(config: &RunConfig, sub: Subdomain, ep: &mut Endpoint) -> Result<Self, LbmError> {
        let components = ComponentTable::empty();
        let layout = build_layout(&sub, &components, ep)?;
        let comm = Communicator::new(&sub, &layout, &components);
        let enforcer = BoundaryConditionEnforcer::new(&sub, &layout, ep)?;
        let setpoints = config.boundary.setpoints();

        let first = Parity::of(1);
        let mut dist = rest_populations(&layout, first, 1.0);
        let checkpoints = CheckpointStore::new(&config.run.restart_dir);
        let mut timestep = 0;
        if config.run.restart {
            let snapshot = checkpoints.read(sub.rank(), &layout)?;
            if let Some(t) = restart_timestep(ep, &checkpoints, snapshot.is_some())? {
                if let Some(snapshot) = snapshot {
                    timestep = t;
                    dist = snapshot.dist;
                }
            }
        }
        let scalar = config
            .flow
            .thermal
            .as_ref()
            .map(|thermal| Scalar::new(&layout, Parity::of(timestep + 1), thermal));

        if ep.is_root() {
            info!(
                ranks = ep.size(),
                global = %config.extent(),
                tau = config.flow.tau,
                thermal = scalar.is_some(),
                mode = ?setpoints.mode,
                "flow model ready"
            );
        }

        Ok(Self {
            velocity: vec![0.0; 3 * layout.np()],
            params: FlowParams {
                model: config.flow.collision,
                tau: config.flow.tau,
                force: config.flow.force,
            },
            din: setpoints.din,
            setpoints,
            scalar,
            monitor: StabilityMonitor::new(StabilityThresholds::default()),
            unstable: false,
            diagnostics: None,
            previous_permeability: None,
            converged: false,
            perm_tolerance: config.flow.perm_tolerance,
            analysis_interval: config.control.analysis_interval,
            total_sites: config.extent().len() as f64,
            timestep,
            timestep_max: config.run.timestep_max,
            checkpoints,
            checkpoint_interval: checkpoint_every(config.run.checkpoint_interval),
            sub,
            layout,
            comm,
            enforcer,
            dist,
        })
    }

    /// Advance one half-step (collective).
    pub fn half_step(&mut self, ep: &mut Endpoint) -> Result<(), LbmError> {
        self.timestep += 1;
        let parity = Parity::of(self.timestep);
        let aa = AaAddressing::new(&self.layout);
        let interior = self.layout.interior();
        let exterior = self.layout.exterior();

        let pending = self.comm.start(ep, Channel::Flow, &self.dist)?;
        flow_update(&aa, parity, &mut self.dist, &mut self.velocity, &self.params, interior.clone());
        self.comm.finish(ep, pending, &mut self.dist)?;
        self.din = self.enforcer.apply(ep, &aa, parity, &mut self.dist, &self.setpoints)?;
        flow_update(&aa, parity, &mut self.dist, &mut self.velocity, &self.params, exterior.clone());

        if let Some(scalar) = self.scalar.as_mut() {
            let pending = self.comm.start(ep, Channel::Scalar, &scalar.populations)?;
            scalar_update(
                &aa,
                parity,
                &mut scalar.populations,
                &self.velocity,
                &mut scalar.concentration,
                scalar.omega,
                interior,
            );
            self.comm.finish(ep, pending, &mut scalar.populations)?;
            if self.setpoints.mode.is_open() {
                self.enforcer
                    .apply_pressure(&aa, parity, &mut scalar.populations, scalar.c_in, scalar.c_out);
            }
            scalar_update(
                &aa,
                parity,
                &mut scalar.populations,
                &self.velocity,
                &mut scalar.concentration,
                scalar.omega,
                exterior,
            );
        }
        ep.barrier();

        if self.timestep % self.analysis_interval == 0 {
            self.analyze(ep)?;
        }
        if let Some(every) = self.checkpoint_interval {
            if self.timestep % every == 0 {
                self.checkpoint(ep)?;
            }
        }
        Ok(())
    }

    /// Run until the budget is spent or the permeability converges.
    pub fn run(&mut self, ep: &mut Endpoint) -> Result<RunSummary, LbmError> {
        let start = Instant::now();
        let stop = loop {
            if self.converged {
                break StopReason::Converged;
            }
            if self.unstable {
                break StopReason::Unstable;
            }
            if self.timestep >= self.timestep_max {
                break StopReason::TimestepLimit;
            }
            self.half_step(ep)?;
        };
        let summary = RunSummary::new(self.sub.rank(), self.timestep, stop, 0, start.elapsed().as_secs_f64());
        if ep.is_root() {
            info!(
                timesteps = summary.timesteps,
                stop = ?summary.stop,
                permeability = self.diagnostics.map_or(0.0, |d| d.permeability),
                wall_time = summary.wall_time,
                "run finished"
            );
        }
        Ok(summary)
    }

    /// Reduce diagnostics and test permeability convergence (collective).
    fn analyze(&mut self, ep: &mut Endpoint) -> Result<(), LbmError> {
        let t = self.timestep;
        let aa = AaAddressing::new(&self.layout);
        let next = Parity::of(t + 1);
        let np = self.layout.np();
        let mut local = [0.0; 5];
        for n in self.layout.sites() {
            local[0] += self.velocity[n];
            local[1] += self.velocity[np + n];
            local[2] += self.velocity[2 * np + n];
            local[3] += site_density(&aa, next, &self.dist, n);
            if let Some(scalar) = &self.scalar {
                local[4] += scalar.concentration[n];
            }
        }
        let global = ep.all_reduce_sum(&local)?;
        let mean_velocity = [
            global[0] / self.total_sites,
            global[1] / self.total_sites,
            global[2] / self.total_sites,
        ];
        let viscosity = (self.params.tau - 0.5) / 3.0;
        let grad_p = pressure_gradient(self.params.force, self.din, self.setpoints.dout, self.sub.global().nz());
        let diag = FlowDiagnostics {
            timestep: t,
            mean_velocity,
            permeability: permeability(viscosity, norm(mean_velocity), grad_p),
            mass: global[3],
            scalar: global[4],
        };
        if !diag.permeability.is_finite() {
            return Err(DivergenceError::NonFiniteDiagnostic {
                timestep: t,
                name: "permeability",
            }
            .into());
        }
        self.unstable = check_health(ep, &mut self.monitor, t, &self.layout, &self.dist, &self.velocity)?;

        if let Some(previous) = self.previous_permeability {
            let k = diag.permeability;
            if k > 0.0 && ((k - previous) / k).abs() < self.perm_tolerance {
                self.converged = true;
            }
        }
        self.previous_permeability = Some(diag.permeability);
        if ep.is_root() {
            info!(
                timestep = t,
                permeability = diag.permeability,
                velocity = ?diag.mean_velocity,
                din = self.din,
                converged = self.converged,
                "analysis"
            );
        }
        self.diagnostics = Some(diag);
        Ok(())
    }

    /// Write this rank's checkpoint; only after an even half-step.
    pub fn checkpoint(&self, ep: &Endpoint) -> Result<(), LbmError> {
        debug_assert_eq!(Parity::of(self.timestep), Parity::Even);
        let np = self.layout.np();
        let mut den = vec![0.0; 2 * np];
        den[..np].copy_from_slice(&self.density());
        self.checkpoints.write(self.sub.rank(), &self.layout, &den, &self.dist)?;
        if ep.is_root() {
            self.checkpoints.write_timestep(self.timestep)?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn subdomain(&self) -> &Subdomain {
        &self.sub
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn velocity(&self) -> &[f64] {
        &self.velocity
    }

    pub fn populations(&self) -> &[f64] {
        &self.dist
    }

    /// Density of every compact slot.
    pub fn density(&self) -> Vec<f64> {
        let aa = AaAddressing::new(&self.layout);
        let parity = Parity::of(self.timestep + 1);
        let mut rho = vec![0.0; self.layout.np()];
        for n in self.layout.sites() {
            rho[n] = site_density(&aa, parity, &self.dist, n);
        }
        rho
    }

    /// Lattice pressure `ρ/3` of every compact slot.
    pub fn pressure(&self) -> Vec<f64> {
        self.density().into_iter().map(|rho| rho / 3.0).collect()
    }

    /// Scalar concentration, if transport is attached.
    pub fn concentration(&self) -> Option<&[f64]> {
        self.scalar.as_ref().map(|s| s.concentration.as_slice())
    }

    /// Sum of the scalar populations a site reads next; equals the
    /// concentration after collision.
    pub fn scalar_total(&self) -> f64 {
        let Some(scalar) = &self.scalar else {
            return 0.0;
        };
        let aa = AaAddressing::new(&self.layout);
        let parity = Parity::of(self.timestep + 1);
        self.layout
            .sites()
            .map(|n| site_density(&aa, parity, &scalar.populations, n))
            .sum()
    }

    pub fn diagnostics(&self) -> Option<&FlowDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn inlet_density(&self) -> f64 {
        self.din
    }

    pub fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    pub fn enforcer(&self) -> &BoundaryConditionEnforcer {
        &self.enforcer
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn to_regular(&self, field: &[f64], fill: f64) -> Vec<f64> {
        self.layout.to_regular(field, fill)
    }
}
