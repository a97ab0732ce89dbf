//! Two-component color-gradient driver.

use std::time::Instant;

use tracing::info;

use crate::analysis::stability::{StabilityMonitor, StabilityThresholds};
use crate::boundary::BoundaryConditionEnforcer;
use crate::comm::{Channel, Communicator, Endpoint};
use crate::config::RunConfig;
use crate::control::diagnostics::{dynamic_viscosity, DiagnosticInputs, Diagnostics, DiagnosticsReducer};
use crate::control::morph::{apply_reservoirs, count_phase_a, GatheredMorphology, Morphology};
use crate::control::state::{Actuators, ControlLoop, MorphAction};
use crate::domain::decomposition::Subdomain;
use crate::domain::labels::ComponentTable;
use crate::domain::layout::Layout;
use crate::error::LbmError;
use crate::io::{CheckpointStore, SteadyStateLog};
use crate::kernel::addressing::{AaAddressing, Parity};
use crate::kernel::color::{lattice_strides, ColorParams};
use crate::lattice::d3q19::Q;
use crate::phase::PhaseFieldTracker;
use crate::simulation::{
    build_layout, check_health, checkpoint_every, rest_populations, restart_timestep, site_density, RunSummary,
    StopReason,
};

/// One partition of a two-component run.
pub struct ColorSimulation {
    sub: Subdomain,
    layout: Layout,
    components: ComponentTable,
    comm: Communicator,
    enforcer: BoundaryConditionEnforcer,
    tracker: PhaseFieldTracker,
    dist: Vec<f64>,
    velocity: Vec<f64>,
    strides: [isize; Q],
    params: ColorParams,
    actuators: Actuators,
    /// Inlet density in effect after the last boundary update.
    din: f64,
    control: ControlLoop,
    reducer: DiagnosticsReducer,
    morphology: Morphology<GatheredMorphology>,
    monitor: StabilityMonitor,
    unstable: bool,
    diagnostics: Option<Diagnostics>,
    viscosity: (f64, f64),
    total_sites: f64,
    porosity: f64,
    timestep: usize,
    timestep_max: usize,
    affinity_ramp_steps: usize,
    checkpoints: CheckpointStore,
    checkpoint_interval: Option<usize>,
    steady_log: SteadyStateLog,
    samples: usize,
}

impl ColorSimulation {
    /// Build the partition state, resuming from a checkpoint when asked
    /// (collective).
    pub fn new(config: &RunConfig, sub: Subdomain, ep: &mut Endpoint) -> Result<Self, LbmError> {
        let components = config.components()?;
        let layout = build_layout(&sub, &components, ep)?;
        let comm = Communicator::new(&sub, &layout, &components);
        let enforcer = BoundaryConditionEnforcer::new(&sub, &layout, ep)?;
        let setpoints = config.boundary.setpoints();

        let ramp = config.control.affinity_ramp_steps;
        let scale = if ramp > 0 { 0.0 } else { 1.0 };
        let first = Parity::of(1);
        let mut tracker = PhaseFieldTracker::new(&sub, &layout, &components, scale, first);
        if setpoints.mode.is_open() {
            apply_reservoirs(&sub, &layout, tracker.phi_mut());
            tracker.reinitialize(&layout, first);
        }
        let mut dist = rest_populations(&layout, first, 1.0);

        let checkpoints = CheckpointStore::new(&config.run.restart_dir);
        let mut timestep = 0;
        if config.run.restart {
            let snapshot = checkpoints.read(sub.rank(), &layout)?;
            if let Some(t) = restart_timestep(ep, &checkpoints, snapshot.is_some())? {
                if let Some(snapshot) = snapshot {
                    timestep = t;
                    tracker.set_densities(&snapshot.den);
                    if ramp > 0 {
                        tracker.set_affinities(&sub, &components, (t as f64 / ramp as f64).min(1.0));
                    }
                    tracker.reinitialize_from_densities(&layout, Parity::of(t + 1));
                    dist = snapshot.dist;
                    if ep.is_root() {
                        info!(timestep = t, "resumed from checkpoint");
                    }
                }
            }
        }
        comm.exchange_halo(ep, tracker.phi_mut())?;

        let color = &config.color;
        let params = ColorParams {
            model: color.collision,
            tau_a: color.tau_a,
            tau_b: color.tau_b,
            alpha: color.alpha,
            beta: color.beta,
            force: color.force,
        };
        let actuators = Actuators {
            force: color.force,
            setpoints,
            color: config.boundary.color_setpoints(),
        };
        let total_sites = config.extent().len() as f64;
        let fluid = ep.sum(layout.site_count() as f64)?;
        let porosity = fluid / total_sites;
        if ep.is_root() {
            info!(
                ranks = ep.size(),
                global = %config.extent(),
                porosity,
                inlet_area = enforcer.inlet_area(),
                mode = ?setpoints.mode,
                "color model ready"
            );
        }

        Ok(Self {
            reducer: DiagnosticsReducer::new(&layout, tracker.phi()),
            control: ControlLoop::new(config.control.clone(), &actuators).with_verbose(ep.is_root()),
            morphology: Morphology::new(GatheredMorphology, &sub, &components, config.control.seed),
            monitor: StabilityMonitor::new(StabilityThresholds::default()),
            unstable: false,
            velocity: vec![0.0; 3 * layout.np()],
            strides: lattice_strides(sub.halo_extent()),
            din: setpoints.din,
            diagnostics: None,
            viscosity: (
                dynamic_viscosity(color.rho_a, color.tau_a),
                dynamic_viscosity(color.rho_b, color.tau_b),
            ),
            total_sites,
            porosity,
            timestep,
            timestep_max: config.run.timestep_max,
            affinity_ramp_steps: ramp,
            checkpoints,
            checkpoint_interval: checkpoint_every(config.run.checkpoint_interval),
            steady_log: SteadyStateLog::new(&config.run.output_dir),
            samples: 0,
            sub,
            layout,
            components,
            comm,
            enforcer,
            tracker,
            dist,
            params,
            actuators,
        })
    }

    /// Advance one half-step (collective).
    pub fn half_step(&mut self, ep: &mut Endpoint) -> Result<(), LbmError> {
        self.timestep += 1;
        let parity = Parity::of(self.timestep);
        let aa = AaAddressing::new(&self.layout);
        let interior = self.layout.interior();
        let exterior = self.layout.exterior();

        let (aq, bq) = self.tracker.populations();
        let transport = self.comm.start_transport(ep, aq, bq)?;
        self.tracker.update(&self.layout, parity, interior.clone());
        let (aq, bq) = self.tracker.populations_mut();
        self.comm.finish_transport(ep, transport, aq, bq)?;
        self.tracker.update(&self.layout, parity, exterior.clone());

        if self.actuators.setpoints.mode.is_open() {
            self.enforcer
                .apply_color(&self.layout, &mut self.tracker, &self.actuators.color);
        }

        let halo = self.comm.start_halo(ep, self.tracker.phi())?;
        let flow = self.comm.start(ep, Channel::Flow, &self.dist)?;
        self.tracker.collide(
            &self.layout,
            parity,
            &mut self.dist,
            &mut self.velocity,
            &self.strides,
            &self.params,
            interior,
        );
        self.comm.finish_halo(ep, halo, self.tracker.phi_mut())?;
        self.comm.finish(ep, flow, &mut self.dist)?;
        self.din = self
            .enforcer
            .apply(ep, &aa, parity, &mut self.dist, &self.actuators.setpoints)?;
        self.tracker.collide(
            &self.layout,
            parity,
            &mut self.dist,
            &mut self.velocity,
            &self.strides,
            &self.params,
            exterior,
        );
        ep.barrier();

        if self.timestep % self.control.params().analysis_interval == 0 {
            self.analyze(ep)?;
        }
        if let Some(every) = self.checkpoint_interval {
            if self.timestep % every == 0 {
                self.checkpoint(ep)?;
            }
        }
        Ok(())
    }

    /// Run until the timestep budget is spent or the control loop is done.
    pub fn run(&mut self, ep: &mut Endpoint) -> Result<RunSummary, LbmError> {
        let start = Instant::now();
        let stop = loop {
            if self.control.is_done() {
                break StopReason::ScheduleDone;
            }
            if self.unstable {
                break StopReason::Unstable;
            }
            if self.timestep >= self.timestep_max {
                break StopReason::TimestepLimit;
            }
            self.half_step(ep)?;
        };
        let summary = RunSummary::new(
            self.sub.rank(),
            self.timestep,
            stop,
            self.samples,
            start.elapsed().as_secs_f64(),
        );
        if ep.is_root() {
            info!(
                timesteps = summary.timesteps,
                stop = ?summary.stop,
                samples = summary.samples,
                wall_time = summary.wall_time,
                "run finished"
            );
        }
        Ok(summary)
    }

    /// Reduce diagnostics and let the control loop act (collective).
    fn analyze(&mut self, ep: &mut Endpoint) -> Result<(), LbmError> {
        let t = self.timestep;
        let inputs = DiagnosticInputs {
            viscosity_a: self.viscosity.0,
            viscosity_b: self.viscosity.1,
            alpha: self.params.alpha,
            force: self.actuators.force,
            din: self.din,
            dout: self.actuators.setpoints.dout,
            total_sites: self.total_sites,
            nz_global: self.sub.global().nz(),
            porosity: self.porosity,
        };
        let diag = self
            .reducer
            .reduce(ep, t, &self.layout, self.tracker.phi(), &self.velocity, &inputs)?;
        self.unstable = check_health(ep, &mut self.monitor, t, &self.layout, &self.dist, &self.velocity)?;
        if ep.is_root() {
            info!(
                timestep = t,
                ca = diag.capillary_number,
                saturation = diag.saturation,
                settling = diag.settling,
                force = ?self.actuators.force,
                din = self.din,
                phase = ?self.control.phase(),
                "analysis"
            );
        }

        if self.affinity_ramp_steps > 0 && t <= self.affinity_ramp_steps {
            let scale = t as f64 / self.affinity_ramp_steps as f64;
            self.tracker.set_affinities(&self.sub, &self.components, scale);
            self.tracker.reinitialize(&self.layout, Parity::of(t + 1));
        }

        let outcome = self.control.analyze(&diag, &mut self.actuators);
        self.params.force = self.actuators.force;
        if let Some(sample) = outcome.sample {
            self.samples += 1;
            if ep.is_root() {
                self.steady_log.append(&sample)?;
            }
        }
        if let Some(action) = outcome.morph {
            self.morph(ep, action, &diag)?;
        }
        self.diagnostics = Some(diag);
        Ok(())
    }

    /// Edit φ, rebuild the component state and refresh the halo
    /// (collective).
    fn morph(&mut self, ep: &mut Endpoint, action: MorphAction, diag: &Diagnostics) -> Result<(), LbmError> {
        let before = ep.sum(count_phase_a(&self.layout, self.tracker.phi()))?;
        match action {
            MorphAction::Shell { radius } => {
                self.morphology
                    .shell(&self.sub, ep, self.tracker.phi_mut(), self.params.beta, radius)?
            }
            MorphAction::Spinodal { delta } => self.morphology.spinodal(self.tracker.phi_mut(), delta),
        }
        if self.actuators.setpoints.mode.is_open() {
            apply_reservoirs(&self.sub, &self.layout, self.tracker.phi_mut());
        }
        self.refresh_phase(ep)?;

        let after = ep.sum(count_phase_a(&self.layout, self.tracker.phi()))?;
        if let MorphAction::Shell { .. } = action {
            self.control.morph_feedback(after - before, diag.volume_a, diag.volume_b);
        }
        if ep.is_root() {
            info!(?action, delta = after - before, "phase field edited");
        }
        Ok(())
    }

    /// Apply an external edit to φ (halo-inclusive local grid), then
    /// rebuild densities and transport populations on every simulated site
    /// and refresh the halo (collective).
    pub fn edit_phase<F>(&mut self, ep: &mut Endpoint, edit: F) -> Result<(), LbmError>
    where
        F: FnOnce(&Subdomain, &mut [f64]),
    {
        edit(&self.sub, self.tracker.phi_mut());
        self.refresh_phase(ep)
    }

    fn refresh_phase(&mut self, ep: &mut Endpoint) -> Result<(), LbmError> {
        self.tracker.reinitialize(&self.layout, Parity::of(self.timestep + 1));
        self.comm.exchange_halo(ep, self.tracker.phi_mut())?;
        self.reducer.reset(&self.layout, self.tracker.phi());
        Ok(())
    }

    /// Write this rank's checkpoint; only after an even half-step.
    pub fn checkpoint(&self, ep: &Endpoint) -> Result<(), LbmError> {
        debug_assert_eq!(Parity::of(self.timestep), Parity::Even);
        self.checkpoints
            .write(self.sub.rank(), &self.layout, self.tracker.den(), &self.dist)?;
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

    /// Full-grid phase indicator, halo included.
    pub fn phi(&self) -> &[f64] {
        self.tracker.phi()
    }

    pub fn tracker(&self) -> &PhaseFieldTracker {
        &self.tracker
    }

    /// Component-major velocity, `3 * np` values.
    pub fn velocity(&self) -> &[f64] {
        &self.velocity
    }

    /// Raw population slots.
    pub fn populations(&self) -> &[f64] {
        &self.dist
    }

    /// Flow density of every compact slot.
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

    pub fn control(&self) -> &ControlLoop {
        &self.control
    }

    pub fn actuators(&self) -> &Actuators {
        &self.actuators
    }

    /// Diagnostics of the latest analysis.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Inlet density in effect after the last half-step.
    pub fn inlet_density(&self) -> f64 {
        self.din
    }

    pub fn enforcer(&self) -> &BoundaryConditionEnforcer {
        &self.enforcer
    }

    /// Scatter a compact field to the halo-inclusive grid.
    pub fn to_regular(&self, field: &[f64], fill: f64) -> Vec<f64> {
        self.layout.to_regular(field, fill)
    }
}
