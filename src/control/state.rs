//! Adaptive control state machine.
//!
//! ```text
//! Ramping ──ramp elapsed──▶ Stabilizing ◀──target reached── Adapting
//!    │                          │  └──────steady state──────▶ │
//!    └──initial saturation──────┼──────────────────────────▶ │
//!                               └──schedule exhausted──▶ Done
//! ```
//!
//! The loop only sees reduced [`Diagnostics`], so every rank takes the
//! same decisions. It rewrites the run's [`Actuators`] directly and
//! returns the φ edits it wants as a [`MorphAction`] for the caller to
//! perform.

use tracing::{info, warn};

use crate::boundary::{BoundaryMode, ColorSetpoints, Setpoints};
use crate::control::diagnostics::{norm, Diagnostics};
use crate::control::params::{AdaptationStrategy, ControlParams, InjectionKind, ReversalKind};

/// Phase of the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlPhase {
    Ramping,
    Stabilizing,
    Adapting,
    Done,
}

/// Run parameters the loop may rewrite.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Actuators {
    pub force: [f64; 3],
    pub setpoints: Setpoints,
    pub color: ColorSetpoints,
}

/// φ edit requested from the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MorphAction {
    /// Shell erosion or dilation around the largest A blob; positive
    /// radius grows A.
    Shell { radius: f64 },
    /// Random reassignment; negative delta turns B into A.
    Spinodal { delta: f64 },
}

/// A recorded steady state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteadySample {
    pub timestep: usize,
    pub saturation: f64,
    pub capillary_number: f64,
    pub permeability_a: f64,
    pub permeability_b: f64,
    pub force: [f64; 3],
    pub din: f64,
    pub dout: f64,
    pub volume_a: f64,
    pub volume_b: f64,
    pub inlet_a: f64,
    pub inlet_b: f64,
}

/// What one analysis decided.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlOutcome {
    pub sample: Option<SteadySample>,
    pub morph: Option<MorphAction>,
    /// Force rescaling factor, if capillary targeting acted.
    pub rescaled: Option<f64>,
    pub reversed: bool,
}

/// Adaptive control loop of one run.
#[derive(Clone, Debug)]
pub struct ControlLoop {
    params: ControlParams,
    phase: ControlPhase,
    stability_counter: i64,
    acceleration_counter: i64,
    ca_previous: f64,
    target_saturation: f64,
    shell_radius: f64,
    injection: InjectionKind,
    priming: bool,
    reversed: bool,
    base_setpoints: Setpoints,
    base_color: ColorSetpoints,
    verbose: bool,
}

impl ControlLoop {
    /// New loop; `base` holds the configured boundary state restored after
    /// temporary flux injection.
    pub fn new(params: ControlParams, base: &Actuators) -> Self {
        let injection = match params.strategy {
            AdaptationStrategy::ShellMorph(s)
            | AdaptationStrategy::SpinodalMorph(s)
            | AdaptationStrategy::FluxMorph(s) => s.injection,
            AdaptationStrategy::Coinjection { injection } => injection,
            _ => InjectionKind::Drainage,
        };
        Self {
            params,
            phase: ControlPhase::Ramping,
            stability_counter: 0,
            acceleration_counter: 0,
            ca_previous: 0.0,
            target_saturation: 0.0,
            shell_radius: 0.0,
            injection,
            priming: false,
            reversed: false,
            base_setpoints: base.setpoints,
            base_color: base.color,
            verbose: true,
        }
    }

    /// Only log decisions when `verbose`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    pub fn phase(&self) -> ControlPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == ControlPhase::Done
    }

    pub fn stability_counter(&self) -> i64 {
        self.stability_counter
    }

    pub fn acceleration_counter(&self) -> i64 {
        self.acceleration_counter
    }

    pub fn ca_previous(&self) -> f64 {
        self.ca_previous
    }

    pub fn target_saturation(&self) -> f64 {
        self.target_saturation
    }

    pub fn shell_radius(&self) -> f64 {
        self.shell_radius
    }

    pub fn injection(&self) -> InjectionKind {
        self.injection
    }

    pub fn is_priming(&self) -> bool {
        self.priming
    }

    pub fn has_reversed(&self) -> bool {
        self.reversed
    }

    fn interval(&self) -> i64 {
        self.params.analysis_interval as i64
    }

    /// Act on one analysis.
    pub fn analyze(&mut self, diag: &Diagnostics, act: &mut Actuators) -> ControlOutcome {
        let mut out = ControlOutcome::default();
        match self.phase {
            ControlPhase::Done => return out,
            ControlPhase::Ramping => {
                if diag.timestep < self.params.ramp_timesteps {
                    return out;
                }
                self.leave_ramp(diag, act);
            }
            _ => {}
        }

        if let AdaptationStrategy::FluxReversal { reversal } = self.params.strategy {
            self.check_reversal(reversal, diag, act, &mut out);
        }

        if self.targeting_active() {
            out.rescaled = self.rescale(diag.capillary_number, act);
        }

        match self.phase {
            ControlPhase::Stabilizing => self.stabilize(diag, act, &mut out),
            ControlPhase::Adapting => self.adapt(diag, act, &mut out),
            _ => {}
        }
        out
    }

    fn leave_ramp(&mut self, diag: &Diagnostics, act: &mut Actuators) {
        let initial = self.params.strategy.schedule().and_then(|s| s.initial_saturation);
        match initial {
            Some(init) if diag.saturation * self.injection.sign() < init * self.injection.sign() => {
                if self.verbose {
                    info!(target = init, saturation = diag.saturation, "priming by flux injection");
                }
                self.phase = ControlPhase::Adapting;
                self.priming = true;
                self.target_saturation = init;
                act.setpoints.mode = BoundaryMode::Flux;
                act.setpoints.flux = self.injection_flux(diag).abs();
                act.color = match self.injection {
                    InjectionKind::Drainage => ColorSetpoints {
                        inlet_a: 1.0,
                        inlet_b: 0.0,
                        outlet_a: 0.0,
                        outlet_b: 1.0,
                    },
                    InjectionKind::Imbibition => ColorSetpoints {
                        inlet_a: 0.0,
                        inlet_b: 1.0,
                        outlet_a: 1.0,
                        outlet_b: 0.0,
                    },
                };
            }
            _ => self.enter_stabilizing(act),
        }
    }

    fn enter_stabilizing(&mut self, act: &mut Actuators) {
        self.phase = ControlPhase::Stabilizing;
        self.priming = false;
        act.setpoints.mode = self.base_setpoints.mode;
        act.setpoints.flux = self.base_setpoints.flux;
        act.color = self.base_color;
        self.stability_counter = if self.params.target_ca.is_some() && self.params.strategy.allows_capillary_target() {
            -(self.params.stabilisation_rate as i64).min(10 * self.interval())
        } else {
            0
        };
    }

    /// Flux that injects 1% of the pore space every acceleration period.
    fn injection_flux(&self, diag: &Diagnostics) -> f64 {
        let pore = diag.volume_a + diag.volume_b;
        let magnitude = 0.01 * pore / self.params.acceleration_rate as f64;
        match self.injection {
            InjectionKind::Drainage => magnitude,
            InjectionKind::Imbibition => -magnitude,
        }
    }

    fn targeting_active(&self) -> bool {
        if self.params.target_ca.is_none() || !self.params.strategy.allows_capillary_target() {
            return false;
        }
        match self.phase {
            ControlPhase::Stabilizing => match self.params.strategy {
                AdaptationStrategy::CapillaryTarget | AdaptationStrategy::FluxReversal { .. } => true,
                _ => self.stability_counter <= 0,
            },
            _ => false,
        }
    }

    /// Scale force and flux by `target / Ca`, clamping the force magnitude.
    fn rescale(&mut self, ca: f64, act: &mut Actuators) -> Option<f64> {
        let target = self.params.target_ca?;
        if ca.is_nan() || ca <= 0.0 {
            return None;
        }
        let factor = target / ca;
        for f in act.force.iter_mut() {
            *f *= factor;
        }
        let magnitude = norm(act.force);
        if magnitude > self.params.force_ceiling {
            let s = self.params.force_ceiling / magnitude;
            act.force.iter_mut().for_each(|f| *f *= s);
            if self.verbose {
                warn!(magnitude, ceiling = self.params.force_ceiling, "force clamped to ceiling");
            }
        } else if magnitude > 0.0 && magnitude < self.params.force_floor {
            let s = self.params.force_floor / magnitude;
            act.force.iter_mut().for_each(|f| *f *= s);
            if self.verbose {
                warn!(magnitude, floor = self.params.force_floor, "force raised to floor");
            }
        }
        if act.setpoints.mode == BoundaryMode::Flux {
            act.setpoints.flux *= factor;
        }
        self.ca_previous = ca;
        if self.verbose {
            info!(factor, ca, target, "force rescaled");
        }
        Some(factor)
    }

    fn check_reversal(
        &mut self,
        kind: ReversalKind,
        diag: &Diagnostics,
        act: &mut Actuators,
        out: &mut ControlOutcome,
    ) {
        if self.reversed {
            return;
        }
        let by_saturation = self
            .params
            .flux_reversal_threshold
            .is_some_and(|t| diag.saturation < t);
        let settled = diag.settling < self.params.settling_tolerance;
        if !(by_saturation || settled) {
            return;
        }
        match kind {
            ReversalKind::PhaseSwap => {
                let c = &mut act.color;
                c.inlet_a = (c.inlet_a - 1.0).abs();
                c.inlet_b = (c.inlet_b - 1.0).abs();
                c.outlet_a = (c.outlet_a - 1.0).abs();
                c.outlet_b = (c.outlet_b - 1.0).abs();
            }
            ReversalKind::FlowDirection => {
                act.setpoints.flux = -act.setpoints.flux;
                act.force.iter_mut().for_each(|f| *f = -*f);
            }
        }
        if self.verbose {
            info!(?kind, saturation = diag.saturation, settling = diag.settling, "flux reversed");
        }
        self.reversed = true;
        out.reversed = true;
    }

    fn sample(diag: &Diagnostics, act: &Actuators) -> SteadySample {
        SteadySample {
            timestep: diag.timestep,
            saturation: diag.saturation,
            capillary_number: diag.capillary_number,
            permeability_a: diag.permeability_a,
            permeability_b: diag.permeability_b,
            force: act.force,
            din: act.setpoints.din,
            dout: act.setpoints.dout,
            volume_a: diag.volume_a,
            volume_b: diag.volume_b,
            inlet_a: act.color.inlet_a,
            inlet_b: act.color.inlet_b,
        }
    }

    fn stabilize(&mut self, diag: &Diagnostics, act: &mut Actuators, out: &mut ControlOutcome) {
        let watches_steady_state = !matches!(
            self.params.strategy,
            AdaptationStrategy::CapillaryTarget | AdaptationStrategy::FluxReversal { .. }
        );
        if watches_steady_state && self.stability_counter >= self.params.stabilisation_rate as i64 {
            let ca = diag.capillary_number;
            let converged = ca > 0.0 && ((ca - self.ca_previous) / ca).abs() < self.params.tolerance;
            if converged {
                if self.verbose {
                    info!(
                        timestep = diag.timestep,
                        ca,
                        saturation = diag.saturation,
                        "steady state reached"
                    );
                }
                out.sample = Some(Self::sample(diag, act));
                self.on_steady_state(diag, act);
            } else {
                self.stability_counter = 0;
            }
            self.ca_previous = ca;
        }

        match self.phase {
            ControlPhase::Stabilizing => self.stability_counter += self.interval(),
            ControlPhase::Adapting => self.adapt(diag, act, out),
            _ => {}
        }
    }

    fn on_steady_state(&mut self, diag: &Diagnostics, act: &mut Actuators) {
        let inc = self.params.saturation_increment;
        match self.params.strategy {
            AdaptationStrategy::Coinjection { injection } => {
                let shift = match injection {
                    InjectionKind::Drainage => inc,
                    InjectionKind::Imbibition => -inc,
                };
                let a = act.color.inlet_a + shift;
                let b = act.color.inlet_b - shift;
                if !(0.0..=1.0).contains(&a) || !(0.0..=1.0).contains(&b) {
                    self.finish();
                    return;
                }
                act.color.inlet_a = a;
                act.color.inlet_b = b;
                self.base_color = act.color;
                self.stability_counter = 0;
                if self.verbose {
                    info!(inlet_a = a, inlet_b = b, "inlet composition shifted");
                }
            }
            AdaptationStrategy::ShellMorph(schedule)
            | AdaptationStrategy::SpinodalMorph(schedule)
            | AdaptationStrategy::FluxMorph(schedule) => {
                let sign = self.injection.sign();
                let target = diag.saturation + sign * inc;
                let past_final = schedule
                    .final_saturation
                    .is_some_and(|f| (target - f) * sign > 0.0);
                if !(0.0..=1.0).contains(&target) || past_final {
                    self.finish();
                    return;
                }
                self.target_saturation = target;
                self.shell_radius = match self.injection {
                    InjectionKind::Drainage => 1.0,
                    InjectionKind::Imbibition => -0.1,
                };
                self.phase = ControlPhase::Adapting;
                self.acceleration_counter = self.params.acceleration_rate as i64;
                if self.verbose {
                    info!(target, "adapting toward new saturation");
                }
            }
            AdaptationStrategy::CapillaryTarget | AdaptationStrategy::FluxReversal { .. } => {}
        }
    }

    fn finish(&mut self) {
        if self.verbose {
            info!("saturation schedule exhausted");
        }
        self.phase = ControlPhase::Done;
    }

    fn adapt(&mut self, diag: &Diagnostics, act: &mut Actuators, out: &mut ControlOutcome) {
        let sign = self.injection.sign();
        if self.priming {
            if diag.saturation * sign >= self.target_saturation * sign {
                if self.verbose {
                    info!(saturation = diag.saturation, "initial saturation reached");
                }
                self.enter_stabilizing(act);
            }
            return;
        }

        if self.acceleration_counter >= self.params.acceleration_rate as i64 {
            if diag.saturation * sign > self.target_saturation * sign {
                if self.verbose {
                    info!(saturation = diag.saturation, "target reached, stabilizing");
                }
                self.enter_stabilizing(act);
                return;
            }
            self.acceleration_counter = 0;
            match self.params.strategy {
                AdaptationStrategy::FluxMorph(_) => {
                    act.setpoints.mode = BoundaryMode::Flux;
                    act.setpoints.flux = self.injection_flux(diag);
                }
                AdaptationStrategy::SpinodalMorph(_) => {
                    out.morph = Some(MorphAction::Spinodal {
                        delta: self.params.saturation_increment * 0.5 * sign,
                    });
                }
                AdaptationStrategy::ShellMorph(_) => {
                    out.morph = Some(MorphAction::Shell {
                        radius: self.shell_radius,
                    });
                }
                _ => {}
            }
        }
        self.acceleration_counter += self.interval();
    }

    /// Adjust the shell radius after a shell morph changed the A volume by
    /// `delta_volume`, given the volumes before the edit.
    pub fn morph_feedback(&mut self, delta_volume: f64, volume_a: f64, volume_b: f64) {
        if self.injection != InjectionKind::Imbibition || delta_volume == 0.0 {
            return;
        }
        let delta_target = volume_b - (volume_a + volume_b) * self.target_saturation;
        let ratio = (delta_target - delta_volume) / delta_volume;
        if ratio > 0.0 {
            self.shell_radius = (self.shell_radius * 1.01 * ratio.min(3.0)).max(-1.0);
            if self.verbose {
                info!(radius = self.shell_radius, "shell radius adjusted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::params::MorphSchedule;
    use approx::assert_relative_eq;

    fn diag(timestep: usize, ca: f64, saturation: f64) -> Diagnostics {
        Diagnostics {
            timestep,
            capillary_number: ca,
            saturation,
            volume_a: 1000.0 * (1.0 - saturation),
            volume_b: 1000.0 * saturation,
            settling: 1.0,
            ..Default::default()
        }
    }

    fn actuators(force: f64) -> Actuators {
        Actuators {
            force: [0.0, 0.0, force],
            ..Default::default()
        }
    }

    #[test]
    fn test_ramping_blocks_feedback() {
        let params = ControlParams::default()
            .with_target_ca(1e-5)
            .with_ramp_timesteps(100)
            .with_analysis_interval(10);
        let mut act = actuators(1e-5);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        let out = control.analyze(&diag(50, 1e-4, 0.5), &mut act);
        assert_eq!(out, ControlOutcome::default());
        assert_eq!(control.phase(), ControlPhase::Ramping);
        assert_eq!(act.force[2], 1e-5);

        let out = control.analyze(&diag(100, 1e-4, 0.5), &mut act);
        assert_eq!(control.phase(), ControlPhase::Stabilizing);
        assert_relative_eq!(out.rescaled.unwrap(), 0.1);
        assert_relative_eq!(act.force[2], 1e-6);
    }

    #[test]
    fn test_rescale_clamps_force() {
        let params = ControlParams::default()
            .with_target_ca(1e-3)
            .with_ramp_timesteps(0)
            .with_analysis_interval(10);
        let mut act = actuators(5e-4);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        control.analyze(&diag(10, 1e-4, 0.5), &mut act);
        assert_relative_eq!(act.force[2], 1e-3);

        let mut act = actuators(2e-6);
        let params = control.params().clone().with_target_ca(1e-6);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        control.analyze(&diag(10, 1e-4, 0.5), &mut act);
        assert_relative_eq!(act.force[2], 1e-6);
    }

    #[test]
    fn test_morph_cycle() {
        let schedule = MorphSchedule {
            injection: InjectionKind::Drainage,
            initial_saturation: None,
            final_saturation: Some(0.8),
        };
        let params = ControlParams::default()
            .with_strategy(AdaptationStrategy::SpinodalMorph(schedule))
            .with_ramp_timesteps(0)
            .with_analysis_interval(100)
            .with_rates(100, 100);
        let mut act = actuators(1e-5);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);

        control.analyze(&diag(100, 2e-5, 0.95), &mut act);
        assert_eq!(control.stability_counter(), 100);
        // first check has no previous Ca to compare against
        let out = control.analyze(&diag(200, 2e-5, 0.95), &mut act);
        assert!(out.sample.is_none());
        let out = control.analyze(&diag(300, 2e-5, 0.95), &mut act);
        assert!(out.sample.is_some());
        assert_eq!(control.phase(), ControlPhase::Adapting);
        assert_relative_eq!(control.target_saturation(), 0.9);
        assert_eq!(out.morph, Some(MorphAction::Spinodal { delta: -0.025 }));

        // not there yet: wait one acceleration period, then morph again
        let out = control.analyze(&diag(400, 2e-5, 0.93), &mut act);
        assert!(out.morph.is_some());
        let out = control.analyze(&diag(500, 2e-5, 0.89), &mut act);
        assert!(out.morph.is_none());
        assert_eq!(control.phase(), ControlPhase::Stabilizing);
    }

    #[test]
    fn test_schedule_exhaustion() {
        let schedule = MorphSchedule {
            injection: InjectionKind::Drainage,
            initial_saturation: None,
            final_saturation: Some(0.5),
        };
        let params = ControlParams::default()
            .with_strategy(AdaptationStrategy::ShellMorph(schedule))
            .with_ramp_timesteps(0)
            .with_analysis_interval(100)
            .with_rates(100, 100);
        let mut act = actuators(1e-5);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        control.analyze(&diag(100, 1e-5, 0.52), &mut act);
        control.analyze(&diag(200, 1e-5, 0.52), &mut act);
        let out = control.analyze(&diag(250, 1e-5, 0.52), &mut act);
        assert!(out.sample.is_some());
        assert!(control.is_done());
        let out = control.analyze(&diag(300, 1e-5, 0.52), &mut act);
        assert_eq!(out, ControlOutcome::default());
    }

    #[test]
    fn test_unsteady_restarts_counter() {
        let params = ControlParams::default()
            .with_strategy(AdaptationStrategy::FluxMorph(MorphSchedule::default()))
            .with_ramp_timesteps(0)
            .with_analysis_interval(100)
            .with_rates(100, 100);
        let mut act = actuators(1e-5);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        control.analyze(&diag(100, 1e-5, 0.5), &mut act);
        let out = control.analyze(&diag(200, 2e-5, 0.5), &mut act);
        assert!(out.sample.is_none());
        assert_eq!(control.stability_counter(), 100);
        assert_relative_eq!(control.ca_previous(), 2e-5);
    }

    #[test]
    fn test_flux_morph_and_priming() {
        let schedule = MorphSchedule {
            injection: InjectionKind::Drainage,
            initial_saturation: Some(0.7),
            final_saturation: None,
        };
        let params = ControlParams::default()
            .with_strategy(AdaptationStrategy::FluxMorph(schedule))
            .with_ramp_timesteps(0)
            .with_analysis_interval(100)
            .with_rates(100, 1000);
        let mut act = actuators(0.0);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        control.analyze(&diag(100, 1e-5, 1.0), &mut act);
        assert!(control.is_priming());
        assert_eq!(act.setpoints.mode, BoundaryMode::Flux);
        assert_relative_eq!(act.setpoints.flux, 0.01 * 1000.0 / 1000.0);
        assert_eq!(act.color.inlet_a, 1.0);

        control.analyze(&diag(200, 1e-5, 0.69), &mut act);
        assert!(!control.is_priming());
        assert_eq!(control.phase(), ControlPhase::Stabilizing);
        assert_eq!(act.setpoints.mode, BoundaryMode::Periodic);
        assert_eq!(act.setpoints.flux, 0.0);
    }

    #[test]
    fn test_flux_reversal_once() {
        let params = ControlParams {
            flux_reversal_threshold: Some(0.3),
            ..ControlParams::default()
        }
        .with_strategy(AdaptationStrategy::FluxReversal {
            reversal: ReversalKind::FlowDirection,
        })
        .with_ramp_timesteps(0);
        let mut act = actuators(1e-5);
        act.setpoints.flux = 2.0;
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        let out = control.analyze(&diag(10, 1e-5, 0.5), &mut act);
        assert!(!out.reversed);
        let out = control.analyze(&diag(20, 1e-5, 0.2), &mut act);
        assert!(out.reversed);
        assert_eq!(act.force[2], -1e-5);
        assert_eq!(act.setpoints.flux, -2.0);
        let out = control.analyze(&diag(30, 1e-5, 0.1), &mut act);
        assert!(!out.reversed);
        assert_eq!(act.force[2], -1e-5);
    }

    #[test]
    fn test_phase_swap() {
        let params = ControlParams {
            settling_tolerance: 1e-3,
            ..ControlParams::default()
        }
        .with_strategy(AdaptationStrategy::FluxReversal {
            reversal: ReversalKind::PhaseSwap,
        })
        .with_ramp_timesteps(0);
        let mut act = actuators(0.0);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        let mut d = diag(10, 1e-5, 0.5);
        d.settling = 1e-4;
        assert!(control.analyze(&d, &mut act).reversed);
        assert_eq!(act.color.inlet_a, 0.0);
        assert_eq!(act.color.inlet_b, 1.0);
        assert_eq!(act.color.outlet_a, 1.0);
        assert_eq!(act.color.outlet_b, 0.0);
    }

    #[test]
    fn test_coinjection_shifts_inlet() {
        let params = ControlParams::default()
            .with_target_ca(1e-5)
            .with_strategy(AdaptationStrategy::Coinjection {
                injection: InjectionKind::Imbibition,
            })
            .with_ramp_timesteps(0)
            .with_analysis_interval(100)
            .with_rates(100, 100);
        let mut act = actuators(1e-5);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        let out = control.analyze(&diag(100, 3e-5, 0.5), &mut act);
        // no capillary targeting under coinjection
        assert!(out.rescaled.is_none());
        control.analyze(&diag(200, 3e-5, 0.5), &mut act);
        assert_eq!(act.color.inlet_a, 1.0);
        control.analyze(&diag(300, 3e-5, 0.5), &mut act);
        assert_relative_eq!(act.color.inlet_a, 0.95);
        assert_relative_eq!(act.color.inlet_b, 0.05);
    }

    #[test]
    fn test_shell_radius_feedback() {
        let schedule = MorphSchedule {
            injection: InjectionKind::Imbibition,
            ..MorphSchedule::default()
        };
        let params = ControlParams::default()
            .with_strategy(AdaptationStrategy::ShellMorph(schedule))
            .with_ramp_timesteps(0)
            .with_analysis_interval(100)
            .with_rates(100, 100);
        let mut act = actuators(1e-5);
        let mut control = ControlLoop::new(params, &act).with_verbose(false);
        control.analyze(&diag(100, 1e-5, 0.3), &mut act);
        control.analyze(&diag(200, 1e-5, 0.3), &mut act);
        let out = control.analyze(&diag(300, 1e-5, 0.3), &mut act);
        assert_eq!(out.morph, Some(MorphAction::Shell { radius: -0.1 }));
        assert_relative_eq!(control.target_saturation(), 0.35);
        // the morph only moved 10 sites while 50 were wanted
        control.morph_feedback(-10.0, 700.0, 300.0);
        assert!(control.shell_radius() < -0.1);
        assert!(control.shell_radius() >= -1.0);
    }
}
