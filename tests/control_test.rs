//! Control-loop behaviour against synthetic plants.
//!
//! The loop only sees reduced diagnostics, so a closed-form response of
//! capillary number and saturation to the actuators is enough to exercise
//! its feedback paths over many analyses.

use approx::assert_relative_eq;
use porous_lbm::boundary::BoundaryMode;
use porous_lbm::control::{
    Actuators, AdaptationStrategy, ControlLoop, ControlParams, ControlPhase, Diagnostics, InjectionKind,
};
use porous_lbm::control::params::MorphSchedule;
use porous_lbm::io::SteadyStateLog;

const INTERVAL: usize = 100;

/// Capillary number responding to the force as `k·|F|^p`.
fn plant(act: &Actuators, k: f64, p: f64) -> f64 {
    let f = act.force.iter().map(|f| f * f).sum::<f64>().sqrt();
    k * f.powf(p)
}

fn diagnostics(timestep: usize, ca: f64, saturation: f64) -> Diagnostics {
    Diagnostics {
        timestep,
        capillary_number: ca,
        saturation,
        volume_a: 1000.0 * (1.0 - saturation),
        volume_b: 1000.0 * saturation,
        ..Default::default()
    }
}

fn params() -> ControlParams {
    ControlParams::default()
        .with_analysis_interval(INTERVAL)
        .with_ramp_timesteps(1_000)
        .with_rates(2_000, 500)
}

#[test]
fn test_capillary_target_converges_on_nonlinear_plant() {
    let target = 2e-5;
    let params = params().with_target_ca(target);
    let mut act = Actuators {
        force: [0.0, 0.0, 3e-6],
        ..Default::default()
    };
    let mut control = ControlLoop::new(params, &act).with_verbose(false);

    let mut ca = 0.0;
    for step in 1..=60 {
        ca = plant(&act, 40.0, 1.2);
        control.analyze(&diagnostics(step * INTERVAL, ca, 0.5), &mut act);
    }
    assert_eq!(control.phase(), ControlPhase::Stabilizing);
    assert_relative_eq!(ca, target, max_relative = 1e-6);
    assert!(act.force[2] > 0.0);
    assert_eq!(act.force[0], 0.0);
}

#[test]
fn test_capillary_target_respects_ceiling() {
    // unreachable target: force pins at the ceiling
    let params = params().with_target_ca(1.0).with_force_limits(1e-6, 1e-4);
    let mut act = Actuators {
        force: [0.0, 0.0, 1e-5],
        ..Default::default()
    };
    let mut control = ControlLoop::new(params, &act).with_verbose(false);
    for step in 1..=30 {
        let ca = plant(&act, 1.0, 1.0);
        control.analyze(&diagnostics(step * INTERVAL, ca, 0.5), &mut act);
    }
    assert_relative_eq!(act.force[2], 1e-4, max_relative = 1e-12);
}

#[test]
fn test_shell_schedule_walks_saturation_down() {
    let params = params().with_strategy(AdaptationStrategy::ShellMorph(MorphSchedule {
        injection: InjectionKind::Drainage,
        initial_saturation: None,
        final_saturation: Some(0.7),
    }));
    let mut act = Actuators {
        force: [0.0, 0.0, 1e-5],
        ..Default::default()
    };
    let mut control = ControlLoop::new(params, &act).with_verbose(false);
    let dir = tempfile::tempdir().unwrap();
    let log = SteadyStateLog::new(dir.path());

    // every shell morph removes 2% of the wetting phase
    let mut saturation: f64 = 0.9;
    let mut samples = Vec::new();
    let mut morphs = 0;
    let mut t = 0;
    while !control.is_done() && t < 2_000 * INTERVAL {
        t += INTERVAL;
        let out = control.analyze(&diagnostics(t, 1e-5, saturation), &mut act);
        if let Some(sample) = out.sample {
            log.append(&sample).unwrap();
            samples.push(sample.saturation);
        }
        if out.morph.is_some() {
            morphs += 1;
            saturation -= 0.02;
        }
    }
    assert!(control.is_done());
    assert!(morphs > 0);
    assert!(samples.len() >= 3);
    assert!(samples.windows(2).all(|w| w[1] < w[0]));
    assert!(saturation > 0.6);

    let text = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(text.lines().count(), samples.len() + 1);
}

#[test]
fn test_priming_injects_until_initial_saturation() {
    let params = params().with_strategy(AdaptationStrategy::FluxMorph(MorphSchedule {
        injection: InjectionKind::Drainage,
        initial_saturation: Some(0.6),
        final_saturation: None,
    }));
    let mut act = Actuators::default();
    let mut control = ControlLoop::new(params, &act).with_verbose(false);

    let mut saturation = 0.95;
    let mut t = 0;
    let mut primed = false;
    while t < 100 * INTERVAL {
        t += INTERVAL;
        control.analyze(&diagnostics(t, 1e-5, saturation), &mut act);
        if control.is_priming() {
            primed = true;
            assert_eq!(act.setpoints.mode, BoundaryMode::Flux);
            assert!(act.setpoints.flux > 0.0);
            assert_eq!(act.color.inlet_a, 1.0);
            saturation -= 0.05;
        } else if primed {
            break;
        }
    }
    assert!(primed);
    assert!(saturation <= 0.6 + 1e-12);
    assert_eq!(control.phase(), ControlPhase::Stabilizing);
    assert_eq!(act.setpoints.mode, BoundaryMode::Periodic);
}
