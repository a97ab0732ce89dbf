//! End-to-end tests of the single-phase model.
//!
//! Covers the rest state, mass conservation, agreement of the AA scheme
//! with a plain two-lattice update, decomposition independence, restart
//! and the open boundary modes.

use approx::assert_relative_eq;
use porous_lbm::boundary::BoundaryMode;
use porous_lbm::config::{BoundaryConfig, Geometry, ModelKind, RunConfig};
use porous_lbm::control::ControlParams;
use porous_lbm::kernel::collision::{collide, CollisionModel};
use porous_lbm::lattice::d3q19::{E, OPP, Q, W};
use porous_lbm::simulation::{Cluster, FlowSimulation, StopReason};
use porous_lbm::types::{Extent3, GridIndex};

const TOL: f64 = 1e-12;

fn channel(size: [usize; 3], nproc: [usize; 3]) -> RunConfig {
    let mut config = RunConfig::default()
        .with_model(ModelKind::Flow)
        .with_size(size)
        .with_nproc(nproc)
        .with_geometry(Geometry::Channel { label: 1 })
        .with_control(ControlParams::default().with_analysis_interval(50))
        .with_timestep_max(200);
    config.flow.tau = 0.8;
    config.flow.force = [0.0, 0.0, 1e-5];
    config
}

/// Run `steps` half-steps on every partition and return `(global index,
/// density, velocity)` for every simulated site, sorted by global index.
fn run_and_collect(config: &RunConfig, steps: usize) -> Vec<(usize, f64, [f64; 3])> {
    let cluster = Cluster::new(config.clone()).unwrap();
    let parts = cluster
        .launch(|config, sub, ep| {
            let mut sim = FlowSimulation::new(config, sub, ep)?;
            for _ in 0..steps {
                sim.half_step(ep)?;
            }
            let rho = sim.density();
            let u = sim.velocity();
            let layout = sim.layout();
            let np = layout.np();
            let extent = sim.subdomain().halo_extent();
            let out: Vec<_> = layout
                .sites()
                .map(|n| {
                    let (i, j, k) = extent.coords(layout.grid_of(n));
                    let g = sim.subdomain().global_index(i, j, k).get();
                    (g, rho[n], [u[n], u[np + n], u[2 * np + n]])
                })
                .collect();
            Ok(out)
        })
        .unwrap();
    let mut all: Vec<_> = parts.into_iter().flatten().collect();
    all.sort_by_key(|(g, _, _)| *g);
    all
}

/// Plain pull-scheme update on the regular grid with bounce-back on solids.
fn reference(
    extent: Extent3,
    fluid: &[bool],
    model: CollisionModel,
    tau: f64,
    force: [f64; 3],
    steps: usize,
) -> (Vec<f64>, Vec<[f64; 3]>) {
    let len = extent.len();
    let [nx, ny, nz] = extent.as_array();
    let mut f = vec![0.0; Q * len];
    for g in 0..len {
        if fluid[g] {
            for q in 0..Q {
                f[q * len + g] = W[q];
            }
        }
    }
    let mut post = vec![0.0; Q * len];
    let mut u = vec![[0.0; 3]; len];
    for _ in 0..steps {
        for g in (0..len).filter(|&g| fluid[g]) {
            let mut site = [0.0; Q];
            for q in 0..Q {
                site[q] = f[q * len + g];
            }
            let (_, v) = collide(model, &mut site, tau, force);
            u[g] = v;
            for q in 0..Q {
                post[q * len + g] = site[q];
            }
        }
        for g in (0..len).filter(|&g| fluid[g]) {
            let (i, j, k) = extent.coords(GridIndex::new(g));
            for q in 0..Q {
                let ui = (i as i64 - E[q][0] as i64).rem_euclid(nx as i64) as usize;
                let uj = (j as i64 - E[q][1] as i64).rem_euclid(ny as i64) as usize;
                let uk = (k as i64 - E[q][2] as i64).rem_euclid(nz as i64) as usize;
                let m = extent.linear(ui, uj, uk).get();
                f[q * len + g] = if fluid[m] {
                    post[q * len + m]
                } else {
                    post[OPP[q] * len + g]
                };
            }
        }
    }
    let rho = (0..len).map(|g| (0..Q).map(|q| f[q * len + g]).sum()).collect();
    (rho, u)
}

#[test]
fn test_rest_state_is_fixed_point() {
    let mut config = channel([6, 6, 8], [1, 1, 1]);
    config.flow.force = [0.0; 3];
    for (_, rho, u) in run_and_collect(&config, 20) {
        assert_relative_eq!(rho, 1.0, epsilon = TOL);
        for d in 0..3 {
            assert!(u[d].abs() < TOL);
        }
    }
}

#[test]
fn test_periodic_channel_conserves_mass() {
    let config = channel([6, 6, 8], [1, 1, 1]);
    let sites = run_and_collect(&config, 0).len() as f64;
    let mass: f64 = run_and_collect(&config, 101).iter().map(|(_, rho, _)| rho).sum();
    assert_relative_eq!(mass, sites, max_relative = 1e-12);
}

#[test]
fn test_matches_two_lattice_reference() {
    for model in [CollisionModel::Bgk, CollisionModel::Mrt] {
        let mut config = channel([5, 6, 7], [1, 1, 1]);
        config.flow.collision = model;
        let labels = config.load_labels().unwrap();
        let extent = config.extent();
        let fluid: Vec<bool> = labels.as_slice().iter().map(|&l| l > 0).collect();

        for steps in [1, 2, 9, 30] {
            let (rho_ref, u_ref) = reference(extent, &fluid, model, config.flow.tau, config.flow.force, steps);
            let sites = run_and_collect(&config, steps);
            assert_eq!(sites.len(), fluid.iter().filter(|&&f| f).count());
            for (g, rho, u) in sites {
                assert_relative_eq!(rho, rho_ref[g], epsilon = TOL);
                for d in 0..3 {
                    assert_relative_eq!(u[d], u_ref[g][d], epsilon = TOL);
                }
            }
        }
    }
}

#[test]
fn test_decomposition_does_not_change_result() {
    let serial = run_and_collect(&channel([6, 6, 8], [1, 1, 1]), 40);
    for nproc in [[1, 1, 2], [2, 1, 2], [2, 2, 2]] {
        let split = run_and_collect(&channel([6, 6, 8], nproc), 40);
        assert_eq!(serial.len(), split.len());
        for (a, b) in serial.iter().zip(split.iter()) {
            assert_eq!(a.0, b.0);
            assert_relative_eq!(a.1, b.1, epsilon = TOL);
            for d in 0..3 {
                assert_relative_eq!(a.2[d], b.2[d], epsilon = TOL);
            }
        }
    }
}

#[test]
fn test_restart_reproduces_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = channel([6, 6, 8], [1, 1, 2]);
    config.run.restart_dir = dir.path().to_path_buf();
    config.run.output_dir = dir.path().to_path_buf();

    let straight = run_and_collect(&config, 40);

    let mut first = config.clone();
    first.run.checkpoint_interval = Some(20);
    let cluster = Cluster::new(first.with_timestep_max(20)).unwrap();
    let summaries = cluster.run().unwrap();
    assert!(summaries.iter().all(|s| s.timesteps == 20));
    assert!(dir.path().join("Restart.00000").exists());
    assert!(dir.path().join("Restart.00001").exists());
    assert!(dir.path().join("Restart.txt").exists());

    let mut resumed = config.clone();
    resumed.run.restart = true;
    let cluster = Cluster::new(resumed).unwrap();
    let parts = cluster
        .launch(|config, sub, ep| {
            let mut sim = FlowSimulation::new(config, sub, ep)?;
            assert_eq!(sim.timestep(), 20);
            while sim.timestep() < 40 {
                sim.half_step(ep)?;
            }
            let rho = sim.density();
            let layout = sim.layout();
            let extent = sim.subdomain().halo_extent();
            Ok(layout
                .sites()
                .map(|n| {
                    let (i, j, k) = extent.coords(layout.grid_of(n));
                    (sim.subdomain().global_index(i, j, k).get(), rho[n])
                })
                .collect::<Vec<_>>())
        })
        .unwrap();
    let mut resumed: Vec<_> = parts.into_iter().flatten().collect();
    resumed.sort_by_key(|(g, _)| *g);
    for ((ga, rho_a, _), (gb, rho_b)) in straight.iter().zip(resumed.iter()) {
        assert_eq!(ga, gb);
        assert_relative_eq!(*rho_a, *rho_b, epsilon = TOL);
    }
}

#[test]
fn test_restart_without_files_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = channel([6, 6, 8], [1, 1, 1]);
    config.run.restart = true;
    config.run.restart_dir = dir.path().join("missing");
    let cluster = Cluster::new(config).unwrap();
    let steps = cluster
        .launch(|config, sub, ep| Ok(FlowSimulation::new(config, sub, ep)?.timestep()))
        .unwrap();
    assert_eq!(steps, vec![0]);
}

#[test]
fn test_pressure_drop_drives_flow() {
    let mut config = channel([6, 6, 12], [1, 1, 2]);
    config.flow.force = [0.0; 3];
    config.boundary = BoundaryConfig {
        mode: BoundaryMode::Pressure,
        din: 1.003,
        dout: 1.0,
        ..Default::default()
    };
    let cluster = Cluster::new(config).unwrap();
    let out = cluster
        .launch(|config, sub, ep| {
            let mut sim = FlowSimulation::new(config, sub, ep)?;
            let summary = sim.run(ep)?;
            let diag = *sim.diagnostics().expect("analysis ran");
            Ok((summary.stop, diag, sim.inlet_density()))
        })
        .unwrap();
    for (stop, diag, din) in out {
        assert_eq!(stop, StopReason::TimestepLimit);
        assert!(diag.mean_velocity[2] > 0.0);
        assert!(diag.mean_velocity[0].abs() < 1e-9);
        assert!(diag.permeability > 0.0);
        assert_eq!(din, 1.003);
    }
}

#[test]
fn test_flux_inlet_needs_overpressure() {
    let mut config = channel([6, 6, 12], [1, 1, 1]);
    config.flow.force = [0.0; 3];
    config.boundary = BoundaryConfig {
        mode: BoundaryMode::Flux,
        flux: 0.025,
        dout: 1.0,
        ..Default::default()
    };
    let cluster = Cluster::new(config).unwrap();
    let out = cluster
        .launch(|config, sub, ep| {
            let mut sim = FlowSimulation::new(config, sub, ep)?;
            sim.run(ep)?;
            let diag = *sim.diagnostics().expect("analysis ran");
            Ok((diag, sim.inlet_density()))
        })
        .unwrap();
    let (diag, din) = out[0];
    assert!(din > 1.0);
    assert!(diag.mean_velocity[2] > 0.0);
}

#[test]
fn test_scalar_is_conserved_in_periodic_channel() {
    let mut config = channel([6, 6, 8], [1, 1, 2]);
    config.flow.thermal = Some(Default::default());
    let cluster = Cluster::new(config).unwrap();
    let totals = cluster
        .launch(|config, sub, ep| {
            let mut sim = FlowSimulation::new(config, sub, ep)?;
            let before = ep.sum(sim.scalar_total())?;
            for _ in 0..60 {
                sim.half_step(ep)?;
            }
            let after = ep.sum(sim.scalar_total())?;
            let c = sim.concentration().expect("scalar attached");
            let finite = sim.layout().sites().all(|n| c[n].is_finite());
            Ok((before, after, finite))
        })
        .unwrap();
    for (before, after, finite) in totals {
        assert!(finite);
        assert!(before > 0.0);
        assert_relative_eq!(after, before, max_relative = 1e-12);
    }
}

#[test]
fn test_permeability_converges_in_driven_channel() {
    let mut config = channel([6, 6, 4], [1, 1, 1]).with_timestep_max(20_000);
    config.flow.perm_tolerance = 1e-4;
    let summaries = Cluster::new(config).unwrap().run().unwrap();
    assert_eq!(summaries[0].stop, StopReason::Converged);
    assert!(summaries[0].timesteps < 20_000);
}
