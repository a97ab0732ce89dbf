//! Benchmarks for the lattice update kernels.
//!
//! Run with: `cargo bench --bench kernel_bench`
//!
//! Throughput is reported in site updates, so MLUPS can be read off the
//! elements/s column.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use porous_lbm::comm::{Communicator, Endpoint};
use porous_lbm::config::{Geometry, ModelKind, RunConfig};
use porous_lbm::domain::{ComponentTable, DomainIndexBuilder, LabelGrid, ProcessGrid, Subdomain, COMPONENT_A, SOLID};
use porous_lbm::kernel::{flow_update, AaAddressing, CollisionModel, FlowParams, Parity};
use porous_lbm::lattice::d3q19::{Q, W};
use porous_lbm::simulation::{ColorSimulation, FlowSimulation};
use porous_lbm::types::Extent3;

/// Sphere pack with roughly 60% porosity.
fn pack(n: usize) -> LabelGrid {
    LabelGrid::from_fn(Extent3::new(n, n, n), |i, j, k| {
        let c = |x: usize| (x % 8) as f64 - 3.5;
        if c(i) * c(i) + c(j) * c(j) + c(k) * c(k) < 9.0 {
            SOLID
        } else {
            COMPONENT_A
        }
    })
}

/// Raw kernel sweep over a compacted layout for both collision models.
fn bench_flow_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow_kernel");
    for n in [16usize, 32] {
        let labels = pack(n);
        let sub = Subdomain::extract(&labels, ProcessGrid::serial(), 0).unwrap();
        let layout = DomainIndexBuilder::for_subdomain(&sub, &ComponentTable::empty())
            .build()
            .unwrap();
        let np = layout.np();
        let aa = AaAddressing::new(&layout);
        group.throughput(Throughput::Elements(layout.site_count() as u64));

        for model in [CollisionModel::Bgk, CollisionModel::Mrt] {
            let mut dist = vec![0.0; Q * np];
            for site in layout.sites() {
                for q in 0..Q {
                    dist[q * np + site] = W[q];
                }
            }
            let mut velocity = vec![0.0; 3 * np];
            let params = FlowParams {
                model,
                tau: 0.8,
                force: [0.0, 0.0, 1e-5],
            };
            let mut parity = Parity::Odd;
            group.bench_with_input(BenchmarkId::new(format!("{:?}", model), n), &n, |b, _| {
                b.iter(|| {
                    flow_update(&aa, parity, &mut dist, &mut velocity, &params, layout.exterior());
                    flow_update(&aa, parity, &mut dist, &mut velocity, &params, layout.interior());
                    parity = parity.flip();
                    black_box(velocity[0])
                });
            });
        }
    }
    group.finish();
}

/// Full half-steps of both drivers, exchange and barrier included.
fn bench_half_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("half_step");
    let n = 24;
    let base = RunConfig::default()
        .with_size([n, n, n])
        .with_geometry(Geometry::Open { label: COMPONENT_A });
    group.throughput(Throughput::Elements((n * n * n) as u64));

    let config = base.clone().with_model(ModelKind::Flow);
    let sub = Subdomain::extract(&config.load_labels().unwrap(), ProcessGrid::serial(), 0).unwrap();
    let mut ep = Endpoint::solo();
    let mut flow = FlowSimulation::new(&config, sub, &mut ep).unwrap();
    group.bench_function("flow", |b| b.iter(|| flow.half_step(&mut ep).unwrap()));

    let dir = std::env::temp_dir();
    let mut config = base.with_model(ModelKind::Color);
    config.run.output_dir = dir.clone();
    config.run.restart_dir = dir;
    let sub = Subdomain::extract(&config.load_labels().unwrap(), ProcessGrid::serial(), 0).unwrap();
    let mut ep = Endpoint::solo();
    let mut color = ColorSimulation::new(&config, sub, &mut ep).unwrap();
    group.bench_function("color", |b| b.iter(|| color.half_step(&mut ep).unwrap()));
    group.finish();
}

/// Periodic φ halo refresh of one partition.
fn bench_halo_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("halo_exchange");
    for n in [16usize, 32] {
        let labels = pack(n);
        let sub = Subdomain::extract(&labels, ProcessGrid::serial(), 0).unwrap();
        let components = ComponentTable::empty();
        let layout = DomainIndexBuilder::for_subdomain(&sub, &components).build().unwrap();
        let comm = Communicator::new(&sub, &layout, &components);
        let mut ep = Endpoint::solo();
        let mut field = vec![1.0; sub.halo_extent().len()];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| comm.exchange_halo(&mut ep, black_box(&mut field)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_flow_kernel, bench_half_step, bench_halo_exchange);
criterion_main!(benches);
