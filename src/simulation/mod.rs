//! Per-partition drivers and the in-process launcher.
//!
//! Each rank thread builds its own driver from the shared [`RunConfig`]
//! and its [`Subdomain`], then advances half-steps until the timestep
//! budget is spent or the control loop ends the run:
//!
//! ```ignore
//! use porous_lbm::{Cluster, RunConfig};
//!
//! let config = RunConfig::from_json_file("run.json".as_ref())?;
//! let summaries = Cluster::new(config)?.run()?;
//! println!("stopped after {} half-steps", summaries[0].timesteps);
//! ```
//!
//! [`RunConfig`]: crate::config::RunConfig
//! [`Subdomain`]: crate::domain::Subdomain

mod cluster;
mod color;
mod flow;

pub use cluster::Cluster;
pub use color::ColorSimulation;
pub use flow::{FlowDiagnostics, FlowSimulation};

use tracing::{info, warn};

use crate::analysis::stability::StabilityMonitor;
use crate::comm::{Endpoint, ReduceOp};
use crate::domain::decomposition::Subdomain;
use crate::domain::labels::ComponentTable;
use crate::domain::layout::{DomainIndexBuilder, Layout};
use crate::error::{CheckpointError, ConfigError, DivergenceError, LbmError};
use crate::io::CheckpointStore;
use crate::kernel::addressing::{AaAddressing, Parity};
use crate::lattice::d3q19::{Q, W};

// =============================================================================
// Run Summary
// =============================================================================

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// `timestep_max` reached.
    TimestepLimit,
    /// The control loop exhausted its saturation schedule.
    ScheduleDone,
    /// The tracked transport coefficient converged.
    Converged,
    /// Too many consecutive stability warnings.
    Unstable,
}

/// Outcome of one rank's run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub rank: usize,
    /// Half-steps completed, counted from zero even after a restart.
    pub timesteps: usize,
    pub stop: StopReason,
    /// Steady-state samples recorded during the run.
    pub samples: usize,
    /// Total wall-clock time in seconds.
    pub wall_time: f64,
}

impl RunSummary {
    pub fn new(rank: usize, timesteps: usize, stop: StopReason, samples: usize, wall_time: f64) -> Self {
        Self {
            rank,
            timesteps,
            stop,
            samples,
            wall_time,
        }
    }

    /// Million lattice updates per second for `sites` simulated sites.
    pub fn mlups(&self, sites: usize, steps: usize) -> f64 {
        if self.wall_time > 0.0 {
            sites as f64 * steps as f64 / self.wall_time / 1e6
        } else {
            0.0
        }
    }
}

// =============================================================================
// Shared setup
// =============================================================================

/// Compact one partition and log its shape (collective). A partition that
/// cannot be compacted fails every rank.
pub(crate) fn build_layout(
    sub: &Subdomain,
    components: &ComponentTable,
    ep: &mut Endpoint,
) -> Result<Layout, LbmError> {
    let built = DomainIndexBuilder::for_subdomain(sub, components)
        .with_rank(sub.rank())
        .build();
    let flag = if built.is_err() { sub.rank() as f64 } else { f64::INFINITY };
    let failed = ep.min(flag)?;
    let layout = built?;
    if failed.is_finite() {
        return Err(ConfigError::PartitionFailed { rank: failed as usize }.into());
    }
    info!(
        rank = sub.rank(),
        coords = ?sub.coords(),
        owned = %sub.owned(),
        np = layout.np(),
        exterior = layout.exterior().len(),
        interior = layout.interior().len(),
        "partition ready"
    );
    Ok(layout)
}

/// Populations at rest with density `rho`, laid out as the post-collision
/// state of the half-step before one of `parity`.
pub(crate) fn rest_populations(layout: &Layout, parity: Parity, rho: f64) -> Vec<f64> {
    let aa = AaAddressing::new(layout);
    let previous = parity.flip();
    let mut dist = vec![0.0; Q * layout.np()];
    for n in layout.sites() {
        for q in 0..Q {
            dist[aa.write_slot(previous, n, q)] = W[q] * rho;
        }
    }
    dist
}

/// Zeroth moment of the populations a site reads next.
#[inline]
pub(crate) fn site_density(aa: &AaAddressing<'_>, parity: Parity, dist: &[f64], n: usize) -> f64 {
    (0..Q).map(|q| dist[aa.read_slot(parity, n, q)]).sum()
}

/// Run the stability check on every rank and fail together. Returns
/// whether any rank has seen too many consecutive warnings.
pub(crate) fn check_health(
    ep: &mut Endpoint,
    monitor: &mut StabilityMonitor,
    timestep: usize,
    layout: &Layout,
    dist: &[f64],
    velocity: &[f64],
) -> Result<bool, LbmError> {
    let aa = AaAddressing::new(layout);
    let parity = Parity::of(timestep + 1);
    let local = monitor.check(timestep, layout.sites(), |n| site_density(&aa, parity, dist, n), velocity);
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let flags = ep.all_reduce(&[flag(local.is_err()), flag(monitor.should_stop())], ReduceOp::Max)?;
    if let Err(e) = local {
        return Err(e.into());
    }
    if flags[0] > 0.0 {
        return Err(DivergenceError::Reported { timestep }.into());
    }
    Ok(flags[1] > 0.0)
}

/// Resume timestep from a checkpoint every rank can read, or `None` for a
/// fresh start (collective).
pub(crate) fn restart_timestep(
    ep: &mut Endpoint,
    store: &CheckpointStore,
    present: bool,
) -> Result<Option<usize>, LbmError> {
    let everyone = ep.min(if present { 1.0 } else { 0.0 })?;
    let local = if ep.is_root() && everyone > 0.0 {
        store.read_timestep()
    } else {
        Ok(None)
    };
    // -1: fresh start, -2: unreadable timestep file
    let code = match &local {
        Ok(Some(t)) => *t as f64,
        Ok(None) => -1.0,
        Err(_) => -2.0,
    };
    let shared = ep.broadcast(&[code])?[0];
    if let Err(e) = local {
        return Err(e.into());
    }
    if shared == -2.0 {
        return Err(CheckpointError::Timestep("unreadable on rank 0".into()).into());
    }
    if shared < 0.0 {
        if ep.is_root() {
            warn!(dir = %store.dir().display(), "restart files missing, starting fresh");
        }
        return Ok(None);
    }
    Ok(Some(shared as usize))
}

/// Effective checkpoint interval: positive and even.
pub(crate) fn checkpoint_every(interval: Option<usize>) -> Option<usize> {
    interval.filter(|&i| i > 0).map(|i| i + i % 2)
}
