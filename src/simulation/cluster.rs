//! In-process SPMD launcher: one scoped thread per partition.

use std::thread;

use tracing::info;

use crate::comm::{Endpoint, World};
use crate::config::{ModelKind, RunConfig};
use crate::domain::decomposition::Subdomain;
use crate::domain::labels::LabelGrid;
use crate::error::{ConfigError, LbmError};
use crate::simulation::{ColorSimulation, FlowSimulation, RunSummary};

/// A validated run: configuration plus the global label grid.
#[derive(Clone, Debug)]
pub struct Cluster {
    config: RunConfig,
    labels: LabelGrid,
}

impl Cluster {
    /// Validate the configuration and load its geometry.
    pub fn new(config: RunConfig) -> Result<Self, LbmError> {
        config.validate()?;
        let labels = config.load_labels()?;
        Self::with_labels(config, labels)
    }

    /// Validate the configuration against an in-memory label grid.
    pub fn with_labels(config: RunConfig, labels: LabelGrid) -> Result<Self, LbmError> {
        config.validate()?;
        if labels.extent() != config.extent() {
            return Err(ConfigError::LabelCount {
                expected: config.extent().len(),
                actual: labels.extent().len(),
            }
            .into());
        }
        Ok(Self { config, labels })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelGrid {
        &self.labels
    }

    /// Run `body` on every partition in its own thread and collect the
    /// results in rank order.
    pub fn launch<T, F>(&self, body: F) -> Result<Vec<T>, LbmError>
    where
        T: Send,
        F: Fn(&RunConfig, Subdomain, &mut Endpoint) -> Result<T, LbmError> + Sync,
    {
        let grid = self.config.process_grid()?;
        let subdomains = Subdomain::decompose(&self.labels, grid)?;
        let endpoints = World::create(grid.size());
        info!(ranks = grid.size(), nproc = ?grid.nproc(), "launching partitions");

        let body = &body;
        let config = &self.config;
        let results: Vec<Result<T, LbmError>> = thread::scope(|scope| {
            let handles: Vec<_> = subdomains
                .into_iter()
                .zip(endpoints)
                .map(|(sub, mut ep)| scope.spawn(move || body(config, sub, &mut ep)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });
        results.into_iter().collect()
    }

    /// Run the configured model to completion.
    pub fn run(&self) -> Result<Vec<RunSummary>, LbmError> {
        match self.config.model {
            ModelKind::Color => self.launch(|config, sub, ep| ColorSimulation::new(config, sub, ep)?.run(ep)),
            ModelKind::Flow => self.launch(|config, sub, ep| FlowSimulation::new(config, sub, ep)?.run(ep)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::labels::COMPONENT_A;
    use crate::types::Extent3;

    #[test]
    fn test_launch_collects_in_rank_order() {
        let config = RunConfig::default().with_size([4, 4, 8]).with_nproc([1, 1, 2]);
        let cluster = Cluster::new(config).unwrap();
        let ranks = cluster
            .launch(|_, sub, ep| {
                let total = ep.sum(sub.rank() as f64 + 1.0)?;
                Ok((sub.rank(), total))
            })
            .unwrap();
        assert_eq!(ranks, vec![(0, 3.0), (1, 3.0)]);
    }

    #[test]
    fn test_label_extent_checked() {
        let config = RunConfig::default().with_size([4, 4, 4]);
        let labels = LabelGrid::filled(Extent3::new(4, 4, 5), COMPONENT_A);
        assert!(Cluster::with_labels(config, labels).is_err());
    }
}
