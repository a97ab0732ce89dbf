//! Numerical health of the lattice state.
//!
//! Every analysis interval the densities and velocities of the simulated
//! sites are scanned. A density that is not positive, or a velocity that is
//! not finite, is fatal and comes back as a [`DivergenceError`]. A speed
//! over the lattice limit only raises a [`StabilityWarning`]; a long enough
//! streak of warned scans asks the run to stop.
//!
//! ```ignore
//! let mut monitor = StabilityMonitor::new(StabilityThresholds::default());
//! monitor.check(t, layout.sites(), |n| rho[n], &velocity)?;
//! let unstable = monitor.should_stop();
//! ```

use std::fmt;

use tracing::{debug, warn};

use crate::error::DivergenceError;

/// Limits applied by [`StabilityMonitor`], in lattice units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityThresholds {
    /// Densities under this floor are warned about (they are still positive).
    pub min_density: f64,
    /// Speed at which the low-Mach equilibrium stops being trustworthy.
    pub max_velocity: f64,
    /// Length of the warning streak that stops the run.
    pub max_consecutive_warnings: usize,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            min_density: 0.0,
            max_velocity: 0.3,
            max_consecutive_warnings: 10,
        }
    }
}

impl StabilityThresholds {
    /// Floor 1e-3, speed limit 0.1, stop after three warned scans.
    pub fn strict() -> Self {
        Self {
            min_density: 1e-3,
            max_velocity: 0.1,
            max_consecutive_warnings: 3,
        }
    }

    pub fn with_min_density(self, min_density: f64) -> Self {
        Self { min_density, ..self }
    }

    pub fn with_max_velocity(self, max_velocity: f64) -> Self {
        Self { max_velocity, ..self }
    }

    pub fn with_max_consecutive_warnings(self, max_consecutive_warnings: usize) -> Self {
        Self {
            max_consecutive_warnings,
            ..self
        }
    }
}

/// A site that is alive but outside the comfortable range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilityWarning {
    DensityBelowMin { site: usize, value: f64, threshold: f64 },
    VelocityExceedsMax { site: usize, value: f64, threshold: f64 },
}

impl fmt::Display for StabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DensityBelowMin { site, value, threshold } => {
                write!(f, "site {site}: rho {value:.3e} under floor {threshold:.3e}")
            }
            Self::VelocityExceedsMax { site, value, threshold } => {
                write!(f, "site {site}: |u| {value:.3} over limit {threshold:.3}")
            }
        }
    }
}

/// Outcome of one scan over a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityStatus {
    pub timestep: usize,
    /// `(min, max)` density over the scanned sites.
    pub density_range: (f64, f64),
    pub max_velocity: f64,
    pub warnings: Vec<StabilityWarning>,
}

impl StabilityStatus {
    pub fn is_stable(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Per-partition health tracker, kept across analysis intervals.
#[derive(Debug, Clone)]
pub struct StabilityMonitor {
    limits: StabilityThresholds,
    streak: usize,
    scans: usize,
    latest: Option<StabilityStatus>,
}

impl StabilityMonitor {
    pub fn new(limits: StabilityThresholds) -> Self {
        Self {
            limits,
            streak: 0,
            scans: 0,
            latest: None,
        }
    }

    pub fn thresholds(&self) -> &StabilityThresholds {
        &self.limits
    }

    /// Scans in a row that raised at least one warning.
    pub fn consecutive_warnings(&self) -> usize {
        self.streak
    }

    pub fn total_checks(&self) -> usize {
        self.scans
    }

    pub fn last_status(&self) -> Option<&StabilityStatus> {
        self.latest.as_ref()
    }

    /// Scan `sites`. `velocity` holds three component blocks of equal length.
    pub fn check(
        &mut self,
        timestep: usize,
        sites: impl Iterator<Item = usize>,
        density: impl Fn(usize) -> f64,
        velocity: &[f64],
    ) -> Result<StabilityStatus, DivergenceError> {
        self.scans += 1;
        let np = velocity.len() / 3;
        let limits = self.limits;
        let mut found = Vec::new();
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut fastest = 0.0_f64;

        for site in sites {
            let rho = density(site);
            if rho.is_nan() || rho <= 0.0 {
                return Err(DivergenceError::NonPositiveDensity {
                    timestep,
                    site,
                    value: rho,
                });
            }
            let u = [velocity[site], velocity[np + site], velocity[2 * np + site]];
            if !u.iter().all(|c| c.is_finite()) {
                return Err(DivergenceError::NonFiniteVelocity { timestep, site });
            }
            lo = lo.min(rho);
            hi = hi.max(rho);
            if rho < limits.min_density {
                found.push(StabilityWarning::DensityBelowMin {
                    site,
                    value: rho,
                    threshold: limits.min_density,
                });
            }

            let speed = u.iter().map(|c| c * c).sum::<f64>().sqrt();
            fastest = fastest.max(speed);
            if speed > limits.max_velocity {
                found.push(StabilityWarning::VelocityExceedsMax {
                    site,
                    value: speed,
                    threshold: limits.max_velocity,
                });
            }
        }

        match found.first() {
            None => self.streak = 0,
            Some(first) => {
                self.streak += 1;
                warn!(timestep, count = found.len(), streak = self.streak, %first, "lattice state outside limits");
            }
        }
        debug!(timestep, rho_min = lo, rho_max = hi, u_max = fastest, "stability scan");

        let status = StabilityStatus {
            timestep,
            density_range: (lo, hi),
            max_velocity: fastest,
            warnings: found,
        };
        self.latest = Some(status.clone());
        Ok(status)
    }

    /// True once the warning streak reaches the configured length.
    pub fn should_stop(&self) -> bool {
        self.streak >= self.limits.max_consecutive_warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Component-major velocity field with the same vector on all `np` sites.
    fn uniform(np: usize, u: [f64; 3]) -> Vec<f64> {
        u.iter().flat_map(|&c| std::iter::repeat(c).take(np)).collect()
    }

    #[test]
    fn test_quiet_field_passes() {
        let mut monitor = StabilityMonitor::new(StabilityThresholds::default());
        let status = monitor.check(10, 0..8, |_| 1.0, &uniform(8, [0.01, 0.0, 0.02])).unwrap();
        assert!(status.is_stable());
        assert_eq!(status.density_range, (1.0, 1.0));
        assert_eq!(monitor.total_checks(), 1);
        assert!(!monitor.should_stop());
    }

    #[test]
    fn test_negative_density_is_fatal() {
        let mut monitor = StabilityMonitor::new(StabilityThresholds::default());
        let rho = |n: usize| if n == 2 { -0.5 } else { 1.0 };
        let err = monitor.check(7, 0..4, rho, &uniform(4, [0.0; 3])).unwrap_err();
        assert_eq!(
            err,
            DivergenceError::NonPositiveDensity {
                timestep: 7,
                site: 2,
                value: -0.5
            }
        );
    }

    #[test]
    fn test_nan_is_fatal() {
        let mut monitor = StabilityMonitor::new(StabilityThresholds::default());
        let mut u = uniform(4, [0.0; 3]);
        u[4 + 1] = f64::NAN;
        let err = monitor.check(3, 0..4, |_| 1.0, &u).unwrap_err();
        assert!(matches!(err, DivergenceError::NonFiniteVelocity { site: 1, .. }));
        let err = monitor.check(3, 0..4, |_| f64::NAN, &u).unwrap_err();
        assert!(matches!(err, DivergenceError::NonPositiveDensity { .. }));
    }

    #[test]
    fn test_warning_streak_stops_and_resets() {
        let mut monitor = StabilityMonitor::new(StabilityThresholds::strict());
        let fast = uniform(4, [0.2, 0.0, 0.0]);
        for _ in 0..2 {
            assert!(!monitor.check(1, 0..4, |_| 1.0, &fast).unwrap().is_stable());
        }
        assert!(!monitor.should_stop());
        monitor.check(1, 0..4, |_| 1.0, &fast).unwrap();
        assert!(monitor.should_stop());
        monitor.check(1, 0..4, |_| 1.0, &uniform(4, [0.0; 3])).unwrap();
        assert_eq!(monitor.consecutive_warnings(), 0);
    }
}
