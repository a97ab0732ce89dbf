//! Control-loop parameters.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Direction of a saturation schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionKind {
    /// Component A (non-wetting) displaces B; saturation decreases.
    #[default]
    Drainage,
    /// Component B (wetting) displaces A; saturation increases.
    Imbibition,
}

impl InjectionKind {
    /// `-1` for drainage, `+1` for imbibition.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            InjectionKind::Drainage => -1.0,
            InjectionKind::Imbibition => 1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            InjectionKind::Drainage => InjectionKind::Imbibition,
            InjectionKind::Imbibition => InjectionKind::Drainage,
        }
    }
}

/// What a flux reversal flips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalKind {
    /// Swap the injected and displaced components at inlet and outlet.
    #[default]
    PhaseSwap,
    /// Invert the body force and the flux setpoint.
    FlowDirection,
}

/// Saturation schedule shared by the morphological strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphSchedule {
    pub injection: InjectionKind,
    /// Saturation to reach by flux injection before the first stabilization.
    pub initial_saturation: Option<f64>,
    /// Saturation at which the schedule ends.
    pub final_saturation: Option<f64>,
}

/// Adaptation strategy, fixed for the whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdaptationStrategy {
    /// Only rescale the driving force toward the target capillary number.
    #[default]
    CapillaryTarget,
    /// Erode or dilate a shell around the largest component-A blob.
    ShellMorph(MorphSchedule),
    /// Randomly reassign sites of the displaced phase.
    SpinodalMorph(MorphSchedule),
    /// Push the interface with a temporary inlet flux.
    FluxMorph(MorphSchedule),
    /// Shift the inlet composition after each steady state.
    Coinjection { injection: InjectionKind },
    /// Reverse the flow once.
    FluxReversal { reversal: ReversalKind },
}

impl AdaptationStrategy {
    /// Schedule of a morphological strategy.
    pub fn schedule(&self) -> Option<&MorphSchedule> {
        match self {
            AdaptationStrategy::ShellMorph(s)
            | AdaptationStrategy::SpinodalMorph(s)
            | AdaptationStrategy::FluxMorph(s) => Some(s),
            _ => None,
        }
    }

    /// Whether capillary-number targeting may act under this strategy.
    pub fn allows_capillary_target(&self) -> bool {
        !matches!(self, AdaptationStrategy::Coinjection { .. })
    }
}

/// Parameters of the adaptive control loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlParams {
    /// Target capillary number; targeting is off when absent.
    pub target_ca: Option<f64>,
    /// Relative Ca change that counts as steady.
    pub tolerance: f64,
    /// Timesteps between analyses.
    pub analysis_interval: usize,
    /// Timesteps before any feedback acts.
    pub ramp_timesteps: usize,
    pub strategy: AdaptationStrategy,
    /// Timesteps of stabilization before a steady-state check.
    pub stabilisation_rate: usize,
    /// Timesteps between adaptation actions.
    pub acceleration_rate: usize,
    pub saturation_increment: f64,
    /// Saturation below which a flux reversal fires.
    pub flux_reversal_threshold: Option<f64>,
    /// Settling metric below which the state counts as settled.
    pub settling_tolerance: f64,
    pub force_ceiling: f64,
    pub force_floor: f64,
    /// Timesteps over which solid affinities ramp up; zero disables.
    pub affinity_ramp_steps: usize,
    /// Base seed of the spinodal strategy, offset by rank.
    pub seed: u64,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            target_ca: None,
            tolerance: 0.02,
            analysis_interval: 1000,
            ramp_timesteps: 50_000,
            strategy: AdaptationStrategy::default(),
            stabilisation_rate: 10_000,
            acceleration_rate: 1_000,
            saturation_increment: 0.05,
            flux_reversal_threshold: None,
            settling_tolerance: 3e-5,
            force_ceiling: 1e-3,
            force_floor: 1e-6,
            affinity_ramp_steps: 0,
            seed: 0,
        }
    }
}

impl ControlParams {
    pub fn with_target_ca(mut self, target: f64) -> Self {
        self.target_ca = Some(target);
        self
    }

    pub fn with_strategy(mut self, strategy: AdaptationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_analysis_interval(mut self, interval: usize) -> Self {
        self.analysis_interval = interval;
        self
    }

    pub fn with_ramp_timesteps(mut self, ramp: usize) -> Self {
        self.ramp_timesteps = ramp;
        self
    }

    pub fn with_rates(mut self, stabilisation: usize, acceleration: usize) -> Self {
        self.stabilisation_rate = stabilisation;
        self.acceleration_rate = acceleration;
        self
    }

    pub fn with_force_limits(mut self, floor: f64, ceiling: f64) -> Self {
        self.force_floor = floor;
        self.force_ceiling = ceiling;
        self
    }

    /// Check ranges that would make the loop meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis_interval == 0 {
            return Err(ConfigError::Invalid {
                name: "analysis_interval",
                reason: "must be positive".into(),
            });
        }
        if !(self.force_floor > 0.0 && self.force_ceiling > self.force_floor) {
            return Err(ConfigError::Invalid {
                name: "force_ceiling",
                reason: format!(
                    "need ceiling > floor > 0, got floor {} and ceiling {}",
                    self.force_floor, self.force_ceiling
                ),
            });
        }
        if !(self.saturation_increment > 0.0 && self.saturation_increment < 1.0) {
            return Err(ConfigError::Invalid {
                name: "saturation_increment",
                reason: format!("{} outside (0, 1)", self.saturation_increment),
            });
        }
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::Invalid {
                name: "tolerance",
                reason: "must be positive".into(),
            });
        }
        if let Some(target) = self.target_ca {
            if !(target > 0.0) {
                return Err(ConfigError::Invalid {
                    name: "target_ca",
                    reason: format!("{} is not positive", target),
                });
            }
        }
        if self.acceleration_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "acceleration_rate",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = ControlParams::default();
        assert_eq!(p.ramp_timesteps, 50_000);
        assert_eq!(p.stabilisation_rate, 10_000);
        assert_eq!(p.acceleration_rate, 1_000);
        assert_eq!(p.tolerance, 0.02);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_strategy_from_json() {
        let s: AdaptationStrategy =
            serde_json::from_str(r#"{"kind":"shell_morph","injection":"imbibition","final_saturation":0.8}"#).unwrap();
        let schedule = s.schedule().unwrap();
        assert_eq!(schedule.injection, InjectionKind::Imbibition);
        assert_eq!(schedule.final_saturation, Some(0.8));
        assert_eq!(schedule.initial_saturation, None);

        let s: AdaptationStrategy =
            serde_json::from_str(r#"{"kind":"flux_reversal","reversal":"flow_direction"}"#).unwrap();
        assert_eq!(
            s,
            AdaptationStrategy::FluxReversal {
                reversal: ReversalKind::FlowDirection
            }
        );
        assert!(s.schedule().is_none());
    }

    #[test]
    fn test_validate_force_limits() {
        let p = ControlParams::default().with_force_limits(1e-3, 1e-6);
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Invalid { name: "force_ceiling", .. })
        ));
    }

    #[test]
    fn test_coinjection_disables_targeting() {
        assert!(!AdaptationStrategy::Coinjection {
            injection: InjectionKind::Drainage
        }
        .allows_capillary_target());
        assert!(AdaptationStrategy::FluxMorph(MorphSchedule::default()).allows_capillary_target());
    }
}
