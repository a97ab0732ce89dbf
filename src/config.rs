//! Run configuration.
//!
//! All per-run settings live in one [`RunConfig`], read from JSON. Every
//! section has defaults, so a file only names what it changes:
//!
//! ```json
//! {
//!   "domain": { "size": [32, 32, 64], "nproc": [1, 1, 2],
//!               "geometry": { "kind": "raw", "path": "bead_pack.raw" } },
//!   "model": "color",
//!   "color": { "tau_a": 0.7, "tau_b": 0.7, "alpha": 0.005, "force": [0, 0, 1e-5] },
//!   "boundary": { "mode": "flux", "flux": 0.5 },
//!   "control": { "target_ca": 1e-5, "strategy": { "kind": "capillary_target" } },
//!   "run": { "timestep_max": 200000 }
//! }
//! ```
//!
//! [`RunConfig::validate`] runs before any partition starts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::boundary::{BoundaryMode, ColorSetpoints, Setpoints};
use crate::control::params::ControlParams;
use crate::domain::decomposition::ProcessGrid;
use crate::domain::labels::{ComponentTable, Label, LabelGrid, COMPONENT_A, SOLID};
use crate::error::{ConfigError, LbmError};
use crate::io::geometry::read_raw_labels;
use crate::kernel::collision::CollisionModel;
use crate::types::Extent3;

// =============================================================================
// Domain
// =============================================================================

/// Source of the global label grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// Raw signed-byte labels, x fastest.
    Raw { path: PathBuf },
    /// Every site carries `label`.
    Open { label: Label },
    /// Duct along z with one solid layer at `i = 0` and `j = 0`.
    Channel { label: Label },
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::Open { label: COMPONENT_A }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Global grid size.
    pub size: [usize; 3],
    /// Process grid.
    pub nproc: [usize; 3],
    pub geometry: Geometry,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            size: [16, 16, 16],
            nproc: [1, 1, 1],
            geometry: Geometry::default(),
        }
    }
}

// =============================================================================
// Models
// =============================================================================

/// Which solver a run uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Color,
    Flow,
}

/// Two-component color model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub tau_a: f64,
    pub tau_b: f64,
    pub rho_a: f64,
    pub rho_b: f64,
    /// Interfacial tension parameter.
    pub alpha: f64,
    /// Interface sharpness.
    pub beta: f64,
    pub force: [f64; 3],
    /// Immobile solid labels carrying a wetting affinity.
    pub component_labels: Vec<Label>,
    pub component_affinity: Vec<f64>,
    pub collision: CollisionModel,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            tau_a: 1.0,
            tau_b: 1.0,
            rho_a: 1.0,
            rho_b: 1.0,
            alpha: 1e-3,
            beta: 0.95,
            force: [0.0; 3],
            component_labels: Vec::new(),
            component_affinity: Vec::new(),
            collision: CollisionModel::Mrt,
        }
    }
}

/// Passive scalar carried by the single-phase flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub diffusivity: f64,
    /// Concentration imposed at the inlet in pressure or flux mode.
    pub c_in: f64,
    pub c_out: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            diffusivity: 1.0 / 6.0,
            c_in: 1.1,
            c_out: 1.0,
        }
    }
}

/// Single-phase flow model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub tau: f64,
    pub force: [f64; 3],
    pub collision: CollisionModel,
    /// Relative permeability change between analyses that ends the run.
    pub perm_tolerance: f64,
    pub thermal: Option<ThermalConfig>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            tau: 1.0,
            force: [0.0; 3],
            collision: CollisionModel::Mrt,
            perm_tolerance: 1e-5,
            thermal: None,
        }
    }
}

// =============================================================================
// Boundary and run settings
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub mode: BoundaryMode,
    pub din: f64,
    pub dout: f64,
    pub flux: f64,
    pub inlet_a: f64,
    pub inlet_b: f64,
    pub outlet_a: f64,
    pub outlet_b: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        let s = Setpoints::default();
        let c = ColorSetpoints::default();
        Self {
            mode: s.mode,
            din: s.din,
            dout: s.dout,
            flux: s.flux,
            inlet_a: c.inlet_a,
            inlet_b: c.inlet_b,
            outlet_a: c.outlet_a,
            outlet_b: c.outlet_b,
        }
    }
}

impl BoundaryConfig {
    pub fn setpoints(&self) -> Setpoints {
        Setpoints {
            mode: self.mode,
            din: self.din,
            dout: self.dout,
            flux: self.flux,
        }
    }

    pub fn color_setpoints(&self) -> ColorSetpoints {
        ColorSetpoints {
            inlet_a: self.inlet_a,
            inlet_b: self.inlet_b,
            outlet_a: self.outlet_a,
            outlet_b: self.outlet_b,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub timestep_max: usize,
    /// Resume from the checkpoint in `restart_dir`.
    pub restart: bool,
    pub restart_dir: PathBuf,
    /// Half-steps between checkpoints; rounded up to even.
    pub checkpoint_interval: Option<usize>,
    /// Directory of the steady-state log.
    pub output_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timestep_max: 100_000,
            restart: false,
            restart_dir: PathBuf::from("."),
            checkpoint_interval: None,
            output_dir: PathBuf::from("."),
        }
    }
}

// =============================================================================
// Run configuration
// =============================================================================

/// Complete configuration of one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub domain: DomainConfig,
    pub model: ModelKind,
    pub color: ColorConfig,
    pub flow: FlowConfig,
    pub boundary: BoundaryConfig,
    pub control: ControlParams,
    pub run: RunSettings,
}

impl RunConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn with_size(mut self, size: [usize; 3]) -> Self {
        self.domain.size = size;
        self
    }

    pub fn with_nproc(mut self, nproc: [usize; 3]) -> Self {
        self.domain.nproc = nproc;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.domain.geometry = geometry;
        self
    }

    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryConfig) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_control(mut self, control: ControlParams) -> Self {
        self.control = control;
        self
    }

    pub fn with_timestep_max(mut self, timestep_max: usize) -> Self {
        self.run.timestep_max = timestep_max;
        self
    }

    pub fn extent(&self) -> Extent3 {
        Extent3::from_array(self.domain.size)
    }

    pub fn process_grid(&self) -> Result<ProcessGrid, ConfigError> {
        ProcessGrid::new(self.domain.nproc)
    }

    /// Immobile component table of the color model.
    pub fn components(&self) -> Result<ComponentTable, ConfigError> {
        match self.model {
            ModelKind::Color => ComponentTable::from_lists(&self.color.component_labels, &self.color.component_affinity),
            ModelKind::Flow => Ok(ComponentTable::empty()),
        }
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.domain.size;
        let nproc = self.domain.nproc;
        if size.contains(&0) {
            return Err(invalid("domain.size", format!("{:?} has an empty axis", size)));
        }
        if nproc.contains(&0) {
            return Err(invalid("domain.nproc", format!("{:?} has an empty axis", nproc)));
        }
        if (0..3).any(|d| size[d] % nproc[d] != 0) {
            return Err(ConfigError::IndivisibleGrid { global: size, nproc });
        }

        match self.model {
            ModelKind::Color => {
                let c = &self.color;
                check_tau("color.tau_a", c.tau_a)?;
                check_tau("color.tau_b", c.tau_b)?;
                if c.rho_a <= 0.0 || c.rho_b <= 0.0 {
                    return Err(invalid("color.rho", "component densities must be positive".into()));
                }
                if c.alpha < 0.0 || c.beta < 0.0 {
                    return Err(invalid("color.alpha", "alpha and beta must be non-negative".into()));
                }
                if c.component_labels.len() != c.component_affinity.len() {
                    return Err(ConfigError::AffinityMismatch {
                        labels: c.component_labels.len(),
                        affinities: c.component_affinity.len(),
                    });
                }
            }
            ModelKind::Flow => {
                check_tau("flow.tau", self.flow.tau)?;
                if let Some(thermal) = &self.flow.thermal {
                    if thermal.diffusivity <= 0.0 {
                        return Err(invalid("flow.thermal.diffusivity", "must be positive".into()));
                    }
                }
            }
        }

        if self.boundary.mode.is_open() && (self.boundary.din <= 0.0 || self.boundary.dout <= 0.0) {
            return Err(invalid("boundary.din", "boundary densities must be positive".into()));
        }
        self.control.validate()
    }

    /// Build the global label grid.
    pub fn load_labels(&self) -> Result<LabelGrid, LbmError> {
        let extent = self.extent();
        match &self.domain.geometry {
            Geometry::Raw { path } => read_raw_labels(path, extent),
            Geometry::Open { label } => Ok(LabelGrid::filled(extent, *label)),
            Geometry::Channel { label } => Ok(LabelGrid::from_fn(extent, |i, j, _| {
                if i == 0 || j == 0 {
                    SOLID
                } else {
                    *label
                }
            })),
        }
    }
}

fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { name, reason }
}

fn check_tau(name: &'static str, tau: f64) -> Result<(), ConfigError> {
    if tau > 0.5 {
        Ok(())
    } else {
        Err(invalid(name, format!("relaxation time {} must exceed 0.5", tau)))
    }
}
