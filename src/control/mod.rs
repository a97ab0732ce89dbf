//! Adaptive run control: collective diagnostics, the control state
//! machine and morphological φ edits.

pub mod diagnostics;
pub mod morph;
pub mod params;
pub mod state;

pub use diagnostics::{DiagnosticInputs, Diagnostics, DiagnosticsReducer};
pub use morph::{apply_reservoirs, count_phase_a, GatheredMorphology, Morphology, MorphologyOracle};
pub use params::{AdaptationStrategy, ControlParams, InjectionKind, MorphSchedule, ReversalKind};
pub use state::{Actuators, ControlLoop, ControlOutcome, ControlPhase, MorphAction, SteadySample};
