//! Run input and output: raw label grids, restart checkpoints and the
//! steady-state log.
//!
//! # Restart layout
//!
//! ```text
//! Restart.txt      timestep
//! Restart.00000    per site: ρA ρB f0 .. f18   (f64, little-endian)
//! Restart.00001    ...
//! ```
//!
//! A missing file is not an error: [`CheckpointStore::read`] returns
//! `None` and the run starts fresh.

pub mod checkpoint;
pub mod geometry;
pub mod steady_log;

pub use checkpoint::{CheckpointStore, Snapshot, RECORD_LEN};
pub use geometry::{read_raw_labels, write_raw_labels};
pub use steady_log::SteadyStateLog;
