//! Steady-state sample log (`relperm.csv`).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::control::state::SteadySample;

/// Column header of the log.
pub const HEADER: &str =
    "timestep,saturation,ca,k_a,k_b,force_x,force_y,force_z,din,dout,volume_a,volume_b,inlet_a,inlet_b";

/// Append-only CSV of steady-state samples.
#[derive(Clone, Debug)]
pub struct SteadyStateLog {
    path: PathBuf,
}

impl SteadyStateLog {
    /// Log at `dir/relperm.csv`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join("relperm.csv"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample, writing the header first if the file is new.
    pub fn append(&self, sample: &SteadySample) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let fresh = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if fresh {
            writeln!(file, "{}", HEADER)?;
        }
        writeln!(file, "{}", format_row(sample))
    }
}

/// One CSV row.
pub fn format_row(s: &SteadySample) -> String {
    format!(
        "{},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.8},{:.8},{},{},{:.4},{:.4}",
        s.timestep,
        s.saturation,
        s.capillary_number,
        s.permeability_a,
        s.permeability_b,
        s.force[0],
        s.force[1],
        s.force[2],
        s.din,
        s.dout,
        s.volume_a,
        s.volume_b,
        s.inlet_a,
        s.inlet_b
    )
}
