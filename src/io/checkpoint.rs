//! Per-partition restart checkpoints.
//!
//! `Restart.<rank:05>` holds one record per simulated site in ascending
//! compact order: ρA, ρB, then the 19 raw population slots `f[q*np + n]`,
//! all little-endian `f64`. `Restart.txt` holds the timestep the files
//! were written at. Checkpoints are taken after an even half-step, when
//! every site's populations sit in their own natural slots.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::domain::layout::Layout;
use crate::error::CheckpointError;
use crate::lattice::d3q19::Q;

/// Values stored per site.
pub const RECORD_LEN: usize = 2 + Q;

/// State restored from a checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// `[ρA | ρB]`, `2 * np` values.
    pub den: Vec<f64>,
    /// `Q * np` population slots; padding slots are zero.
    pub dist: Vec<f64>,
}

/// Directory of restart files.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File of one rank.
    pub fn rank_path(&self, rank: usize) -> PathBuf {
        self.dir.join(format!("Restart.{:05}", rank))
    }

    pub fn timestep_path(&self) -> PathBuf {
        self.dir.join("Restart.txt")
    }

    /// Write the state of one partition.
    pub fn write(&self, rank: usize, layout: &Layout, den: &[f64], dist: &[f64]) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)?;
        let np = layout.np();
        let mut out = BufWriter::new(File::create(self.rank_path(rank))?);
        for n in layout.sites() {
            out.write_all(&den[n].to_le_bytes())?;
            out.write_all(&den[np + n].to_le_bytes())?;
            for q in 0..Q {
                out.write_all(&dist[q * np + n].to_le_bytes())?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Record the checkpoint timestep; written by one rank.
    pub fn write_timestep(&self, timestep: usize) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.timestep_path(), format!("{}\n", timestep))?;
        Ok(())
    }

    /// Read the state of one partition; `None` if the file is missing.
    pub fn read(&self, rank: usize, layout: &Layout) -> Result<Option<Snapshot>, CheckpointError> {
        let path = self.rank_path(rank);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes)?;
        let expected = layout.site_count() * RECORD_LEN * 8;
        if bytes.len() != expected {
            return Err(CheckpointError::Truncated {
                path: path.display().to_string(),
                expected,
                actual: bytes.len(),
            });
        }

        let np = layout.np();
        let mut den = vec![0.0; 2 * np];
        let mut dist = vec![0.0; Q * np];
        let mut values = bytes.chunks_exact(8).map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            f64::from_le_bytes(b)
        });
        for n in layout.sites() {
            let mut next = || values.next().unwrap_or(0.0);
            den[n] = next();
            den[np + n] = next();
            for q in 0..Q {
                dist[q * np + n] = next();
            }
        }
        Ok(Some(Snapshot { den, dist }))
    }

    /// Checkpoint timestep; `None` if no checkpoint was written.
    pub fn read_timestep(&self) -> Result<Option<usize>, CheckpointError> {
        let text = match fs::read_to_string(self.timestep_path()) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let trimmed = text.trim();
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| CheckpointError::Timestep(trimmed.to_string()))
    }
}
