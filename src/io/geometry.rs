//! Raw label-grid input.

use std::fs;
use std::path::Path;

use crate::domain::labels::{Label, LabelGrid};
use crate::error::LbmError;
use crate::types::Extent3;

/// Read a raw grid of signed-byte labels in x-fastest order.
pub fn read_raw_labels(path: &Path, extent: Extent3) -> Result<LabelGrid, LbmError> {
    let bytes = fs::read(path)?;
    let labels: Vec<Label> = bytes.into_iter().map(|b| b as Label).collect();
    Ok(LabelGrid::new(extent, labels)?)
}

/// Write a label grid in the raw format.
pub fn write_raw_labels(path: &Path, grid: &LabelGrid) -> Result<(), LbmError> {
    let bytes: Vec<u8> = grid.as_slice().iter().map(|&l| l as u8).collect();
    fs::write(path, bytes)?;
    Ok(())
}

/// Porosity of a grid: the fraction of sites carrying a fluid label.
pub fn porosity(grid: &LabelGrid, is_simulated: impl Fn(Label) -> bool) -> f64 {
    let total = grid.as_slice().len();
    if total == 0 {
        return 0.0;
    }
    let fluid = grid.as_slice().iter().filter(|&&l| is_simulated(l)).count();
    fluid as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::labels::{COMPONENT_A, COMPONENT_B, SOLID};
    use crate::error::ConfigError;

    #[test]
    fn test_raw_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.raw");
        let grid = LabelGrid::from_fn(Extent3::new(3, 2, 2), |i, j, _| match (i, j) {
            (0, _) => SOLID,
            (_, 0) => COMPONENT_A,
            _ => -3,
        });
        write_raw_labels(&path, &grid).unwrap();
        let back = read_raw_labels(&path, grid.extent()).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_wrong_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.raw");
        fs::write(&path, [1u8; 5]).unwrap();
        let err = read_raw_labels(&path, Extent3::new(2, 2, 2)).unwrap_err();
        assert!(matches!(
            err,
            LbmError::Config(ConfigError::LabelCount { expected: 8, actual: 5 })
        ));
    }

    #[test]
    fn test_porosity() {
        let grid = LabelGrid::from_fn(Extent3::new(4, 1, 1), |i, _, _| if i == 0 { SOLID } else { COMPONENT_B });
        assert!((porosity(&grid, |l| l > 0) - 0.75).abs() < 1e-15);
    }
}
