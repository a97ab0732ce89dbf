//! Site labels and the component table.
//!
//! Labels are signed bytes. `0` is solid, `1` seeds component A (φ = +1),
//! `2` seeds component B (φ = -1). Labels listed in a [`ComponentTable`]
//! are immobile solids carrying a fixed wetting affinity.

use crate::error::ConfigError;
use crate::types::{Extent3, GridIndex};

/// Site label.
pub type Label = i8;

/// Solid wall with no affinity entry.
pub const SOLID: Label = 0;
/// Non-wetting component seed.
pub const COMPONENT_A: Label = 1;
/// Wetting component seed.
pub const COMPONENT_B: Label = 2;

/// A regular grid of site labels.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelGrid {
    extent: Extent3,
    labels: Vec<Label>,
}

impl LabelGrid {
    /// Wrap a label array in x-fastest order.
    pub fn new(extent: Extent3, labels: Vec<Label>) -> Result<Self, ConfigError> {
        if labels.len() != extent.len() {
            return Err(ConfigError::LabelCount {
                expected: extent.len(),
                actual: labels.len(),
            });
        }
        Ok(Self { extent, labels })
    }

    /// Grid filled with a single label.
    pub fn filled(extent: Extent3, label: Label) -> Self {
        Self {
            extent,
            labels: vec![label; extent.len()],
        }
    }

    /// Build a grid from a per-site function.
    pub fn from_fn(extent: Extent3, mut f: impl FnMut(usize, usize, usize) -> Label) -> Self {
        let mut labels = Vec::with_capacity(extent.len());
        for k in 0..extent.nz() {
            for j in 0..extent.ny() {
                for i in 0..extent.nx() {
                    labels.push(f(i, j, k));
                }
            }
        }
        Self { extent, labels }
    }

    #[inline]
    pub fn extent(&self) -> Extent3 {
        self.extent
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Label {
        self.labels[self.extent.linear(i, j, k)]
    }

    #[inline]
    pub fn at(&self, g: GridIndex) -> Label {
        self.labels[g]
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, label: Label) {
        let g = self.extent.linear(i, j, k);
        self.labels[g] = label;
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.labels
    }

    /// Number of sites carrying `label`.
    pub fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }
}

/// Immobile labels with their wetting affinities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentTable {
    entries: Vec<(Label, f64)>,
}

impl ComponentTable {
    /// Pair a label list with an affinity list of the same length.
    pub fn from_lists(labels: &[Label], affinities: &[f64]) -> Result<Self, ConfigError> {
        if labels.len() != affinities.len() {
            return Err(ConfigError::AffinityMismatch {
                labels: labels.len(),
                affinities: affinities.len(),
            });
        }
        let entries = labels.iter().copied().zip(affinities.iter().copied()).collect();
        Ok(Self { entries })
    }

    /// Table with no immobile components.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Affinity of an immobile label.
    pub fn affinity(&self, label: Label) -> Option<f64> {
        self.entries
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, a)| *a)
    }

    /// Whether a site with this label is part of the simulated pore space.
    #[inline]
    pub fn is_simulated(&self, label: Label) -> bool {
        label > 0 && self.affinity(label).is_none()
    }

    /// Initial phase indicator; affinities are scaled by `affinity_scale`.
    pub fn initial_phi(&self, label: Label, affinity_scale: f64) -> f64 {
        if let Some(a) = self.affinity(label) {
            return a * affinity_scale;
        }
        match label {
            COMPONENT_A => 1.0,
            COMPONENT_B => -1.0,
            _ => 0.0,
        }
    }
}
