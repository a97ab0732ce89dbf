//! AA-pattern addressing.
//!
//! One population array of `Q × np` slots serves both half-steps. The
//! [`Parity`] of the half-step selects where a site finds its incoming
//! populations and where it leaves its outgoing ones:
//!
//! | parity | read `f_q`             | write post-collision `f_q` |
//! |--------|------------------------|----------------------------|
//! | even   | own slot `opp(q)`      | own slot `q`               |
//! | odd    | `neighbors[q]`         | `neighbors[opp(q)]`        |
//!
//! A site reads and writes the same set of slots within a half-step, and
//! no two sites share a slot, so sites can be updated in any order.

use crate::domain::layout::{Layout, NeighborList};
use crate::lattice::d3q19::OPP;

/// Half-step parity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// Parity of a timestep counter. A run starts on an odd half-step.
    #[inline]
    pub fn of(timestep: usize) -> Self {
        if timestep % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }
}

/// Slot resolution for one layout.
#[derive(Clone, Copy, Debug)]
pub struct AaAddressing<'a> {
    np: usize,
    neighbors: &'a NeighborList,
}

impl<'a> AaAddressing<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self {
            np: layout.np(),
            neighbors: layout.neighbors(),
        }
    }

    #[inline]
    pub fn np(&self) -> usize {
        self.np
    }

    /// Slot holding the population entering site `n` along `q`.
    #[inline]
    pub fn read_slot(&self, parity: Parity, n: usize, q: usize) -> usize {
        if q == 0 {
            return n;
        }
        match parity {
            Parity::Even => OPP[q] * self.np + n,
            Parity::Odd => self.neighbors.entry(q, n),
        }
    }

    /// Slot receiving the post-collision population `q` of site `n`.
    #[inline]
    pub fn write_slot(&self, parity: Parity, n: usize, q: usize) -> usize {
        if q == 0 {
            return n;
        }
        match parity {
            Parity::Even => q * self.np + n,
            Parity::Odd => self.neighbors.entry(OPP[q], n),
        }
    }

    /// Incoming populations of site `n`.
    #[inline]
    pub fn gather<const N: usize>(&self, parity: Parity, dist: &[f64], n: usize) -> [f64; N] {
        let mut f = [0.0; N];
        for (q, fq) in f.iter_mut().enumerate() {
            *fq = dist[self.read_slot(parity, n, q)];
        }
        f
    }

    /// Store post-collision populations of site `n`.
    #[inline]
    pub fn scatter<const N: usize>(&self, parity: Parity, dist: &mut [f64], n: usize, f: &[f64; N]) {
        for (q, fq) in f.iter().enumerate() {
            dist[self.write_slot(parity, n, q)] = *fq;
        }
    }
}
