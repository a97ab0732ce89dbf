//! Morphological edits of the phase indicator.
//!
//! Edits act on the halo-inclusive φ grid of one partition and only touch
//! owned pore sites; the caller reinitializes the tracker and refreshes
//! the halo afterwards. Connected-component labeling and distance
//! transforms go through [`MorphologyOracle`] so that an external image
//! library can stand in for the reference [`GatheredMorphology`].

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comm::Endpoint;
use crate::domain::decomposition::Subdomain;
use crate::domain::labels::ComponentTable;
use crate::domain::layout::Layout;
use crate::error::CommError;
use crate::types::{Extent3, GridIndex};

/// Connected components and distance transforms.
pub trait MorphologyOracle {
    /// Label the 6-connected components of `mask` over the whole domain
    /// (collective). `mask` covers the halo-inclusive grid of `sub`; only
    /// its owned positions are read. The returned halo-grid ids are global,
    /// numbered by decreasing size from 0, and -1 outside the mask.
    fn label_components(&self, sub: &Subdomain, ep: &mut Endpoint, mask: &[bool]) -> Result<Vec<i32>, CommError>;

    /// Signed distance to the boundary of `inside`: negative inside,
    /// positive outside.
    fn signed_distance(&self, extent: Extent3, inside: &[bool]) -> Vec<f64>;
}

/// Rank 0 flood-fills the gathered global mask and scatters the ids back;
/// distances are chamfer distances on the local grid.
#[derive(Clone, Copy, Debug, Default)]
pub struct GatheredMorphology;

const FACE_OFFSETS: [[i32; 3]; 6] = [
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [0, 0, 1],
    [0, 0, -1],
];

fn shifted(extent: Extent3, (i, j, k): (usize, usize, usize), o: [i32; 3]) -> Option<GridIndex> {
    let p = [i as i64 + o[0] as i64, j as i64 + o[1] as i64, k as i64 + o[2] as i64];
    let n = extent.as_array();
    if (0..3).any(|d| p[d] < 0 || p[d] >= n[d] as i64) {
        return None;
    }
    Some(extent.linear(p[0] as usize, p[1] as usize, p[2] as usize))
}

/// 6-connected components of `mask` on a non-periodic grid, numbered by
/// decreasing size (ties in scan order); -1 outside the mask.
pub fn flood_fill(extent: Extent3, mask: &[bool]) -> Vec<i32> {
    let mut raw = vec![-1i32; mask.len()];
    let mut sizes: Vec<usize> = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..mask.len() {
        if !mask[start] || raw[start] >= 0 {
            continue;
        }
        let id = sizes.len() as i32;
        raw[start] = id;
        queue.push_back(start);
        let mut size = 0;
        while let Some(g) = queue.pop_front() {
            size += 1;
            let coords = extent.coords(GridIndex::new(g));
            for o in FACE_OFFSETS {
                if let Some(h) = shifted(extent, coords, o) {
                    let h = h.get();
                    if mask[h] && raw[h] < 0 {
                        raw[h] = id;
                        queue.push_back(h);
                    }
                }
            }
        }
        sizes.push(size);
    }

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));
    let mut rank = vec![0i32; sizes.len()];
    for (r, &c) in order.iter().enumerate() {
        rank[c] = r as i32;
    }
    raw.into_iter()
        .map(|c| if c < 0 { -1 } else { rank[c as usize] })
        .collect()
}

/// Owned local positions in x-fastest order.
fn owned_positions(sub: &Subdomain) -> impl Iterator<Item = (usize, usize, usize)> {
    let [nx, ny, nz] = sub.owned().as_array();
    (1..=nz).flat_map(move |k| (1..=ny).flat_map(move |j| (1..=nx).map(move |i| (i, j, k))))
}

/// Assemble the owned masks of every rank, label the global grid and cut
/// out each rank's halo-grid ids.
fn label_gathered(sub: &Subdomain, parts: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let global = sub.global();
    let grid = sub.process_grid();
    let mut mask = vec![false; global.len()];
    for (rank, part) in parts.iter().enumerate() {
        let coords = grid.coords(rank);
        for ((i, j, k), &v) in owned_positions(sub).zip(part) {
            let [gi, gj, gk] = sub.global_position_in(coords, i, j, k);
            mask[global.linear(gi, gj, gk).get()] = v > 0.0;
        }
    }
    let ids = flood_fill(global, &mask);

    let local = sub.halo_extent();
    (0..parts.len())
        .map(|rank| {
            let coords = grid.coords(rank);
            (0..local.len())
                .map(|g| {
                    let (i, j, k) = local.coords(GridIndex::new(g));
                    let [gi, gj, gk] = sub.global_position_in(coords, i, j, k);
                    ids[global.linear(gi, gj, gk).get()] as f64
                })
                .collect()
        })
        .collect()
}

/// Chamfer distance from every position to the nearest seed.
fn chamfer(extent: Extent3, seeds: &[bool]) -> Vec<f64> {
    let mut dist: Vec<f64> = seeds
        .iter()
        .map(|&s| if s { 0.0 } else { f64::INFINITY })
        .collect();

    // half of the 26-neighborhood that precedes a position in x-fastest order
    let mut forward = Vec::with_capacity(13);
    for dk in -1..=0i32 {
        for dj in -1..=1i32 {
            for di in -1..=1i32 {
                if dk < 0 || dj < 0 || (dj == 0 && di < 0) {
                    let w = ((di * di + dj * dj + dk * dk) as f64).sqrt();
                    forward.push(([di, dj, dk], w));
                }
            }
        }
    }

    let [nx, ny, nz] = extent.as_array();
    let relax = |i: usize, j: usize, k: usize, sign: i32, dist: &mut Vec<f64>| {
        let g = extent.linear(i, j, k);
        let mut best = dist[g];
        for &(o, w) in &forward {
            let o = [o[0] * sign, o[1] * sign, o[2] * sign];
            if let Some(h) = shifted(extent, (i, j, k), o) {
                best = best.min(dist[h] + w);
            }
        }
        dist[g] = best;
    };
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                relax(i, j, k, 1, &mut dist);
            }
        }
    }
    for k in (0..nz).rev() {
        for j in (0..ny).rev() {
            for i in (0..nx).rev() {
                relax(i, j, k, -1, &mut dist);
            }
        }
    }
    dist
}

impl MorphologyOracle for GatheredMorphology {
    fn label_components(&self, sub: &Subdomain, ep: &mut Endpoint, mask: &[bool]) -> Result<Vec<i32>, CommError> {
        let local = sub.halo_extent();
        let owned: Vec<f64> = owned_positions(sub)
            .map(|(i, j, k)| if mask[local.linear(i, j, k).get()] { 1.0 } else { 0.0 })
            .collect();
        let replies = match ep.gather(&owned)? {
            Some(parts) => label_gathered(sub, &parts),
            None => Vec::new(),
        };
        let ids = ep.scatter(replies)?;
        Ok(ids.into_iter().map(|id| id as i32).collect())
    }

    fn signed_distance(&self, extent: Extent3, inside: &[bool]) -> Vec<f64> {
        let outside: Vec<bool> = inside.iter().map(|&b| !b).collect();
        let to_inside = chamfer(extent, inside);
        let to_outside = chamfer(extent, &outside);
        inside
            .iter()
            .enumerate()
            .map(|(g, &b)| {
                if b {
                    -(to_outside[g] - 0.5)
                } else {
                    to_inside[g] - 0.5
                }
            })
            .collect()
    }
}

/// Weight that suppresses shell growth within a site of the wall.
#[inline]
fn wall_weight(wall_distance: f64) -> f64 {
    1.0 / (1.0 + (-5.0 * (wall_distance - 1.0)).exp())
}

/// Morphological editor of one partition.
#[derive(Clone, Debug)]
pub struct Morphology<O = GatheredMorphology> {
    oracle: O,
    extent: Extent3,
    pore: Vec<bool>,
    owned: Vec<bool>,
    wall_distance: Vec<f64>,
    rng: StdRng,
}

impl<O: MorphologyOracle> Morphology<O> {
    /// Pore mask and wall distance are fixed for the run; the random
    /// stream is seeded with `seed + rank`.
    pub fn new(oracle: O, sub: &Subdomain, components: &ComponentTable, seed: u64) -> Self {
        let extent = sub.halo_extent();
        let pore: Vec<bool> = sub
            .labels()
            .as_slice()
            .iter()
            .map(|&l| components.is_simulated(l))
            .collect();
        let mut owned = vec![false; extent.len()];
        for (g, o) in owned.iter_mut().enumerate() {
            let (i, j, k) = extent.coords(GridIndex::new(g));
            *o = pore[g] && sub.is_owned(i, j, k);
        }
        let solid: Vec<bool> = pore.iter().map(|&p| !p).collect();
        let wall_distance = oracle.signed_distance(extent, &solid);
        Self {
            oracle,
            extent,
            pore,
            owned,
            wall_distance,
            rng: StdRng::seed_from_u64(seed.wrapping_add(sub.rank() as u64)),
        }
    }

    pub fn wall_distance(&self) -> &[f64] {
        &self.wall_distance
    }

    /// Grow (positive `radius`) or shrink the globally largest A blob by a
    /// shell (collective).
    ///
    /// Growth converts pore sites within `radius` of the blob surface to A.
    /// Shrinking shifts the blob's distance field outward, weighted away
    /// from walls, and redraws a diffuse interface of width `1 / beta`.
    pub fn shell(
        &self,
        sub: &Subdomain,
        ep: &mut Endpoint,
        phi: &mut [f64],
        beta: f64,
        radius: f64,
    ) -> Result<(), CommError> {
        let inside: Vec<bool> = phi
            .iter()
            .zip(&self.pore)
            .map(|(&p, &pore)| pore && p > 0.0)
            .collect();
        let labels = self.oracle.label_components(sub, ep, &inside)?;
        let blob: Vec<bool> = labels.iter().map(|&c| c == 0).collect();
        if !blob.iter().any(|&b| b) {
            return Ok(());
        }
        let mut d = self.oracle.signed_distance(self.extent, &blob);

        if radius >= 0.0 {
            for g in 0..phi.len() {
                if self.owned[g] && d[g].abs() < radius {
                    phi[g] = 1.0;
                }
            }
            return Ok(());
        }

        for g in 0..phi.len() {
            if !self.pore[g] {
                continue;
            }
            if d[g] < 3.0 {
                let p = phi[g].clamp(-1.0, 1.0);
                if p.abs() < 0.8 && self.wall_distance[g] > 1.0 {
                    d[g] = -(0.5 / beta) * ((1.0 + p) / (1.0 - p)).ln();
                }
            }
            d[g] -= wall_weight(self.wall_distance[g]) * radius;
        }
        for g in 0..phi.len() {
            if self.owned[g] && d[g] < 3.0 {
                let e = (-2.0 * beta * d[g]).exp();
                phi[g] = 2.0 * e / (1.0 + e) - 1.0;
            }
        }
        Ok(())
    }

    /// Randomly reassign owned pore sites with probability `|delta|`:
    /// B to A when `delta < 0`, A to B otherwise.
    pub fn spinodal(&mut self, phi: &mut [f64], delta: f64) {
        let p = delta.abs().min(1.0);
        for g in 0..phi.len() {
            if !self.owned[g] {
                continue;
            }
            let flip = if delta < 0.0 { phi[g] < 0.0 } else { phi[g] > 0.0 };
            if flip && self.rng.gen::<f64>() < p {
                phi[g] = if delta < 0.0 { 1.0 } else { -1.0 };
            }
        }
    }
}

/// Number of owned sites in phase A.
pub fn count_phase_a(layout: &Layout, phi: &[f64]) -> f64 {
    layout
        .sites()
        .filter(|&n| phi[layout.grid_of(n)] > 0.0)
        .count() as f64
}

/// Depth of the inlet and outlet reservoirs in owned layers.
pub const RESERVOIR_DEPTH: usize = 3;

/// Fill the first owned z-layers of the inlet partition with A and the last
/// ones of the outlet partition with B.
pub fn apply_reservoirs(sub: &Subdomain, layout: &Layout, phi: &mut [f64]) {
    let extent = sub.halo_extent();
    let nz = sub.owned().nz();
    let depth = RESERVOIR_DEPTH.min(nz);
    for n in layout.sites() {
        let g = layout.grid_of(n);
        let (_, _, k) = extent.coords(g);
        if sub.is_inlet() && k <= depth {
            phi[g] = 1.0;
        } else if sub.is_outlet() && k > nz - depth {
            phi[g] = -1.0;
        }
    }
}
