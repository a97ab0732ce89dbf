//! Compacted site layout and the streaming neighbor table.
//!
//! [`DomainIndexBuilder`] scans a partition's halo-inclusive label grid in
//! z-slowest lexicographic order and assigns compact indices to simulated
//! owned sites. Exterior sites (on the owned block's boundary layer, so
//! touching the halo) come first, interior sites follow. Both ranges start
//! on a 16-site boundary and the total is padded to a multiple of 16.
//!
//! ```text
//! [0, last_exterior)              exterior sites
//! [last_exterior, first_interior) padding
//! [first_interior, last_interior) interior sites
//! [last_interior, np)             padding
//! ```
//!
//! The neighbor table stores, for direction `q` in `1..19` and site `n`,
//! the slot holding the population that streams *into* `n` along `e_q`:
//! `m + q*np` when the upstream site `m = n - e_q` is a simulated owned
//! site, and the self reference `n + opp(q)*np` otherwise (bounce-back, or
//! a halo link that the communicator fills).

use std::ops::Range;

use tracing::debug;

use crate::domain::decomposition::Subdomain;
use crate::domain::labels::{ComponentTable, LabelGrid};
use crate::error::ConfigError;
use crate::lattice::d3q19::{E, OPP, Q};
use crate::types::{Extent3, GridIndex, SiteIndex};

/// Map entry for a site that is not simulated.
pub const SENTINEL: u32 = u32::MAX;

/// Alignment of the compact index ranges.
pub const PAD: usize = 16;

#[inline]
fn round_up(n: usize) -> usize {
    n.div_ceil(PAD) * PAD
}

/// Default capacity for `count` simulated sites.
pub fn padded_capacity(count: usize) -> usize {
    (count / PAD + 2) * PAD
}

/// Full-grid to compact index map.
#[derive(Clone, Debug)]
pub struct SiteMap {
    extent: Extent3,
    entries: Vec<u32>,
}

impl SiteMap {
    /// Compact index of a grid position.
    #[inline]
    pub fn get(&self, g: GridIndex) -> Option<SiteIndex> {
        match self.entries[g] {
            SENTINEL => None,
            n => Some(SiteIndex::new(n as usize)),
        }
    }

    #[inline]
    pub fn extent(&self) -> Extent3 {
        self.extent
    }

    /// Raw entries, [`SENTINEL`] for non-simulated positions.
    pub fn as_slice(&self) -> &[u32] {
        &self.entries
    }
}

/// Streaming neighbor table of `18 × np` slot indices.
#[derive(Clone, Debug)]
pub struct NeighborList {
    np: usize,
    entries: Vec<u32>,
}

impl NeighborList {
    /// Slot of the population entering `n` along direction `q` (`1..19`).
    #[inline]
    pub fn entry(&self, q: usize, n: usize) -> usize {
        self.entries[(q - 1) * self.np + n] as usize
    }

    /// Whether the entry is a self reference.
    #[inline]
    pub fn is_self_reference(&self, q: usize, n: usize) -> bool {
        self.entry(q, n) == n + OPP[q] * self.np
    }

    #[inline]
    pub fn np(&self) -> usize {
        self.np
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.entries
    }
}

/// Compacted layout of one partition.
#[derive(Clone, Debug)]
pub struct Layout {
    map: SiteMap,
    neighbors: NeighborList,
    grid_of: Vec<u32>,
    np: usize,
    last_exterior: usize,
    first_interior: usize,
    last_interior: usize,
}

impl Layout {
    /// Padded number of compact slots.
    #[inline]
    pub fn np(&self) -> usize {
        self.np
    }

    #[inline]
    pub fn map(&self) -> &SiteMap {
        &self.map
    }

    #[inline]
    pub fn neighbors(&self) -> &NeighborList {
        &self.neighbors
    }

    /// Exterior compact range `[0, last_exterior)`.
    #[inline]
    pub fn exterior(&self) -> Range<usize> {
        0..self.last_exterior
    }

    /// Interior compact range `[first_interior, last_interior)`.
    #[inline]
    pub fn interior(&self) -> Range<usize> {
        self.first_interior..self.last_interior
    }

    #[inline]
    pub fn last_exterior(&self) -> usize {
        self.last_exterior
    }

    #[inline]
    pub fn first_interior(&self) -> usize {
        self.first_interior
    }

    #[inline]
    pub fn last_interior(&self) -> usize {
        self.last_interior
    }

    /// Number of simulated sites.
    pub fn site_count(&self) -> usize {
        self.last_exterior + (self.last_interior - self.first_interior)
    }

    /// Simulated compact indices, exterior first.
    pub fn sites(&self) -> impl Iterator<Item = usize> + '_ {
        self.exterior().chain(self.interior())
    }

    /// Local grid position of a simulated site.
    #[inline]
    pub fn grid_of(&self, n: usize) -> GridIndex {
        GridIndex::new(self.grid_of[n] as usize)
    }

    /// Site-to-grid table, [`SENTINEL`] on padding slots.
    #[inline]
    pub fn grid_table(&self) -> &[u32] {
        &self.grid_of
    }

    /// Whether a compact slot is padding.
    #[inline]
    pub fn is_padding(&self, n: usize) -> bool {
        self.grid_of[n] == SENTINEL
    }

    /// Scatter a compact field into a regular halo-inclusive array.
    ///
    /// Non-simulated positions receive `fill`.
    pub fn to_regular(&self, field: &[f64], fill: f64) -> Vec<f64> {
        let mut out = vec![fill; self.map.extent().len()];
        for n in self.sites() {
            out[self.grid_of[n] as usize] = field[n];
        }
        out
    }
}

/// Builder for [`Layout`].
///
/// # Example
///
/// ```ignore
/// let layout = DomainIndexBuilder::new(sub.labels(), &components)
///     .with_rank(sub.rank())
///     .build()?;
/// assert!(layout.np() % 16 == 0);
/// ```
pub struct DomainIndexBuilder<'a> {
    labels: &'a LabelGrid,
    components: &'a ComponentTable,
    capacity: Option<usize>,
    rank: usize,
}

impl<'a> DomainIndexBuilder<'a> {
    /// Builder over a halo-inclusive label grid.
    pub fn new(labels: &'a LabelGrid, components: &'a ComponentTable) -> Self {
        Self {
            labels,
            components,
            capacity: None,
            rank: 0,
        }
    }

    /// Builder for a partition.
    pub fn for_subdomain(sub: &'a Subdomain, components: &'a ComponentTable) -> Self {
        Self::new(sub.labels(), components).with_rank(sub.rank())
    }

    /// Cap the padded slot count.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Rank used in error reports.
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn build(self) -> Result<Layout, ConfigError> {
        let extent = self.labels.extent();
        let [hx, hy, hz] = extent.as_array();
        let (nx, ny, nz) = (hx - 2, hy - 2, hz - 2);
        let simulated = |g: GridIndex| self.components.is_simulated(self.labels.at(g));

        let mut exterior = Vec::new();
        let mut interior = Vec::new();
        for k in 1..=nz {
            for j in 1..=ny {
                for i in 1..=nx {
                    let g = extent.linear(i, j, k);
                    if !simulated(g) {
                        continue;
                    }
                    let on_boundary =
                        i == 1 || i == nx || j == 1 || j == ny || k == 1 || k == nz;
                    if on_boundary {
                        exterior.push(g);
                    } else {
                        interior.push(g);
                    }
                }
            }
        }

        let count = exterior.len() + interior.len();
        if count == 0 {
            return Err(ConfigError::NoSimulatedSites { rank: self.rank });
        }
        let last_exterior = exterior.len();
        let first_interior = round_up(last_exterior);
        let last_interior = first_interior + interior.len();
        let np = round_up(last_interior).max(PAD);
        let capacity = self.capacity.unwrap_or_else(|| padded_capacity(count));
        if np > capacity {
            return Err(ConfigError::CapacityExceeded {
                required: np,
                capacity,
            });
        }

        let mut entries = vec![SENTINEL; extent.len()];
        let mut grid_of = vec![SENTINEL; np];
        let slots = (0..last_exterior).chain(first_interior..last_interior);
        for (n, g) in slots.zip(exterior.iter().chain(interior.iter())) {
            entries[*g] = n as u32;
            grid_of[n] = g.get() as u32;
        }

        let mut table = vec![0u32; 18 * np];
        for n in 0..np {
            for q in 1..Q {
                table[(q - 1) * np + n] = (n + OPP[q] * np) as u32;
            }
        }
        for n in (0..last_exterior).chain(first_interior..last_interior) {
            let (i, j, k) = extent.coords(GridIndex::new(grid_of[n] as usize));
            for q in 1..Q {
                let e = E[q];
                let ui = (i as i64 - e[0] as i64) as usize;
                let uj = (j as i64 - e[1] as i64) as usize;
                let uk = (k as i64 - e[2] as i64) as usize;
                let owned =
                    (1..=nx).contains(&ui) && (1..=ny).contains(&uj) && (1..=nz).contains(&uk);
                if !owned {
                    continue;
                }
                let m = entries[extent.linear(ui, uj, uk)];
                if m != SENTINEL {
                    table[(q - 1) * np + n] = (m as usize + q * np) as u32;
                }
            }
        }

        debug!(
            rank = self.rank,
            np,
            exterior = last_exterior,
            interior = interior.len(),
            "compacted layout"
        );

        Ok(Layout {
            map: SiteMap { extent, entries },
            neighbors: NeighborList { np, entries: table },
            grid_of,
            np,
            last_exterior,
            first_interior,
            last_interior,
        })
    }
}
