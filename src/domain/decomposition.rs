//! Block decomposition of the global grid over a 3D process grid.
//!
//! Every partition owns an `nx × ny × nz` block and keeps one halo layer
//! around it. Local coordinates run over `0..=n+1` on each axis; the owned
//! block is `1..=n`. The global domain is periodic in all three directions,
//! so halo labels wrap around the global extent.

use crate::domain::labels::LabelGrid;
use crate::error::ConfigError;
use crate::types::{Extent3, GridIndex};

/// The 26 neighbor offsets of a block, z-slowest.
pub const NEIGHBOR_OFFSETS: [[i32; 3]; 26] = [
    [-1, -1, -1],
    [0, -1, -1],
    [1, -1, -1],
    [-1, 0, -1],
    [0, 0, -1],
    [1, 0, -1],
    [-1, 1, -1],
    [0, 1, -1],
    [1, 1, -1],
    [-1, -1, 0],
    [0, -1, 0],
    [1, -1, 0],
    [-1, 0, 0],
    [1, 0, 0],
    [-1, 1, 0],
    [0, 1, 0],
    [1, 1, 0],
    [-1, -1, 1],
    [0, -1, 1],
    [1, -1, 1],
    [-1, 0, 1],
    [0, 0, 1],
    [1, 0, 1],
    [-1, 1, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Position of an offset in [`NEIGHBOR_OFFSETS`].
///
/// # Panics
///
/// Panics on the zero offset or on components outside `-1..=1`.
pub fn offset_index(offset: [i32; 3]) -> usize {
    assert!(
        offset != [0, 0, 0] && offset.iter().all(|c| (-1..=1).contains(c)),
        "invalid neighbor offset {:?}",
        offset
    );
    let raw = ((offset[0] + 1) + 3 * (offset[1] + 1) + 9 * (offset[2] + 1)) as usize;
    if raw > 13 {
        raw - 1
    } else {
        raw
    }
}

/// Arrangement of partitions. Rank order is x-fastest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessGrid {
    nproc: [usize; 3],
}

impl ProcessGrid {
    pub fn new(nproc: [usize; 3]) -> Result<Self, ConfigError> {
        if nproc.iter().any(|&p| p == 0) {
            return Err(ConfigError::Invalid {
                name: "nproc",
                reason: format!("process grid {:?} has an empty axis", nproc),
            });
        }
        Ok(Self { nproc })
    }

    /// A single partition.
    pub fn serial() -> Self {
        Self { nproc: [1, 1, 1] }
    }

    #[inline]
    pub fn nproc(&self) -> [usize; 3] {
        self.nproc
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.nproc[0] * self.nproc[1] * self.nproc[2]
    }

    pub fn coords(&self, rank: usize) -> [usize; 3] {
        let [px, py, _] = self.nproc;
        [rank % px, (rank / px) % py, rank / (px * py)]
    }

    pub fn rank_of(&self, coords: [usize; 3]) -> usize {
        let [px, py, _] = self.nproc;
        coords[0] + coords[1] * px + coords[2] * px * py
    }

    /// Rank of the periodic neighbor at `offset`.
    pub fn neighbor(&self, rank: usize, offset: [i32; 3]) -> usize {
        let c = self.coords(rank);
        let mut n = [0usize; 3];
        for d in 0..3 {
            let p = self.nproc[d] as i64;
            n[d] = (c[d] as i64 + offset[d] as i64).rem_euclid(p) as usize;
        }
        self.rank_of(n)
    }
}

/// One partition's block of labels with its halo layer.
#[derive(Clone, Debug)]
pub struct Subdomain {
    rank: usize,
    process_grid: ProcessGrid,
    coords: [usize; 3],
    owned: Extent3,
    global: Extent3,
    labels: LabelGrid,
}

impl Subdomain {
    /// Cut the block of `rank` out of the global label grid.
    pub fn extract(
        global: &LabelGrid,
        process_grid: ProcessGrid,
        rank: usize,
    ) -> Result<Self, ConfigError> {
        let g = global.extent().as_array();
        let p = process_grid.nproc();
        if (0..3).any(|d| g[d] % p[d] != 0) {
            return Err(ConfigError::IndivisibleGrid { global: g, nproc: p });
        }
        if rank >= process_grid.size() {
            return Err(ConfigError::Invalid {
                name: "rank",
                reason: format!("{} outside a grid of {}", rank, process_grid.size()),
            });
        }
        let owned = Extent3::new(g[0] / p[0], g[1] / p[1], g[2] / p[2]);
        let coords = process_grid.coords(rank);
        let halo = owned.with_halo();
        let mut sub = Self {
            rank,
            process_grid,
            coords,
            owned,
            global: global.extent(),
            labels: LabelGrid::filled(halo, 0),
        };
        let labels = LabelGrid::from_fn(halo, |i, j, k| {
            let [gi, gj, gk] = sub.global_position(i, j, k);
            global.get(gi, gj, gk)
        });
        sub.labels = labels;
        Ok(sub)
    }

    /// Cut every partition.
    pub fn decompose(global: &LabelGrid, process_grid: ProcessGrid) -> Result<Vec<Self>, ConfigError> {
        (0..process_grid.size())
            .map(|rank| Self::extract(global, process_grid, rank))
            .collect()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn process_grid(&self) -> ProcessGrid {
        self.process_grid
    }

    #[inline]
    pub fn coords(&self) -> [usize; 3] {
        self.coords
    }

    /// Extent of the owned block (no halo).
    #[inline]
    pub fn owned(&self) -> Extent3 {
        self.owned
    }

    /// Extent of the local grid including the halo.
    #[inline]
    pub fn halo_extent(&self) -> Extent3 {
        self.labels.extent()
    }

    /// Extent of the global grid.
    #[inline]
    pub fn global(&self) -> Extent3 {
        self.global
    }

    /// Local labels including the halo.
    #[inline]
    pub fn labels(&self) -> &LabelGrid {
        &self.labels
    }

    /// Whether this partition holds the z-min inlet plane.
    pub fn is_inlet(&self) -> bool {
        self.coords[2] == 0
    }

    /// Whether this partition holds the z-max outlet plane.
    pub fn is_outlet(&self) -> bool {
        self.coords[2] + 1 == self.process_grid.nproc()[2]
    }

    /// Rank of the neighbor at `offset`.
    pub fn neighbor_rank(&self, offset: [i32; 3]) -> usize {
        self.process_grid.neighbor(self.rank, offset)
    }

    /// Periodic global coordinates of a local (halo-inclusive) position.
    pub fn global_position(&self, i: usize, j: usize, k: usize) -> [usize; 3] {
        self.global_position_in(self.coords, i, j, k)
    }

    /// Same as [`global_position`](Self::global_position) for the block at
    /// `coords` of the process grid; all blocks share one shape.
    pub fn global_position_in(&self, coords: [usize; 3], i: usize, j: usize, k: usize) -> [usize; 3] {
        let local = [i, j, k];
        let n = self.owned.as_array();
        let g = self.global.as_array();
        let mut out = [0usize; 3];
        for d in 0..3 {
            let pos = (coords[d] * n[d]) as i64 + local[d] as i64 - 1;
            out[d] = pos.rem_euclid(g[d] as i64) as usize;
        }
        out
    }

    /// Global linear index of a local position.
    pub fn global_index(&self, i: usize, j: usize, k: usize) -> GridIndex {
        let [gi, gj, gk] = self.global_position(i, j, k);
        self.global.linear(gi, gj, gk)
    }

    /// Whether a local position lies in the owned block.
    #[inline]
    pub fn is_owned(&self, i: usize, j: usize, k: usize) -> bool {
        let n = self.owned.as_array();
        (1..=n[0]).contains(&i) && (1..=n[1]).contains(&j) && (1..=n[2]).contains(&k)
    }

    /// Halo region of a local position as a neighbor offset, or `None` if owned.
    pub fn halo_region(&self, i: usize, j: usize, k: usize) -> Option<[i32; 3]> {
        let n = self.owned.as_array();
        let local = [i, j, k];
        let mut offset = [0i32; 3];
        for d in 0..3 {
            offset[d] = if local[d] == 0 {
                -1
            } else if local[d] == n[d] + 1 {
                1
            } else {
                0
            };
        }
        if offset == [0, 0, 0] {
            None
        } else {
            Some(offset)
        }
    }

    /// Local positions of the owned layer facing `offset`, x-fastest.
    pub fn boundary_layer(&self, offset: [i32; 3]) -> Vec<GridIndex> {
        self.region(offset, false)
    }

    /// Local positions of the halo region at `offset`, x-fastest.
    pub fn halo_layer(&self, offset: [i32; 3]) -> Vec<GridIndex> {
        self.region(offset, true)
    }

    fn region(&self, offset: [i32; 3], halo: bool) -> Vec<GridIndex> {
        let n = self.owned.as_array();
        let mut ranges = [(0usize, 0usize); 3];
        for d in 0..3 {
            ranges[d] = match (offset[d], halo) {
                (-1, false) => (1, 1),
                (1, false) => (n[d], n[d]),
                (-1, true) => (0, 0),
                (1, true) => (n[d] + 1, n[d] + 1),
                _ => (1, n[d]),
            };
        }
        let extent = self.halo_extent();
        let mut out = Vec::new();
        for k in ranges[2].0..=ranges[2].1 {
            for j in ranges[1].0..=ranges[1].1 {
                for i in ranges[0].0..=ranges[0].1 {
                    out.push(extent.linear(i, j, k));
                }
            }
        }
        out
    }
}
