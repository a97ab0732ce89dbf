//! 3D grid extents.

use std::fmt;

use super::GridIndex;

/// Number of lattice sites along each axis of a regular grid.
///
/// Linear ordering is x-fastest: `n = i + j*nx + k*nx*ny`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Extent3 {
    nx: usize,
    ny: usize,
    nz: usize,
}

impl Extent3 {
    /// Create a new extent.
    ///
    /// # Panics
    ///
    /// Panics if any axis is zero.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        assert!(
            nx > 0 && ny > 0 && nz > 0,
            "extent must be positive, got {}x{}x{}",
            nx,
            ny,
            nz
        );
        Self { nx, ny, nz }
    }

    /// Create from an `[nx, ny, nz]` array.
    pub fn from_array(n: [usize; 3]) -> Self {
        Self::new(n[0], n[1], n[2])
    }

    /// Extent grown by one halo layer on every side.
    pub fn with_halo(&self) -> Self {
        Self::new(self.nx + 2, self.ny + 2, self.nz + 2)
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Axis lengths as an array.
    #[inline]
    pub fn as_array(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    /// Total number of sites.
    #[inline]
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Always false; extents are positive by construction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Linear index of `(i, j, k)`.
    #[inline]
    pub fn linear(&self, i: usize, j: usize, k: usize) -> GridIndex {
        GridIndex::new(i + j * self.nx + k * self.nx * self.ny)
    }

    /// Coordinates of a linear index.
    #[inline]
    pub fn coords(&self, g: GridIndex) -> (usize, usize, usize) {
        let n = g.get();
        let i = n % self.nx;
        let j = (n / self.nx) % self.ny;
        let k = n / (self.nx * self.ny);
        (i, j, k)
    }

    /// Linear offset of a lattice vector.
    #[inline]
    pub fn stride(&self, e: [i32; 3]) -> isize {
        e[0] as isize + e[1] as isize * self.nx as isize + e[2] as isize * (self.nx * self.ny) as isize
    }
}

impl fmt::Display for Extent3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}
