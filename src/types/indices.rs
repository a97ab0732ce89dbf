//! Index newtypes for the two address spaces of a lattice site.
//!
//! A site sits at a [`GridIndex`] in the regular (halo-padded) grid and,
//! when it takes part in the update, at a [`SiteIndex`] in the compacted
//! population arrays. Keeping them apart stops a grid offset from being
//! used to read a population slot.

use std::fmt;
use std::ops::{Index, IndexMut, Range};

macro_rules! address {
    ($(#[$doc:meta])* $name:ident => $tag:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            pub const ZERO: Self = Self(0);

            #[inline]
            pub const fn new(raw: usize) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }

            /// Same as [`get`](Self::get), for call sites that read better as a cast.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            #[inline]
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }

            /// Saturates at zero.
            #[inline]
            pub fn prev(self) -> Self {
                Self(self.0.saturating_sub(1))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "{}"), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(raw: usize) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for usize {
            fn from(addr: $name) -> usize {
                addr.0
            }
        }

        impl<T> Index<$name> for [T] {
            type Output = T;
            #[inline]
            fn index(&self, addr: $name) -> &T {
                &self[addr.0]
            }
        }

        impl<T> IndexMut<$name> for [T] {
            #[inline]
            fn index_mut(&mut self, addr: $name) -> &mut T {
                &mut self[addr.0]
            }
        }

        impl<T> Index<$name> for Vec<T> {
            type Output = T;
            #[inline]
            fn index(&self, addr: $name) -> &T {
                &self.as_slice()[addr.0]
            }
        }

        impl<T> IndexMut<$name> for Vec<T> {
            #[inline]
            fn index_mut(&mut self, addr: $name) -> &mut T {
                &mut self.as_mut_slice()[addr.0]
            }
        }
    };
}

address!(
    /// Slot of a simulated site in the compacted arrays, in `[0, Np)`.
    ///
    /// ```
    /// use porous_lbm::types::SiteIndex;
    ///
    /// let n = SiteIndex::new(7);
    /// assert_eq!(n.next().get(), 8);
    /// ```
    SiteIndex => "S"
);

address!(
    /// Linear offset `i + j·nx + k·nx·ny` into a regular grid.
    GridIndex => "G"
);

impl SiteIndex {
    /// Walk the half-open slot range `start..end`.
    pub fn range_iter(start: SiteIndex, end: SiteIndex) -> impl Iterator<Item = SiteIndex> {
        Range { start: start.0, end: end.0 }.map(SiteIndex)
    }
}
