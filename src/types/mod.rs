//! Strongly-typed lattice types.
//!
//! Compact site indices and full-grid indices are both plain integers in the
//! kernels, but they live in different index spaces. The newtypes here keep
//! them apart at API boundaries.
//!
//! # Example
//!
//! ```
//! use porous_lbm::types::{Extent3, GridIndex};
//!
//! let extent = Extent3::new(4, 3, 2);
//! let g = extent.linear(1, 2, 1);
//! assert_eq!(g, GridIndex::new(1 + 2 * 4 + 12));
//! assert_eq!(extent.coords(g), (1, 2, 1));
//! ```

mod extent;
mod indices;

pub use extent::Extent3;
pub use indices::{GridIndex, SiteIndex};
