//! Domain description: labels, decomposition and the compacted layout.
//!
//! # Example
//!
//! ```ignore
//! use porous_lbm::domain::{ComponentTable, DomainIndexBuilder, LabelGrid, ProcessGrid, Subdomain};
//!
//! let subs = Subdomain::decompose(&labels, ProcessGrid::new([1, 1, 2])?)?;
//! let layout = DomainIndexBuilder::for_subdomain(&subs[0], &ComponentTable::empty()).build()?;
//! ```

pub mod decomposition;
pub mod labels;
pub mod layout;

pub use decomposition::{offset_index, ProcessGrid, Subdomain, NEIGHBOR_OFFSETS};
pub use labels::{ComponentTable, Label, LabelGrid, COMPONENT_A, COMPONENT_B, SOLID};
pub use layout::{DomainIndexBuilder, Layout, NeighborList, SiteMap, PAD, SENTINEL};
