//! Static quad-tree of map pages and per-frame visibility scanning

pub mod coord;
pub mod tree;
pub mod scan;

pub use coord::{PageCoord, PageId};
pub use tree::{Page, PageTree};
pub use scan::{Need, View};
