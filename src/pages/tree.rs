//! Page tree arena
//!
//! The tile pyramid is built once, breadth-first from the root, into a flat
//! arena. Parent and child links are arena indices, so the tree can be shared
//! read-only between the owning thread and the loaders without locking.

use std::collections::{HashMap, VecDeque};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

use rayon::prelude::*;

use crate::core::config::TreeConfig;
use crate::core::types::Result;
use crate::math::Cap;
use super::coord::{PageCoord, PageId};

/// One node of the pyramid
#[derive(Clone, Debug)]
pub struct Page {
    pub coord: PageCoord,
    /// Bounding cap of the page's map area
    pub cap: Cap,
    /// Share of the page's pixel square inside the map extent, in (0, 1]
    pub coverage: f64,
    pub parent: Option<PageId>,
    /// Children in row-major order; edge pages may lack some
    pub children: [Option<PageId>; 4],
}

impl Page {
    fn new(coord: PageCoord, parent: Option<PageId>) -> Self {
        Self {
            coord,
            cap: Cap::FULL,
            coverage: 1.0,
            parent,
            children: [None; 4],
        }
    }

    /// Iterate over existing children
    pub fn children(&self) -> impl Iterator<Item = PageId> + '_ {
        self.children.iter().flatten().copied()
    }

    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    pub fn is_leaf(&self) -> bool {
        self.coord.depth == 0
    }
}

/// Immutable quad-tree of pages over an equirectangular map
pub struct PageTree {
    config: TreeConfig,
    pages: Vec<Page>,
    lookup: HashMap<PageCoord, PageId>,
}

impl PageTree {
    /// Build the full tree down to depth 0
    pub fn new(config: &TreeConfig) -> Result<Self> {
        config.validate()?;

        let mut pages = vec![Page::new(PageCoord::new(config.max_depth, 0, 0), None)];
        let mut queue = VecDeque::from([PageId(0)]);

        while let Some(id) = queue.pop_front() {
            let coord = pages[id.index()].coord;
            for index in 0..4 {
                let Some(child) = coord.child(index) else {
                    break;
                };
                if !Self::within_extent(config, child) {
                    continue;
                }
                let child_id = PageId(pages.len() as u32);
                pages.push(Page::new(child, Some(id)));
                pages[id.index()].children[index] = Some(child_id);
                queue.push_back(child_id);
            }
        }

        pages.par_iter_mut().for_each(|page| {
            let (cap, coverage) = Self::page_geometry(config, page.coord);
            page.cap = cap;
            page.coverage = coverage;
        });

        let lookup = pages
            .iter()
            .enumerate()
            .map(|(i, page)| (page.coord, PageId(i as u32)))
            .collect();

        log::info!(
            "Built page tree: {} pages, root depth {}, map {}x{} px",
            pages.len(),
            config.max_depth,
            config.map_width,
            config.map_height
        );

        Ok(Self {
            config: *config,
            pages,
            lookup,
        })
    }

    /// A page exists iff its pixel square intersects the map
    fn within_extent(config: &TreeConfig, coord: PageCoord) -> bool {
        let extent = config.page_extent(coord.depth);
        (coord.col as u64 * extent) < config.map_width as u64
            && (coord.row as u64 * extent) < config.map_height as u64
    }

    /// Pixel rectangle of a page clipped to the map: (x0, y0, x1, y1)
    fn pixel_rect(config: &TreeConfig, coord: PageCoord) -> (u64, u64, u64, u64) {
        let extent = config.page_extent(coord.depth);
        let x0 = coord.col as u64 * extent;
        let y0 = coord.row as u64 * extent;
        let x1 = (x0 + extent).min(config.map_width as u64);
        let y1 = (y0 + extent).min(config.map_height as u64);
        (x0, y0, x1, y1)
    }

    fn page_geometry(config: &TreeConfig, coord: PageCoord) -> (Cap, f64) {
        let (x0, y0, x1, y1) = Self::pixel_rect(config, coord);
        let w = config.map_width as f64;
        let h = config.map_height as f64;

        let lon = |x: u64| x as f64 / w * TAU - PI;
        let lat = |y: u64| FRAC_PI_2 - y as f64 / h * PI;
        let cap = Cap::from_lon_lat_rect(lon(x0), lon(x1), lat(y0), lat(y1));

        let extent = config.page_extent(coord.depth) as f64;
        let coverage = ((x1 - x0) as f64 * (y1 - y0) as f64) / (extent * extent);
        (cap, coverage)
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn root(&self) -> PageId {
        PageId(0)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, id: PageId) -> &Page {
        &self.pages[id.index()]
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn coord(&self, id: PageId) -> PageCoord {
        self.pages[id.index()].coord
    }

    pub fn parent(&self, id: PageId) -> Option<PageId> {
        self.pages[id.index()].parent
    }

    /// Look up a page by coordinate
    pub fn find(&self, coord: PageCoord) -> Option<PageId> {
        self.lookup.get(&coord).copied()
    }

    /// Ancestors of a page, nearest first
    pub fn ancestors(&self, id: PageId) -> impl Iterator<Item = PageId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Whether `ancestor` lies on the path from `id` to the root (exclusive)
    pub fn is_ancestor(&self, ancestor: PageId, id: PageId) -> bool {
        self.ancestors(id).any(|p| p == ancestor)
    }

    /// Count of depth-0 pages
    pub fn leaf_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_leaf()).count()
    }
}
