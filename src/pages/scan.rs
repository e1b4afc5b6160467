//! Visibility scanning and LOD selection
//!
//! Each frame the tree is walked against the active views. Visible pages are
//! emitted as needs ranked by their projected angular footprint; recursion
//! stops at the leaves or once a page subtends no more than the LOD cutoff.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::types::{DMat4, DVec3};
use crate::math::Frustum;
use super::coord::PageId;
use super::tree::PageTree;

/// One view volume: a frustum and the eye it was built from
#[derive(Clone, Copy, Debug)]
pub struct View {
    pub frustum: Frustum,
    pub eye: DVec3,
}

impl View {
    pub fn new(frustum: Frustum, eye: DVec3) -> Self {
        Self { frustum, eye }
    }

    /// Build from a view-projection matrix and the camera position
    pub fn from_view_projection(view_proj: &DMat4, eye: DVec3) -> Self {
        Self {
            frustum: Frustum::from_view_projection(view_proj),
            eye,
        }
    }
}

/// A per-frame request to have a page resident
#[derive(Clone, Copy, Debug)]
pub struct Need {
    pub page: PageId,
    /// Projected angular footprint in radians; higher = more important
    pub priority: f64,
    /// Distance from the nearest eye to the page's bounding region
    pub distance: f64,
}

// Higher priority first, then nearer, then lower page id.
impl Ord for Need {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.distance.total_cmp(&self.distance))
            .then_with(|| other.page.cmp(&self.page))
    }
}

impl PartialOrd for Need {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Need {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Need {}

impl PageTree {
    /// Collect the pages needed to render `views`, most important first
    ///
    /// Pure with respect to the tree: the same inputs always produce the same
    /// ordered result. An empty view set yields no needs.
    pub fn scan(&self, views: &[View], radius_range: (f64, f64), lod_cutoff: f64) -> Vec<Need> {
        let (r0, r1) = radius_range;
        let mut best: HashMap<PageId, Need> = HashMap::new();
        let mut stack = Vec::new();

        for view in views {
            stack.push(self.root());

            while let Some(id) = stack.pop() {
                let page = self.page(id);
                if !page.cap.above_horizon(view.eye, r0, r1)
                    || !view.frustum.intersects_cap(&page.cap, r0, r1)
                {
                    continue;
                }

                let (footprint, distance) = page.cap.footprint(view.eye, r0, r1);
                let need = Need {
                    page: id,
                    priority: footprint,
                    distance,
                };
                best.entry(id)
                    .and_modify(|n| {
                        if need > *n {
                            *n = need;
                        }
                    })
                    .or_insert(need);

                if !page.is_leaf() && footprint > lod_cutoff {
                    stack.extend(page.children());
                }
            }
        }

        let mut needs: Vec<Need> = best.into_values().collect();
        needs.sort_unstable_by(|a, b| b.cmp(a));
        needs
    }
}
