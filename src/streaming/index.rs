//! Residency index
//!
//! One entry per page naming the slot that currently supplies its texels:
//! the page itself when resident, otherwise its nearest resident ancestor.
//! The entry table is plain old data so a renderer can upload it as-is.

use std::collections::VecDeque;

use bytemuck::{Pod, Zeroable};

use crate::pages::{PageId, PageTree};

/// Sentinel slot for pages with no resident ancestor
pub const INVALID_SLOT: u32 = u32::MAX;

/// Slot and depth of the data a page samples from
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct IndexEntry {
    pub slot: u32,
    /// Depth of the resident page that owns `slot`
    pub depth: u32,
}

impl IndexEntry {
    pub const UNRESOLVED: IndexEntry = IndexEntry {
        slot: INVALID_SLOT,
        depth: u32::MAX,
    };

    pub fn is_resolved(&self) -> bool {
        self.slot != INVALID_SLOT
    }
}

/// Coarse-to-fine fallback table over every page of a tree
#[derive(Debug)]
pub struct PageIndex {
    entries: Vec<IndexEntry>,
    dirty: bool,
}

impl PageIndex {
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![IndexEntry::UNRESOLVED; len],
            dirty: true,
        }
    }

    pub fn get(&self, page: PageId) -> IndexEntry {
        self.entries[page.index()]
    }

    /// Entry for a page, if any ancestor (or the page itself) is resident
    pub fn resolve(&self, page: PageId) -> Option<IndexEntry> {
        Some(self.get(page)).filter(IndexEntry::is_resolved)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Point `page` and its descendants at `slot`
    ///
    /// Descendants already served by a finer resident page are left alone,
    /// together with their subtrees. Returns the number of entries written.
    pub fn propagate(&mut self, tree: &PageTree, page: PageId, slot: u32) -> usize {
        let entry = IndexEntry {
            slot,
            depth: tree.coord(page).depth,
        };
        let mut written = 0;
        let mut queue = VecDeque::from([page]);

        while let Some(id) = queue.pop_front() {
            let current = self.entries[id.index()];
            if current.is_resolved() && current.depth < entry.depth {
                continue;
            }
            self.entries[id.index()] = entry;
            written += 1;
            queue.extend(tree.page(id).children());
        }

        self.dirty |= written > 0;
        written
    }

    /// Undo `propagate` after `page` leaves `slot`
    ///
    /// Every entry of the subtree that pointed at `slot` inherits the parent's
    /// entry instead. Returns the number of entries written.
    pub fn restore(&mut self, tree: &PageTree, page: PageId, slot: u32) -> usize {
        let fallback = tree
            .parent(page)
            .map_or(IndexEntry::UNRESOLVED, |parent| self.get(parent));
        let mut written = 0;
        let mut queue = VecDeque::from([page]);

        while let Some(id) = queue.pop_front() {
            if self.entries[id.index()].slot != slot {
                continue;
            }
            self.entries[id.index()] = fallback;
            written += 1;
            queue.extend(tree.page(id).children());
        }

        self.dirty |= written > 0;
        written
    }

    /// Whether entries changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
