//! Per-page load state

use std::collections::HashSet;

use serde::Serialize;

use crate::pages::PageId;

/// Where a page is in its load lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum PageStatus {
    /// Never requested, or dropped before it was loaded
    #[default]
    Empty,
    /// Queued for a loader
    Needed,
    /// Claimed by a loader or awaiting a slot
    Loading,
    /// Held in a slot
    Resident,
    /// The source failed; not requested again until retried
    Missing,
    /// Lost its slot this frame
    Evicted,
}

impl PageStatus {
    const COUNT: usize = 6;

    fn ordinal(self) -> usize {
        self as usize
    }

    /// Whether a loader may claim a page in this state
    pub fn is_dispatchable(self) -> bool {
        matches!(self, PageStatus::Empty | PageStatus::Needed | PageStatus::Evicted)
    }
}

/// Status of every page in the tree, with per-state counts
#[derive(Debug)]
pub(crate) struct StatusTable {
    status: Vec<PageStatus>,
    counts: [usize; PageStatus::COUNT],
    loading: HashSet<PageId>,
}

impl StatusTable {
    pub(crate) fn new(len: usize) -> Self {
        let mut counts = [0; PageStatus::COUNT];
        counts[PageStatus::Empty.ordinal()] = len;
        Self {
            status: vec![PageStatus::Empty; len],
            counts,
            loading: HashSet::new(),
        }
    }

    pub(crate) fn get(&self, page: PageId) -> PageStatus {
        self.status[page.index()]
    }

    pub(crate) fn set(&mut self, page: PageId, status: PageStatus) {
        let slot = &mut self.status[page.index()];
        if *slot == status {
            return;
        }
        self.counts[slot.ordinal()] -= 1;
        self.counts[status.ordinal()] += 1;
        *slot = status;

        if status == PageStatus::Loading {
            self.loading.insert(page);
        } else {
            self.loading.remove(&page);
        }
    }

    /// Pages currently in the `Loading` state
    pub(crate) fn loading(&self) -> impl Iterator<Item = PageId> + '_ {
        self.loading.iter().copied()
    }

    pub(crate) fn count(&self, status: PageStatus) -> usize {
        self.counts[status.ordinal()]
    }

    /// Reset every `Missing` page to `Empty`, returning how many changed
    pub(crate) fn clear_missing(&mut self) -> usize {
        if self.count(PageStatus::Missing) == 0 {
            return 0;
        }
        let missing: Vec<PageId> = self
            .status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == PageStatus::Missing)
            .map(|(i, _)| PageId(i as u32))
            .collect();
        for &page in &missing {
            self.set(page, PageStatus::Empty);
        }
        missing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_follow_transitions() {
        let mut table = StatusTable::new(4);
        assert_eq!(table.count(PageStatus::Empty), 4);

        table.set(PageId(1), PageStatus::Needed);
        table.set(PageId(1), PageStatus::Loading);
        table.set(PageId(2), PageStatus::Loading);
        assert_eq!(table.count(PageStatus::Loading), 2);
        assert_eq!(table.count(PageStatus::Needed), 0);
        assert_eq!(table.count(PageStatus::Empty), 2);

        let mut loading: Vec<_> = table.loading().collect();
        loading.sort();
        assert_eq!(loading, vec![PageId(1), PageId(2)]);

        table.set(PageId(1), PageStatus::Resident);
        assert_eq!(table.loading().collect::<Vec<_>>(), vec![PageId(2)]);
        assert_eq!(table.get(PageId(1)), PageStatus::Resident);
    }

    #[test]
    fn test_dispatchable_states() {
        assert!(PageStatus::Empty.is_dispatchable());
        assert!(PageStatus::Evicted.is_dispatchable());
        assert!(!PageStatus::Loading.is_dispatchable());
        assert!(!PageStatus::Resident.is_dispatchable());
        assert!(!PageStatus::Missing.is_dispatchable());
    }

    #[test]
    fn test_clear_missing() {
        let mut table = StatusTable::new(3);
        table.set(PageId(0), PageStatus::Missing);
        table.set(PageId(2), PageStatus::Missing);
        assert_eq!(table.clear_missing(), 2);
        assert_eq!(table.count(PageStatus::Missing), 0);
        assert_eq!(table.get(PageId(2)), PageStatus::Empty);
        assert_eq!(table.clear_missing(), 0);
    }
}
