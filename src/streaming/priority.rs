//! Priority queue of pending page loads

use std::collections::BinaryHeap;

use crate::pages::Need;

/// Max-heap of needs, most important first
#[derive(Debug, Default)]
pub struct NeedQueue {
    heap: BinaryHeap<Need>,
}

impl NeedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all queued needs
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Add a need to the queue
    pub fn push(&mut self, need: Need) {
        self.heap.push(need);
    }

    /// Get the most important need
    pub fn pop(&mut self) -> Option<Need> {
        self.heap.pop()
    }

    /// Remove every queued need, in no particular order
    pub fn drain(&mut self) -> impl Iterator<Item = Need> + '_ {
        self.heap.drain()
    }

    /// Get the number of queued needs
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::PageId;

    fn need(page: u32, priority: f64, distance: f64) -> Need {
        Need {
            page: PageId(page),
            priority,
            distance,
        }
    }

    #[test]
    fn test_pops_highest_priority_first() {
        let mut queue = NeedQueue::new();
        queue.push(need(1, 0.2, 10.0));
        queue.push(need(2, 0.9, 50.0));
        queue.push(need(3, 0.5, 20.0));

        assert_eq!(queue.len(), 3);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|n| n.page.0).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ties_prefer_nearer_then_lower_id() {
        let mut queue = NeedQueue::new();
        queue.push(need(5, 0.5, 20.0));
        queue.push(need(4, 0.5, 20.0));
        queue.push(need(9, 0.5, 10.0));

        assert_eq!(queue.pop().unwrap().page, PageId(9));
        assert_eq!(queue.pop().unwrap().page, PageId(4));
        assert_eq!(queue.pop().unwrap().page, PageId(5));
    }

    #[test]
    fn test_drain_and_clear() {
        let mut queue = NeedQueue::new();
        queue.push(need(1, 0.1, 1.0));
        queue.push(need(2, 0.2, 1.0));
        assert_eq!(queue.drain().count(), 2);
        assert!(queue.is_empty());

        queue.push(need(3, 0.3, 1.0));
        queue.clear();
        assert_eq!(queue.len(), 0);
    }
}
