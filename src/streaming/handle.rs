//! Shared half of the cache used by loader threads
//!
//! The owning thread publishes needs and commits loaded tiles; loaders claim
//! needs, fill buffers and hand them back. Everything they share lives here
//! behind short-held locks. Lock order is needs before status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::pages::{Need, PageCoord, PageId, PageTree};
use super::buffer_pool::{BufferPool, TileBuffer};
use super::priority::NeedQueue;
use super::status::{PageStatus, StatusTable};

/// A claimed page and the buffer to fill for it
#[derive(Debug)]
pub struct LoadTicket {
    pub page: PageId,
    pub coord: PageCoord,
    pub buffer: TileBuffer,
}

/// A filled buffer waiting for the owning thread
#[derive(Debug)]
pub(crate) struct LoadedTile {
    pub(crate) page: PageId,
    pub(crate) buffer: TileBuffer,
}

struct Shared {
    tree: Arc<PageTree>,
    needs: Mutex<NeedQueue>,
    /// Signalled once per queued need
    need_added: Condvar,
    loaded: Mutex<Vec<LoadedTile>>,
    buffers: BufferPool,
    status: Mutex<StatusTable>,
    shutdown: AtomicBool,
}

/// Cloneable access to the cache for loader threads
#[derive(Clone)]
pub struct CacheHandle {
    shared: Arc<Shared>,
}

impl CacheHandle {
    pub(crate) fn new(tree: Arc<PageTree>, buffer_count: usize, buffer_bytes: usize) -> Self {
        let pages = tree.len();
        Self {
            shared: Arc::new(Shared {
                tree,
                needs: Mutex::new(NeedQueue::new()),
                need_added: Condvar::new(),
                loaded: Mutex::new(Vec::new()),
                buffers: BufferPool::new(buffer_count, buffer_bytes),
                status: Mutex::new(StatusTable::new(pages)),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Claim the most important pending page, waiting until there is one
    ///
    /// A buffer is taken first, so a page only becomes Loading once it can be
    /// filled. No other loader can claim it after that. Returns `None` once
    /// the cache shuts down.
    pub fn get_needed(&self) -> Option<LoadTicket> {
        let buffer = self.shared.buffers.checkout(&self.shared.shutdown)?;

        let page = {
            let mut queue = self.shared.needs.lock();
            loop {
                if self.is_shutdown() {
                    break None;
                }
                if let Some(page) = self.claim(&mut queue) {
                    break Some(page);
                }
                self.shared.need_added.wait(&mut queue);
            }
        };

        match page {
            Some(page) => Some(self.ticket(page, buffer)),
            None => {
                self.shared.buffers.checkin(buffer);
                None
            }
        }
    }

    /// Claim a pending page without waiting
    ///
    /// Returns `None` when nothing is pending or no buffer is free.
    pub fn try_get_needed(&self) -> Option<LoadTicket> {
        if self.is_shutdown() {
            return None;
        }
        let buffer = self.shared.buffers.try_checkout()?;
        let page = self.claim(&mut self.shared.needs.lock());
        match page {
            Some(page) => Some(self.ticket(page, buffer)),
            None => {
                self.shared.buffers.checkin(buffer);
                None
            }
        }
    }

    /// Pop needs until one can be dispatched, marking it Loading
    fn claim(&self, queue: &mut NeedQueue) -> Option<PageId> {
        let mut status = self.shared.status.lock();
        while let Some(need) = queue.pop() {
            if status.get(need.page).is_dispatchable() {
                status.set(need.page, PageStatus::Loading);
                return Some(need.page);
            }
        }
        None
    }

    fn ticket(&self, page: PageId, buffer: TileBuffer) -> LoadTicket {
        LoadTicket {
            page,
            coord: self.shared.tree.coord(page),
            buffer,
        }
    }

    /// Hand a filled buffer back for the next `proc`
    ///
    /// After shutdown the tile is dropped and the buffer recycled.
    pub fn put_loaded(&self, page: PageId, buffer: TileBuffer) {
        if self.is_shutdown() {
            self.shared.buffers.checkin(buffer);
            return;
        }
        self.shared.loaded.lock().push(LoadedTile { page, buffer });
    }

    /// Record that a page could not be produced
    pub fn mark_missing(&self, page: PageId, buffer: TileBuffer) {
        self.shared.status.lock().set(page, PageStatus::Missing);
        self.shared.buffers.checkin(buffer);
    }

    pub fn status(&self, page: PageId) -> PageStatus {
        self.shared.status.lock().get(page)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Needs queued and not yet claimed
    pub fn pending_needs(&self) -> usize {
        self.shared.needs.lock().len()
    }

    /// Buffers not held by loaders or queued tiles
    pub fn free_buffers(&self) -> usize {
        self.shared.buffers.available()
    }

    pub fn tree(&self) -> &PageTree {
        &self.shared.tree
    }

    /// Replace the pending needs, returning how many were queued
    ///
    /// Queued pages that are no longer needed go back to Empty. Only
    /// dispatchable pages are queued; Loading, Resident and Missing pages are
    /// skipped.
    pub(crate) fn replace_needs(&self, needs: &[Need]) -> usize {
        let queued = {
            let mut queue = self.shared.needs.lock();
            let mut status = self.shared.status.lock();

            for stale in queue.drain() {
                if status.get(stale.page) == PageStatus::Needed {
                    status.set(stale.page, PageStatus::Empty);
                }
            }

            let mut queued = 0;
            for need in needs {
                if status.get(need.page).is_dispatchable() {
                    status.set(need.page, PageStatus::Needed);
                    queue.push(*need);
                    queued += 1;
                }
            }
            queued
        };

        for _ in 0..queued {
            self.shared.need_added.notify_one();
        }
        queued
    }

    pub(crate) fn drain_loaded(&self) -> Vec<LoadedTile> {
        std::mem::take(&mut *self.shared.loaded.lock())
    }

    pub(crate) fn lock_status(&self) -> MutexGuard<'_, StatusTable> {
        self.shared.status.lock()
    }

    pub(crate) fn recycle(&self, buffer: TileBuffer) {
        self.shared.buffers.checkin(buffer);
    }

    /// Stop handing out work and wake every waiting loader
    pub(crate) fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let _queue = self.shared.needs.lock();
            self.shared.need_added.notify_all();
        }
        self.shared.buffers.wake_all();

        for tile in self.drain_loaded() {
            self.shared.buffers.checkin(tile.buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TreeConfig;
    use std::thread;
    use std::time::Duration;

    fn handle(buffers: usize) -> CacheHandle {
        let tree = PageTree::new(&TreeConfig {
            page_size: 4,
            map_width: 8,
            map_height: 8,
            max_depth: 1,
        })
        .unwrap();
        CacheHandle::new(Arc::new(tree), buffers, 64)
    }

    fn need(page: u32, priority: f64) -> Need {
        Need {
            page: PageId(page),
            priority,
            distance: 1.0,
        }
    }

    #[test]
    fn test_claims_in_priority_order() {
        let handle = handle(4);
        assert_eq!(handle.replace_needs(&[need(1, 0.1), need(2, 0.5), need(3, 0.3)]), 3);
        assert_eq!(handle.status(PageId(2)), PageStatus::Needed);

        let first = handle.try_get_needed().unwrap();
        assert_eq!(first.page, PageId(2));
        assert_eq!(first.coord, handle.tree().coord(PageId(2)));
        assert_eq!(handle.status(PageId(2)), PageStatus::Loading);
        assert_eq!(handle.try_get_needed().unwrap().page, PageId(3));
        assert_eq!(handle.pending_needs(), 1);
    }

    #[test]
    fn test_loading_page_is_not_requeued() {
        let handle = handle(4);
        handle.replace_needs(&[need(1, 0.5)]);
        let ticket = handle.try_get_needed().unwrap();

        assert_eq!(handle.replace_needs(&[need(1, 0.5)]), 0);
        assert!(handle.try_get_needed().is_none());
        handle.put_loaded(ticket.page, ticket.buffer);
        assert_eq!(handle.drain_loaded().len(), 1);
    }

    #[test]
    fn test_superseded_needs_revert_to_empty() {
        let handle = handle(4);
        handle.replace_needs(&[need(1, 0.5), need(2, 0.4)]);
        handle.replace_needs(&[need(2, 0.4)]);
        assert_eq!(handle.status(PageId(1)), PageStatus::Empty);
        assert_eq!(handle.status(PageId(2)), PageStatus::Needed);
        assert_eq!(handle.pending_needs(), 1);
    }

    #[test]
    fn test_no_buffer_means_no_claim() {
        let handle = handle(1);
        handle.replace_needs(&[need(1, 0.5), need(2, 0.4)]);
        let _held = handle.try_get_needed().unwrap();
        assert!(handle.try_get_needed().is_none());
        // The unclaimed need stays queued.
        assert_eq!(handle.status(PageId(2)), PageStatus::Needed);
        assert_eq!(handle.pending_needs(), 1);
    }

    #[test]
    fn test_missing_is_not_dispatched() {
        let handle = handle(2);
        handle.replace_needs(&[need(1, 0.5)]);
        let ticket = handle.try_get_needed().unwrap();
        handle.mark_missing(ticket.page, ticket.buffer);

        assert_eq!(handle.status(PageId(1)), PageStatus::Missing);
        assert_eq!(handle.replace_needs(&[need(1, 0.5)]), 0);
        assert_eq!(handle.free_buffers(), 2);
    }

    #[test]
    fn test_blocked_loader_wakes_on_need() {
        let handle = handle(2);
        let worker = {
            let handle = handle.clone();
            thread::spawn(move || handle.get_needed().map(|t| t.page))
        };

        thread::sleep(Duration::from_millis(20));
        handle.replace_needs(&[need(3, 0.5)]);
        assert_eq!(worker.join().unwrap(), Some(PageId(3)));
    }

    #[test]
    fn test_loader_without_buffer_claims_nothing() {
        let handle = handle(1);
        handle.replace_needs(&[need(1, 0.5), need(2, 0.4)]);
        let held = handle.try_get_needed().unwrap();

        let worker = {
            let handle = handle.clone();
            thread::spawn(move || handle.get_needed().map(|t| t.page))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.status(PageId(2)), PageStatus::Needed);
        assert_eq!(handle.pending_needs(), 1);

        handle.put_loaded(held.page, held.buffer);
        for tile in handle.drain_loaded() {
            handle.recycle(tile.buffer);
        }
        assert_eq!(worker.join().unwrap(), Some(PageId(2)));
        assert_eq!(handle.status(PageId(2)), PageStatus::Loading);
    }

    #[test]
    fn test_shutdown_wakes_blocked_loader() {
        let handle = handle(2);
        let worker = {
            let handle = handle.clone();
            thread::spawn(move || handle.get_needed().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        handle.shutdown();
        assert!(worker.join().unwrap());
        assert!(handle.is_shutdown());

        let mut buffer = TileBuffer::default();
        buffer.write(4, 4, 4, 64);
        handle.put_loaded(PageId(1), buffer);
        assert!(handle.drain_loaded().is_empty());
    }
}
