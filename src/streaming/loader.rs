//! Loader pool - background threads that fetch needed pages

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::pages::PageId;
use super::handle::{CacheHandle, LoadTicket};
use super::source::TileSource;

/// Result of servicing one ticket
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    /// Bytes were handed to the cache
    Loaded(PageId),
    /// The source failed; the page is now Missing
    Failed(PageId, String),
}

/// Fetch one claimed page and report the outcome to the cache
pub fn service(handle: &CacheHandle, source: &dyn TileSource, ticket: LoadTicket) -> LoadResult {
    let LoadTicket {
        page,
        coord,
        mut buffer,
    } = ticket;

    match source.fetch(coord, &mut buffer) {
        Ok(()) => {
            handle.put_loaded(page, buffer);
            LoadResult::Loaded(page)
        }
        Err(e) => {
            log::warn!("Failed to load page {}: {}", coord, e);
            handle.mark_missing(page, buffer);
            LoadResult::Failed(page, e.to_string())
        }
    }
}

/// Pages serviced by loader threads over their lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadTotals {
    pub loaded: usize,
    pub failed: usize,
}

/// Claim and service pages until the cache shuts down
fn worker_loop(handle: CacheHandle, source: Arc<dyn TileSource>) -> LoadTotals {
    let mut totals = LoadTotals::default();
    while let Some(ticket) = handle.get_needed() {
        match service(&handle, source.as_ref(), ticket) {
            LoadResult::Loaded(_) => totals.loaded += 1,
            LoadResult::Failed(..) => totals.failed += 1,
        }
    }
    totals
}

/// Fixed set of loader threads sharing one tile source
pub struct LoaderPool {
    handle: CacheHandle,
    workers: Vec<JoinHandle<LoadTotals>>,
}

impl LoaderPool {
    /// Spawn `threads` loaders
    ///
    /// With zero threads nothing is spawned and the caller drives loads
    /// through the handle.
    ///
    /// # Arguments
    /// * `threads` - Number of loader threads
    /// * `handle` - Shared cache state the loaders pull needs from
    /// * `source` - Where page bytes come from
    pub fn spawn(threads: usize, handle: CacheHandle, source: Arc<dyn TileSource>) -> Result<Self> {
        let mut pool = Self {
            handle,
            workers: Vec::with_capacity(threads),
        };

        for i in 0..threads {
            let handle = pool.handle.clone();
            let source = source.clone();
            let spawned = thread::Builder::new()
                .name(format!("page-loader-{i}"))
                .spawn(move || worker_loop(handle, source));

            match spawned {
                Ok(worker) => pool.workers.push(worker),
                Err(e) => {
                    pool.shutdown();
                    return Err(Error::Io(e));
                }
            }
        }

        if threads > 0 {
            log::debug!("Spawned {} page loader threads", threads);
        }
        Ok(pool)
    }

    /// Number of live loader threads
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Signal shutdown and join every loader
    ///
    /// In-flight fetches finish first; their results are discarded. Returns
    /// what the joined loaders serviced.
    pub fn shutdown(&mut self) -> LoadTotals {
        self.handle.shutdown();
        let mut totals = LoadTotals::default();
        let joined = self.workers.len();
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(worker_totals) => {
                    totals.loaded += worker_totals.loaded;
                    totals.failed += worker_totals.failed;
                }
                Err(_) => log::error!("Page loader thread panicked"),
            }
        }
        if joined > 0 {
            log::debug!(
                "Joined {} page loaders: {} loaded, {} failed",
                joined,
                totals.loaded,
                totals.failed
            );
        }
        totals
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TreeConfig;
    use crate::core::error::{TileError, TileResult};
    use crate::pages::{Need, PageCoord, PageTree};
    use crate::streaming::buffer_pool::TileBuffer;
    use crate::streaming::status::PageStatus;
    use std::time::{Duration, Instant};

    fn handle() -> CacheHandle {
        let tree = PageTree::new(&TreeConfig {
            page_size: 4,
            map_width: 8,
            map_height: 8,
            max_depth: 1,
        })
        .unwrap();
        CacheHandle::new(Arc::new(tree), 2, 64)
    }

    fn needs(pages: &[u32]) -> Vec<Need> {
        pages
            .iter()
            .map(|&p| Need {
                page: PageId(p),
                priority: 1.0 / (p + 1) as f64,
                distance: 1.0,
            })
            .collect()
    }

    fn fill(coord: PageCoord, buffer: &mut TileBuffer) -> TileResult<()> {
        if coord.col == 1 && coord.row == 1 && coord.depth == 0 {
            return Err(TileError::Decode("corrupt".into()));
        }
        buffer.write(4, 4, 4, 64).fill(coord.col as u8);
        Ok(())
    }

    #[test]
    fn test_service_success_and_failure() {
        let handle = handle();
        handle.replace_needs(&needs(&[1, 4]));

        let ticket = handle.try_get_needed().unwrap();
        assert_eq!(service(&handle, &fill, ticket), LoadResult::Loaded(PageId(1)));
        assert_eq!(handle.drain_loaded().len(), 1);

        let ticket = handle.try_get_needed().unwrap();
        assert_eq!(handle.tree().coord(ticket.page), PageCoord::new(0, 1, 1));
        assert!(matches!(service(&handle, &fill, ticket), LoadResult::Failed(p, _) if p == PageId(4)));
        assert_eq!(handle.status(PageId(4)), PageStatus::Missing);
        assert_eq!(handle.free_buffers(), 1);
    }

    #[test]
    fn test_workers_drain_needs() {
        let handle = handle();
        let mut pool = LoaderPool::spawn(2, handle.clone(), Arc::new(fill)).unwrap();
        assert_eq!(pool.len(), 2);

        handle.replace_needs(&needs(&[0, 1, 2, 3]));
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut loaded = Vec::new();
        while loaded.len() < 4 && Instant::now() < deadline {
            for tile in handle.drain_loaded() {
                loaded.push(tile.page);
                handle.recycle(tile.buffer);
            }
            thread::sleep(Duration::from_millis(1));
        }

        loaded.sort();
        assert_eq!(loaded, vec![PageId(0), PageId(1), PageId(2), PageId(3)]);
        pool.shutdown();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_shutdown_reports_worker_totals() {
        let handle = handle();
        let mut pool = LoaderPool::spawn(2, handle.clone(), Arc::new(fill)).unwrap();

        handle.replace_needs(&needs(&[1, 2, 3, 4]));
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut loaded = 0;
        while (loaded < 3 || handle.status(PageId(4)) != PageStatus::Missing)
            && Instant::now() < deadline
        {
            for tile in handle.drain_loaded() {
                loaded += 1;
                handle.recycle(tile.buffer);
            }
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(pool.shutdown(), LoadTotals { loaded: 3, failed: 1 });
        assert_eq!(pool.shutdown(), LoadTotals::default());
    }

    #[test]
    fn test_idle_pool_shuts_down() {
        let handle = handle();
        let pool = LoaderPool::spawn(3, handle.clone(), Arc::new(fill)).unwrap();
        drop(pool);
        assert!(handle.is_shutdown());
    }

    #[test]
    fn test_zero_threads() {
        let pool = LoaderPool::spawn(0, handle(), Arc::new(fill)).unwrap();
        assert!(pool.is_empty());
    }
}
