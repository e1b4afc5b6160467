//! Page cache - owning-thread side of the streaming system
//!
//! Per frame the owner publishes needs (`update` or `set_needs`), calls
//! `proc` to move loaded tiles into slots, then `upload` to push changed
//! slots and the residency index to the renderer. Loaders run in the
//! background against a [`CacheHandle`].
//!
//! Replacement is LRU among resident pages that are not needed this frame.
//! A page that is the nearest resident fallback of a fetch still in flight
//! is never evicted, so rendering never loses its last usable ancestor.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::core::config::CacheConfig;
use crate::core::error::{Error, TileError};
use crate::core::types::Result;
use crate::pages::{Need, PageId, PageTree, View};
use super::buffer_pool::TileBuffer;
use super::format::TileFormat;
use super::handle::{CacheHandle, LoadTicket, LoadedTile};
use super::index::{IndexEntry, PageIndex};
use super::loader::LoaderPool;
use super::slot_table::SlotTable;
use super::source::TileSource;
use super::status::PageStatus;

/// Receives the texels and index produced by [`Cache::upload`]
pub trait UploadSink<F: TileFormat> {
    /// Write one tile at texel `origin` of the pool texture
    fn upload_tile(&mut self, slot: u32, origin: (u32, u32), pixels: &[F::Pixel]);

    /// Replace the residency index, one entry per page in tree order
    fn upload_index(&mut self, entries: &[IndexEntry]);
}

/// What one `proc` call did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcReport {
    /// Tiles copied into slots
    pub committed: usize,
    /// Resident pages replaced
    pub evicted: usize,
    /// Tiles kept for a later frame because no slot could be freed
    pub deferred: usize,
    /// Tiles dropped because their page is no longer needed
    pub discarded: usize,
    /// Tiles rejected at commit (layout mismatch)
    pub failed: usize,
}

/// Snapshot of cache state for logging and tooling
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CacheStats {
    pub frame: u64,
    pub capacity: usize,
    pub resident: usize,
    pub loading: usize,
    pub missing: usize,
    pub deferred: usize,
    pub pending_needs: usize,
    pub needed: usize,
    pub commits: u64,
    pub evictions: u64,
    pub discarded: u64,
    pub failures: u64,
    /// Slot pool utilization percentage
    pub utilization: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Totals {
    commits: u64,
    evictions: u64,
    discarded: u64,
    failures: u64,
}

/// Out-of-core page cache for one tile format
pub struct Cache<F: TileFormat> {
    config: CacheConfig,
    tree: Arc<PageTree>,
    handle: CacheHandle,
    loaders: LoaderPool,
    slots: SlotTable<F>,
    index: PageIndex,
    /// Pages named by the latest need set
    needed: HashSet<PageId>,
    /// Loaded tiles waiting for a slot
    deferred: Vec<LoadedTile>,
    /// Pages evicted in the last `proc`, settled to Empty in the next one
    evicted: Vec<PageId>,
    frame: u64,
    totals: Totals,
}

impl<F: TileFormat> Cache<F> {
    /// Build the page tree and start the loaders
    ///
    /// # Arguments
    /// * `config` - Validated before anything is allocated
    /// * `source` - Tile source shared by every loader thread
    pub fn new<S>(config: CacheConfig, source: S) -> Result<Self>
    where
        S: TileSource + 'static,
    {
        config.validate()?;
        let tree = Arc::new(PageTree::new(&config.tree_config())?);
        Self::with_tree(config, tree, source)
    }

    /// Start a cache over an existing tree
    ///
    /// The tree must have been built from `config.tree_config()`.
    pub fn with_tree<S>(config: CacheConfig, tree: Arc<PageTree>, source: S) -> Result<Self>
    where
        S: TileSource + 'static,
    {
        config.validate()?;
        if *tree.config() != config.tree_config() {
            return Err(Error::Config(
                "page tree was built from a different map layout".to_string(),
            ));
        }

        let handle = CacheHandle::new(
            tree.clone(),
            config.buffer_count,
            F::tile_bytes(config.page_size),
        );
        let loaders = LoaderPool::spawn(config.worker_threads, handle.clone(), Arc::new(source))?;

        log::info!(
            "Page cache ({}): {}x{} slots of {}px, {} pages, {} loaders, {} buffers",
            F::NAME,
            config.pool_width,
            config.pool_height,
            config.page_size,
            tree.len(),
            config.worker_threads,
            config.buffer_count
        );

        Ok(Self {
            slots: SlotTable::new(config.pool_width, config.pool_height, config.page_size),
            index: PageIndex::new(tree.len()),
            needed: HashSet::new(),
            deferred: Vec::new(),
            evicted: Vec::new(),
            frame: 0,
            totals: Totals::default(),
            config,
            tree,
            handle,
            loaders,
        })
    }

    /// Scan the tree against `views` and publish the result as this frame's needs
    ///
    /// Returns the number of pages newly queued for loading.
    pub fn update(&mut self, views: &[View]) -> usize {
        let needs = self
            .tree
            .scan(views, self.config.radius_range(), self.config.lod_cutoff);
        self.set_needs(&needs)
    }

    /// Replace the need set
    ///
    /// Resident pages in the set are marked used by the coming `proc`.
    /// Returns the number of pages newly queued for loading.
    pub fn set_needs(&mut self, needs: &[Need]) -> usize {
        self.needed.clear();
        self.needed.extend(needs.iter().map(|n| n.page));
        self.slots.begin_frame(self.frame + 1);
        for need in needs {
            self.slots.touch(need.page);
        }

        let queued = self.handle.replace_needs(needs);
        if queued > 0 {
            log::debug!("Frame {}: {} needs, {} queued", self.frame, needs.len(), queued);
        }
        queued
    }

    /// Claim a needed page, blocking until one is available
    pub fn get_needed(&self) -> Option<LoadTicket> {
        self.handle.get_needed()
    }

    /// Claim a needed page without blocking
    pub fn try_get_needed(&self) -> Option<LoadTicket> {
        self.handle.try_get_needed()
    }

    /// Hand back a filled buffer for the next `proc`
    pub fn put_loaded(&self, ticket: LoadTicket) {
        self.handle.put_loaded(ticket.page, ticket.buffer);
    }

    /// Record that a claimed page could not be loaded
    pub fn mark_missing(&self, ticket: LoadTicket) {
        self.handle.mark_missing(ticket.page, ticket.buffer);
    }

    /// Commit loaded tiles into slots, evicting as needed
    pub fn proc(&mut self) -> ProcReport {
        let mut report = ProcReport::default();
        self.frame += 1;
        self.slots.begin_frame(self.frame);

        {
            let mut status = self.handle.lock_status();
            for page in self.evicted.drain(..) {
                if status.get(page) == PageStatus::Evicted {
                    status.set(page, PageStatus::Empty);
                }
            }
        }

        let mut tiles = std::mem::take(&mut self.deferred);
        tiles.extend(self.handle.drain_loaded());

        if self.handle.is_shutdown() {
            for tile in tiles {
                self.handle.recycle(tile.buffer);
            }
            return report;
        }

        // Only fetches still in flight protect their fallback. A page whose
        // tile is already in hand is about to get its own slot.
        let in_hand: HashSet<PageId> = tiles.iter().map(|t| t.page).collect();
        let in_flight: HashSet<PageId> = self
            .handle
            .lock_status()
            .loading()
            .filter(|page| !in_hand.contains(page))
            .collect();
        for tile in tiles {
            self.commit_tile(tile, &in_flight, &mut report);
        }

        if report != ProcReport::default() {
            log::debug!(
                "Frame {}: committed {}, evicted {}, deferred {}, discarded {}, failed {}",
                self.frame,
                report.committed,
                report.evicted,
                report.deferred,
                report.discarded,
                report.failed
            );
        }
        report
    }

    fn commit_tile(&mut self, tile: LoadedTile, in_flight: &HashSet<PageId>, report: &mut ProcReport) {
        let LoadedTile { page, buffer } = tile;

        if self.handle.lock_status().get(page) != PageStatus::Loading {
            self.handle.recycle(buffer);
            report.discarded += 1;
            self.totals.discarded += 1;
            return;
        }

        // Layout is checked before any slot is touched.
        if let Err(e) = self.slots.accepts(&buffer) {
            self.reject(page, buffer, e, report);
            return;
        }

        let Some(slot) = self.acquire_slot(page, in_flight, report) else {
            if self.needed.contains(&page) {
                self.deferred.push(LoadedTile { page, buffer });
                report.deferred += 1;
            } else {
                self.handle.lock_status().set(page, PageStatus::Empty);
                self.handle.recycle(buffer);
                report.discarded += 1;
                self.totals.discarded += 1;
            }
            return;
        };

        match self.slots.commit(slot, &buffer) {
            Ok(()) => {
                self.index.propagate(&self.tree, page, slot);
                self.handle.lock_status().set(page, PageStatus::Resident);
                report.committed += 1;
                self.totals.commits += 1;
                log::trace!("Committed page {} to slot {}", self.tree.coord(page), slot);
                self.handle.recycle(buffer);
            }
            Err(e) => self.reject(page, buffer, e, report),
        }
    }

    fn reject(&mut self, page: PageId, buffer: TileBuffer, error: TileError, report: &mut ProcReport) {
        log::warn!("Rejected page {}: {}", self.tree.coord(page), error);
        self.handle.lock_status().set(page, PageStatus::Missing);
        self.handle.recycle(buffer);
        report.failed += 1;
        self.totals.failures += 1;
    }

    /// Reserve a slot for `page`, evicting the best victim if the pool is full
    fn acquire_slot(&mut self, page: PageId, in_flight: &HashSet<PageId>, report: &mut ProcReport) -> Option<u32> {
        if let Some(slot) = self.slots.reserve(page) {
            return Some(slot);
        }

        // Nearest resident fallback of every fetch still in flight.
        let protected: HashSet<u32> = in_flight
            .iter()
            .filter(|&&other| other != page)
            .filter_map(|&other| self.tree.parent(other))
            .filter_map(|parent| self.index.resolve(parent))
            .map(|entry| entry.slot)
            .collect();

        let needed = &self.needed;
        let victim = self
            .slots
            .lru_victim(|slot, resident| !needed.contains(&resident) && !protected.contains(&slot))?;
        let evicted = self.slots.evict(victim)?;

        self.index.restore(&self.tree, evicted, victim);
        self.handle.lock_status().set(evicted, PageStatus::Evicted);
        self.evicted.push(evicted);
        report.evicted += 1;
        self.totals.evictions += 1;

        self.slots.reserve(page)
    }

    /// Push changed slots and, if it changed, the index to `sink`
    ///
    /// Returns the number of tiles uploaded.
    pub fn upload<S: UploadSink<F>>(&mut self, sink: &mut S) -> usize {
        let dirty = self.slots.take_dirty();
        for &slot in &dirty {
            sink.upload_tile(slot, self.slots.origin(slot), self.slots.slot(slot).pixels());
        }
        if self.index.take_dirty() {
            sink.upload_index(self.index.entries());
        }
        dirty.len()
    }

    pub fn status(&self, page: PageId) -> PageStatus {
        self.handle.status(page)
    }

    /// Slot and depth a page currently samples from
    pub fn resolve(&self, page: PageId) -> Option<IndexEntry> {
        self.index.resolve(page)
    }

    /// Slot holding `page`, if resident
    pub fn slot_of(&self, page: PageId) -> Option<u32> {
        self.slots.slot_of(page)
    }

    /// Mark a resident page as used this frame
    pub fn touch(&mut self, page: PageId) -> bool {
        self.slots.touch(page)
    }

    /// Allow a Missing page to be requested again
    pub fn retry_missing(&mut self, page: PageId) -> bool {
        let mut status = self.handle.lock_status();
        if status.get(page) != PageStatus::Missing {
            return false;
        }
        status.set(page, PageStatus::Empty);
        true
    }

    /// Allow every Missing page to be requested again
    pub fn retry_all_missing(&mut self) -> usize {
        let cleared = self.handle.lock_status().clear_missing();
        if cleared > 0 {
            log::info!("Retrying {} missing pages", cleared);
        }
        cleared
    }

    pub fn resident_slot_count(&self) -> usize {
        self.slots.resident_count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn tree(&self) -> &Arc<PageTree> {
        &self.tree
    }

    pub fn handle(&self) -> &CacheHandle {
        &self.handle
    }

    pub fn index(&self) -> &PageIndex {
        &self.index
    }

    pub fn slots(&self) -> &SlotTable<F> {
        &self.slots
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> CacheStats {
        let (loading, missing) = {
            let status = self.handle.lock_status();
            (status.count(PageStatus::Loading), status.count(PageStatus::Missing))
        };
        CacheStats {
            frame: self.frame,
            capacity: self.slots.capacity(),
            resident: self.slots.resident_count(),
            loading,
            missing,
            deferred: self.deferred.len(),
            pending_needs: self.handle.pending_needs(),
            needed: self.needed.len(),
            commits: self.totals.commits,
            evictions: self.totals.evictions,
            discarded: self.totals.discarded,
            failures: self.totals.failures,
            utilization: self.slots.utilization(),
        }
    }

    /// Stop the loaders and drop pending work
    ///
    /// Blocks until every loader has finished its current fetch.
    pub fn shutdown(&mut self) {
        if self.handle.is_shutdown() {
            return;
        }
        let loads = self.loaders.shutdown();
        for tile in self.deferred.drain(..) {
            self.handle.recycle(tile.buffer);
        }
        log::debug!(
            "Page cache ({}) shut down after {} frames, loaders serviced {} pages ({} failed)",
            F::NAME,
            self.frame,
            loads.loaded + loads.failed,
            loads.failed
        );
    }
}

impl<F: TileFormat> Drop for Cache<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
