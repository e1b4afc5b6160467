//! Slot table - fixed W×H grid of tile slots with LRU bookkeeping
//!
//! Each slot holds one page worth of texels. Slots are laid out row-major in
//! a pool texture, so slot `s` lives at tile `(s % W, s / W)`.

use std::collections::HashMap;

use bytemuck::Zeroable;

use crate::core::error::{TileError, TileResult};
use crate::pages::PageId;
use super::buffer_pool::TileBuffer;
use super::format::TileFormat;

/// Lifecycle of a slot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Empty,
    /// Reserved for a page whose pixels are being committed
    Loading,
    Resident,
}

/// A slot in the pool
pub struct Slot<F: TileFormat> {
    /// Page held or being committed, if any
    pub page: Option<PageId>,
    pub state: SlotState,
    /// Frame number when last used (for LRU)
    pub last_access_frame: u64,
    pixels: Vec<F::Pixel>,
    dirty: bool,
}

impl<F: TileFormat> Slot<F> {
    fn new(texels: usize) -> Self {
        Self {
            page: None,
            state: SlotState::Empty,
            last_access_frame: 0,
            pixels: vec![<F::Pixel as Zeroable>::zeroed(); texels],
            dirty: false,
        }
    }

    pub fn pixels(&self) -> &[F::Pixel] {
        &self.pixels
    }
}

/// Fixed pool of tile slots
pub struct SlotTable<F: TileFormat> {
    width: u32,
    height: u32,
    page_size: u32,
    slots: Vec<Slot<F>>,
    /// Map from page -> slot index
    page_to_slot: HashMap<PageId, u32>,
    /// Free slot indices
    free_slots: Vec<u32>,
    current_frame: u64,
    resident_count: usize,
}

impl<F: TileFormat> SlotTable<F> {
    /// Create a `width` × `height` grid of slots for tiles of edge `page_size`
    pub fn new(width: u32, height: u32, page_size: u32) -> Self {
        let capacity = width * height;
        let texels = page_size as usize * page_size as usize;
        Self {
            width,
            height,
            page_size,
            slots: (0..capacity).map(|_| Slot::new(texels)).collect(),
            page_to_slot: HashMap::with_capacity(capacity as usize),
            // Reversed so slots fill in ascending order.
            free_slots: (0..capacity).rev().collect(),
            current_frame: 0,
            resident_count: 0,
        }
    }

    /// Set the frame used for LRU stamps
    pub fn begin_frame(&mut self, frame: u64) {
        self.current_frame = frame;
    }

    /// Slot holding or reserved for `page`
    pub fn slot_of(&self, page: PageId) -> Option<u32> {
        self.page_to_slot.get(&page).copied()
    }

    pub fn slot(&self, slot: u32) -> &Slot<F> {
        &self.slots[slot as usize]
    }

    /// Mark a resident page as used this frame
    pub fn touch(&mut self, page: PageId) -> bool {
        match self.page_to_slot.get(&page) {
            Some(&slot) => {
                self.slots[slot as usize].last_access_frame = self.current_frame;
                true
            }
            None => false,
        }
    }

    /// Reserve a free slot for `page`, if any
    pub fn reserve(&mut self, page: PageId) -> Option<u32> {
        let slot = self.free_slots.pop()?;
        let entry = &mut self.slots[slot as usize];
        entry.page = Some(page);
        entry.state = SlotState::Loading;
        entry.last_access_frame = self.current_frame;
        self.page_to_slot.insert(page, slot);
        Some(slot)
    }

    /// Least recently used resident slot accepted by `evictable`
    ///
    /// `evictable` receives the slot index and the page it holds. Ties on the
    /// access frame go to the lower slot index.
    pub fn lru_victim<P>(&self, evictable: P) -> Option<u32>
    where
        P: Fn(u32, PageId) -> bool,
    {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Resident)
            .filter_map(|(i, s)| s.page.map(|page| (i as u32, page, s.last_access_frame)))
            .filter(|&(slot, page, _)| evictable(slot, page))
            .min_by_key(|&(slot, _, frame)| (frame, slot))
            .map(|(slot, _, _)| slot)
    }

    /// Empty a resident slot, returning the page it held
    pub fn evict(&mut self, slot: u32) -> Option<PageId> {
        let entry = &mut self.slots[slot as usize];
        if entry.state != SlotState::Resident {
            return None;
        }
        let page = entry.page.take()?;
        entry.state = SlotState::Empty;
        entry.dirty = false;
        self.page_to_slot.remove(&page);
        self.free_slots.push(slot);
        self.resident_count -= 1;
        log::trace!("Evicted page {} from slot {}", page, slot);
        Some(page)
    }

    /// Return a reserved slot to the free list without committing
    pub fn release(&mut self, slot: u32) {
        let entry = &mut self.slots[slot as usize];
        if entry.state != SlotState::Loading {
            return;
        }
        if let Some(page) = entry.page.take() {
            self.page_to_slot.remove(&page);
        }
        entry.state = SlotState::Empty;
        self.free_slots.push(slot);
    }

    /// Check that a loaded tile has exactly the slot layout
    pub fn accepts(&self, buffer: &TileBuffer) -> TileResult<()> {
        if buffer.width() != self.page_size
            || buffer.height() != self.page_size
            || buffer.channels() != F::CHANNELS
            || buffer.len() != F::tile_bytes(self.page_size)
        {
            return Err(TileError::LayoutMismatch {
                width: buffer.width(),
                height: buffer.height(),
                channels: buffer.channels(),
            });
        }
        Ok(())
    }

    /// Copy a loaded tile into a reserved slot
    ///
    /// The buffer must match the slot's layout exactly; otherwise the slot is
    /// released and the mismatch reported.
    pub fn commit(&mut self, slot: u32, buffer: &TileBuffer) -> TileResult<()> {
        if let Err(e) = self.accepts(buffer) {
            self.release(slot);
            return Err(e);
        }

        let entry = &mut self.slots[slot as usize];
        debug_assert_eq!(entry.state, SlotState::Loading);
        bytemuck::cast_slice_mut::<F::Pixel, u8>(&mut entry.pixels).copy_from_slice(buffer.data());
        entry.state = SlotState::Resident;
        entry.last_access_frame = self.current_frame;
        entry.dirty = true;
        self.resident_count += 1;
        Ok(())
    }

    /// Resident slots written since the last call, in slot order
    pub fn take_dirty(&mut self) -> Vec<u32> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| s.dirty)
            .map(|(i, s)| {
                s.dirty = false;
                i as u32
            })
            .collect()
    }

    /// Tile position of a slot in the pool grid
    pub fn position(&self, slot: u32) -> (u32, u32) {
        (slot % self.width, slot / self.width)
    }

    /// Texel origin of a slot in the pool texture
    pub fn origin(&self, slot: u32) -> (u32, u32) {
        let (x, y) = self.position(slot);
        (x * self.page_size, y * self.page_size)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of slots holding committed pages
    pub fn resident_count(&self) -> usize {
        self.resident_count
    }

    /// Get pool utilization percentage
    pub fn utilization(&self) -> f32 {
        self.resident_count as f32 / self.capacity() as f32 * 100.0
    }
}
