//! Reusable tile buffers shared by the loaders
//!
//! Loaders fill a checked-out buffer, hand it to the cache, and the cache
//! returns it once the pixels are copied into a slot. A fixed buffer count
//! bounds the memory held by in-flight loads; a loader that finds the pool
//! empty waits until one comes back.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// Raw bytes of one tile plus the layout the source reported
#[derive(Debug, Default)]
pub struct TileBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u32,
}

impl TileBuffer {
    /// Create an empty buffer with room for `bytes` bytes
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            ..Default::default()
        }
    }

    /// Set the tile layout and return `len` zeroed bytes to fill
    ///
    /// The backing allocation is kept between uses.
    pub fn write(&mut self, width: u32, height: u32, channels: u32, len: usize) -> &mut [u8] {
        self.width = width;
        self.height = height;
        self.channels = channels;
        self.data.clear();
        self.data.resize(len, 0);
        &mut self.data
    }

    /// Forget the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
        self.channels = 0;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fixed set of tile buffers with blocking checkout
pub struct BufferPool {
    free: Mutex<Vec<TileBuffer>>,
    returned: Condvar,
    capacity: usize,
}

impl BufferPool {
    /// Allocate `count` buffers of `bytes_per_buffer` bytes each
    pub fn new(count: usize, bytes_per_buffer: usize) -> Self {
        let free = (0..count)
            .map(|_| TileBuffer::with_capacity(bytes_per_buffer))
            .collect();
        Self {
            free: Mutex::new(free),
            returned: Condvar::new(),
            capacity: count,
        }
    }

    /// Take a buffer if one is free
    pub fn try_checkout(&self) -> Option<TileBuffer> {
        self.free.lock().pop()
    }

    /// Take a buffer, waiting for one to be returned
    ///
    /// Returns `None` once `shutdown` is set.
    pub fn checkout(&self, shutdown: &AtomicBool) -> Option<TileBuffer> {
        let mut free = self.free.lock();
        loop {
            if shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(buffer) = free.pop() {
                return Some(buffer);
            }
            self.returned.wait(&mut free);
        }
    }

    /// Return a buffer and wake one waiting loader
    pub fn checkin(&self, mut buffer: TileBuffer) {
        buffer.clear();
        self.free.lock().push(buffer);
        self.returned.notify_one();
    }

    /// Wake every waiter so it can observe shutdown
    pub fn wake_all(&self) {
        // Taking the lock orders the wakeup after any waiter's flag check.
        let _free = self.free.lock();
        self.returned.notify_all();
    }

    /// Buffers currently available
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
