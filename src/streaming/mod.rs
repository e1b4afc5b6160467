//! Out-of-core page streaming: loaders, slot pool and residency index

pub mod format;
pub mod buffer_pool;
pub mod priority;
pub mod status;
pub mod index;
pub mod slot_table;
pub mod source;
pub mod handle;
pub mod loader;
pub mod cache;

pub use format::{Color, Height, Normal, TileFormat};
pub use buffer_pool::{BufferPool, TileBuffer};
pub use priority::NeedQueue;
pub use status::PageStatus;
pub use index::{IndexEntry, PageIndex, INVALID_SLOT};
pub use slot_table::{Slot, SlotState, SlotTable};
pub use source::{FileTileSource, TileSource};
pub use handle::{CacheHandle, LoadTicket};
pub use loader::{LoadResult, LoadTotals, LoaderPool};
pub use cache::{Cache, CacheStats, ProcReport, UploadSink};
