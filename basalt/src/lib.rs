//! # Basalt Storage Engine
//! The storage kernel: slotted pages, a buffer pool, heap segments, and a
//! write-ahead log with ARIES-style recovery. This crate is responsible for
//! the on-disk and in-memory representation of records.

/// The buffer pool manager.
pub mod buffer_pool;
/// Error types shared by the storage layer.
pub mod error;
/// Block-granular file access.
pub mod file;
/// Heap segments of slotted pages.
pub mod heap;
/// The slotted-page layout and tuple identifiers.
pub mod page;
/// The transaction manager.
pub mod transaction;
/// The write-ahead log and recovery.
pub mod wal;

/// The default size of a single page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 8196;

/// The default number of frames in the buffer pool.
pub const DEFAULT_FRAME_COUNT: usize = 400;

/// A composite page identifier: the 16 most significant bits hold the
/// segment id, the 48 least significant bits the page within the segment.
pub type PageId = u64;

/// A transaction identifier.
pub type TxnId = u64;

/// Sentinel page id meaning "no page".
pub const INVALID_PAGE_ID: PageId = u64::MAX;

pub use buffer_pool::{BufferFrame, BufferManager};
pub use error::{Result, StorageError};
pub use heap::HeapSegment;
pub use page::{SlottedPage, Tid};
pub use transaction::TransactionManager;
pub use wal::LogManager;

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("BASALT_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! basalt_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}
