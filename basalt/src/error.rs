use thiserror::Error;

/// Errors surfaced by the storage layer.
///
/// Caller bugs (fixing an invalid page id, operating on an unknown
/// transaction, allocating a record larger than a page) are not represented
/// here; they panic at the call site.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Every frame already holds a different page and no eviction policy is
    /// in place.
    #[error("buffer pool exhausted: no available frames")]
    BufferFull,

    /// A log record failed its checksum or could not be decoded. Fatal at
    /// recovery time.
    #[error("corrupt log record at offset {0}")]
    CorruptLogRecord(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
