//! The write-ahead log manager and ARIES-style recovery.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::buffer_pool::BufferManager;
use crate::error::{Result, StorageError};
use crate::file::BlockFile;
use crate::{PageId, TxnId};

/// Conventional file name of the log inside a database directory.
pub const LOG_FILE_NAME: &str = "wal.log";

/// Fixed header preceding every serialized record on the log file:
/// total record length (header included) and a CRC of the payload.
const RECORD_HEADER_SIZE: usize = 8;

/// A single record on the log tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    /// A transaction started.
    Begin { txn_id: TxnId },
    /// A transaction committed; all of its pages are on disk (FORCE).
    Commit { txn_id: TxnId },
    /// A transaction aborted; its effects have been rolled back.
    Abort { txn_id: TxnId },
    /// An in-place record update, with both images for undo and redo.
    Update {
        txn_id: TxnId,
        page_id: PageId,
        length: u64,
        offset: u64,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    /// A checkpoint: every dirty page was flushed; these transactions were
    /// active at the time.
    Checkpoint { active_txns: BTreeSet<TxnId> },
}

/// Discriminant of a `LogRecord`, used for the per-type counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogRecordType {
    Begin,
    Commit,
    Abort,
    Update,
    Checkpoint,
}

impl LogRecord {
    pub fn record_type(&self) -> LogRecordType {
        match self {
            LogRecord::Begin { .. } => LogRecordType::Begin,
            LogRecord::Commit { .. } => LogRecordType::Commit,
            LogRecord::Abort { .. } => LogRecordType::Abort,
            LogRecord::Update { .. } => LogRecordType::Update,
            LogRecord::Checkpoint { .. } => LogRecordType::Checkpoint,
        }
    }
}

/// A before-image captured from an UPDATE record, ready to be copied back
/// onto its page.
struct UndoImage {
    page_id: PageId,
    offset: u64,
    before: Vec<u8>,
}

/// The log manager. Appends records to a single log file and drives
/// rollback and crash recovery against the buffer pool.
pub struct LogManager {
    log_file: BlockFile,
    current_offset: u64,
    txn_id_to_first_record: BTreeMap<TxnId, u64>,
    record_counts: BTreeMap<LogRecordType, u64>,
}

impl LogManager {
    pub fn new(log_file: BlockFile) -> Self {
        LogManager {
            log_file,
            current_offset: 0,
            txn_id_to_first_record: BTreeMap::new(),
            record_counts: BTreeMap::new(),
        }
    }

    /// Replaces the log file handle and clears all in-memory state. Used to
    /// simulate a crash; pages are untouched.
    pub fn reset(&mut self, log_file: BlockFile) {
        self.log_file = log_file;
        self.current_offset = 0;
        self.txn_id_to_first_record.clear();
        self.record_counts.clear();
    }

    pub fn total_log_records(&self) -> u64 {
        self.record_counts.values().sum()
    }

    pub fn total_log_records_of_type(&self, record_type: LogRecordType) -> u64 {
        self.record_counts.get(&record_type).copied().unwrap_or(0)
    }

    /// Appends a BEGIN record and remembers its offset for rollback.
    pub fn log_txn_begin(&mut self, txn_id: TxnId) -> Result<()> {
        let offset = self.append(&LogRecord::Begin { txn_id })?;
        self.txn_id_to_first_record.insert(txn_id, offset);
        Ok(())
    }

    pub fn log_commit(&mut self, txn_id: TxnId) -> Result<()> {
        self.append(&LogRecord::Commit { txn_id })?;
        self.txn_id_to_first_record.remove(&txn_id);
        Ok(())
    }

    /// Rolls the transaction back, then appends the ABORT record.
    pub fn log_abort(&mut self, txn_id: TxnId, buffer_manager: &mut BufferManager) -> Result<()> {
        self.rollback_txn(txn_id, buffer_manager)?;
        self.append(&LogRecord::Abort { txn_id })?;
        self.txn_id_to_first_record.remove(&txn_id);
        Ok(())
    }

    pub fn log_update(
        &mut self,
        txn_id: TxnId,
        page_id: PageId,
        length: u64,
        offset: u64,
        before: &[u8],
        after: &[u8],
    ) -> Result<()> {
        self.append(&LogRecord::Update {
            txn_id,
            page_id,
            length,
            offset,
            before: before.to_vec(),
            after: after.to_vec(),
        })?;
        Ok(())
    }

    /// Flushes every dirty page, then appends a CHECKPOINT record carrying
    /// the currently active transactions.
    pub fn log_checkpoint(&mut self, buffer_manager: &mut BufferManager) -> Result<()> {
        buffer_manager.flush_all_pages()?;
        let active_txns: BTreeSet<TxnId> =
            self.txn_id_to_first_record.keys().copied().collect();
        self.append(&LogRecord::Checkpoint { active_txns })?;
        Ok(())
    }

    /// Restores the before-image of every UPDATE the transaction wrote.
    ///
    /// The records are collected by a forward walk from the transaction's
    /// BEGIN offset and applied newest-first, so a slot updated repeatedly
    /// ends at its oldest pre-modification state. Applying the rollback a
    /// second time rewrites the same bytes.
    pub fn rollback_txn(&mut self, txn_id: TxnId, buffer_manager: &mut BufferManager) -> Result<()> {
        let start = match self.txn_id_to_first_record.get(&txn_id) {
            Some(&offset) => offset,
            None => panic!("transaction {txn_id} has no begin record in the log"),
        };
        crate::basalt_debug_log!("[LogManager::rollback_txn] Rolling back txn {txn_id}");

        let mut undo_images = Vec::new();
        let mut offset = start;
        while offset < self.current_offset {
            let (record, next_offset) = self.read_record_at(offset)?;
            if let LogRecord::Update {
                txn_id: record_txn,
                page_id,
                offset: page_offset,
                before,
                ..
            } = record
            {
                if record_txn == txn_id {
                    undo_images.push(UndoImage {
                        page_id,
                        offset: page_offset,
                        before,
                    });
                }
            }
            offset = next_offset;
        }

        apply_undo_images(&undo_images, buffer_manager)
    }

    /// Recovers the database from the log: analysis, redo, undo.
    ///
    /// The whole tape is rescanned from offset 0; redo is idempotent, so a
    /// checkpoint only marks a point where pages were flushed and needs no
    /// replay of its own. Counters and the begin-offset map are rebuilt,
    /// and the append position moves to the log tail.
    pub fn recovery(&mut self, buffer_manager: &mut BufferManager) -> Result<()> {
        let log_size = self.log_file.size()?;
        self.current_offset = log_size;

        // Analysis: replay the tape to find transaction outcomes.
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < log_size {
            let (record, next_offset) = self.read_record_at(offset)?;
            records.push((offset, record));
            offset = next_offset;
        }

        for (record_offset, record) in &records {
            *self.record_counts.entry(record.record_type()).or_insert(0) += 1;
            match record {
                LogRecord::Begin { txn_id } => {
                    self.txn_id_to_first_record.insert(*txn_id, *record_offset);
                }
                LogRecord::Commit { txn_id } | LogRecord::Abort { txn_id } => {
                    self.txn_id_to_first_record.remove(txn_id);
                }
                LogRecord::Update { .. } | LogRecord::Checkpoint { .. } => {}
            }
        }
        crate::basalt_debug_log!(
            "[LogManager::recovery] Analysis found {} records, {} active txns",
            records.len(),
            self.txn_id_to_first_record.len()
        );

        // Redo: apply every after-image in log order; an ABORT record
        // compensates for its transaction on the spot, so effects that
        // reached disk before an abort are undone as well.
        let mut txn_updates: HashMap<TxnId, Vec<UndoImage>> = HashMap::new();
        for (_, record) in &records {
            match record {
                LogRecord::Update {
                    txn_id,
                    page_id,
                    offset: page_offset,
                    before,
                    after,
                    ..
                } => {
                    let frame_id = buffer_manager.fix_page(*page_id, true)?;
                    let start = *page_offset as usize;
                    buffer_manager.frame_mut(frame_id).data_mut()[start..start + after.len()]
                        .copy_from_slice(after);
                    buffer_manager.unfix_page(frame_id, true);

                    txn_updates.entry(*txn_id).or_default().push(UndoImage {
                        page_id: *page_id,
                        offset: *page_offset,
                        before: before.clone(),
                    });
                }
                LogRecord::Abort { txn_id } => {
                    if let Some(images) = txn_updates.get(txn_id) {
                        apply_undo_images(images, buffer_manager)?;
                    }
                }
                _ => {}
            }
        }

        // Undo: roll back the transactions that were active at the crash.
        for txn_id in self.txn_id_to_first_record.keys() {
            if let Some(images) = txn_updates.get(txn_id) {
                apply_undo_images(images, buffer_manager)?;
            }
        }

        Ok(())
    }

    /// Serializes a record, prefixes the length+CRC header, and appends the
    /// whole thing at `current_offset`. Returns the record's offset.
    fn append(&mut self, record: &LogRecord) -> Result<u64> {
        let payload = bincode::serialize(record).unwrap();
        let total_len = (RECORD_HEADER_SIZE + payload.len()) as u32;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut bytes = Vec::with_capacity(total_len as usize);
        bytes.extend_from_slice(&total_len.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&payload);

        let offset = self.current_offset;
        let end = offset + u64::from(total_len);
        if self.log_file.size()? < end {
            self.log_file.resize(end)?;
        }
        self.log_file.write_block(&bytes, offset)?;
        self.current_offset = end;

        *self.record_counts.entry(record.record_type()).or_insert(0) += 1;
        Ok(offset)
    }

    /// Reads and verifies the record at `offset`; returns it together with
    /// the offset of the next record.
    fn read_record_at(&mut self, offset: u64) -> Result<(LogRecord, u64)> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.log_file
            .read_block(offset, &mut header)
            .map_err(|_| StorageError::CorruptLogRecord(offset))?;
        let total_len = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let crc = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if (total_len as usize) < RECORD_HEADER_SIZE {
            return Err(StorageError::CorruptLogRecord(offset));
        }

        let mut payload = vec![0u8; total_len as usize - RECORD_HEADER_SIZE];
        self.log_file
            .read_block(offset + RECORD_HEADER_SIZE as u64, &mut payload)
            .map_err(|_| StorageError::CorruptLogRecord(offset))?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != crc {
            return Err(StorageError::CorruptLogRecord(offset));
        }

        let record = bincode::deserialize(&payload)
            .map_err(|_| StorageError::CorruptLogRecord(offset))?;
        Ok((record, offset + u64::from(total_len)))
    }
}

/// Copies before-images back onto their pages, newest first.
fn apply_undo_images(images: &[UndoImage], buffer_manager: &mut BufferManager) -> Result<()> {
    for image in images.iter().rev() {
        let frame_id = buffer_manager.fix_page(image.page_id, true)?;
        let start = image.offset as usize;
        buffer_manager.frame_mut(frame_id).data_mut()[start..start + image.before.len()]
            .copy_from_slice(&image.before);
        buffer_manager.unfix_page(frame_id, true);
    }
    Ok(())
}
