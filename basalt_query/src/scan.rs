//! The sequential scan operator: iterates every live record of a heap
//! segment in page and slot order, decoding fixed-width integer columns.

use std::path::Path;

use basalt::buffer_pool::BufferManager;
use basalt::page::SlottedPage;
use basalt::{DEFAULT_FRAME_COUNT, DEFAULT_PAGE_SIZE, Result};

/// Comparison operators used by selectivity estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PredicateType {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A pull-based scan over the table stored in segment `table_id`. The
/// operator owns its buffer pool, so it reads whatever state the segment
/// files hold on disk.
pub struct SeqScan {
    table_id: u16,
    num_pages: u64,
    num_fields: usize,
    buffer_manager: BufferManager,
    current_page: u64,
    current_slot: u16,
}

impl SeqScan {
    pub fn new<P: AsRef<Path>>(
        table_id: u16,
        num_pages: u64,
        num_fields: usize,
        base_dir: P,
    ) -> Self {
        SeqScan {
            table_id,
            num_pages,
            num_fields,
            buffer_manager: BufferManager::new(DEFAULT_PAGE_SIZE, DEFAULT_FRAME_COUNT, base_dir),
            current_page: 0,
            current_slot: 0,
        }
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) {
        self.current_page = 0;
        self.current_slot = 0;
    }

    /// Produces the next tuple, or `None` once the segment is exhausted.
    pub fn next(&mut self) -> Result<Option<Vec<i32>>> {
        while self.current_page < self.num_pages {
            let page_id = BufferManager::overall_page_id(self.table_id, self.current_page);
            let frame_id = self.buffer_manager.fix_page(page_id, false)?;

            let mut tuple = None;
            {
                let page = SlottedPage::new(self.buffer_manager.frame_mut(frame_id).data_mut());
                let slot_count = page.header().slot_count;
                while self.current_slot < slot_count {
                    let slot = page.slot(self.current_slot);
                    self.current_slot += 1;
                    if slot.is_free() {
                        continue;
                    }
                    tuple = Some(decode_fields(page.record(slot), self.num_fields));
                    break;
                }
            }
            self.buffer_manager.unfix_page(frame_id, false);

            if tuple.is_some() {
                return Ok(tuple);
            }
            self.current_page += 1;
            self.current_slot = 0;
        }
        Ok(None)
    }
}

fn decode_fields(record: &[u8], num_fields: usize) -> Vec<i32> {
    record
        .chunks_exact(4)
        .take(num_fields)
        .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}
