//! Heap segments: collections of slotted pages holding variable-length
//! records addressed by TID.

use crate::buffer_pool::BufferManager;
use crate::error::Result;
use crate::page::SlottedPage;
use crate::wal::LogManager;
use crate::{PageId, Tid, TxnId};

/// A heap segment. Pages are appended as records arrive and never shrink;
/// the collaborating buffer pool and log manager are passed per call.
pub struct HeapSegment {
    /// Segment id, the high 16 bits of every page id in this segment.
    pub segment_id: u16,
    /// Number of pages allocated so far.
    pub page_count: u64,
}

impl HeapSegment {
    pub fn new(segment_id: u16) -> Self {
        HeapSegment {
            segment_id,
            page_count: 0,
        }
    }

    /// Allocates a slot of `record_size` bytes on the first page that can
    /// hold it, appending a fresh page when none can.
    pub fn allocate(&mut self, record_size: u32, buffer_manager: &mut BufferManager) -> Result<Tid> {
        for segment_page in 0..self.page_count {
            let page_id = BufferManager::overall_page_id(self.segment_id, segment_page);
            let frame_id = buffer_manager.fix_page(page_id, true)?;

            let free_space =
                SlottedPage::new(buffer_manager.frame_mut(frame_id).data_mut()).free_space();
            if free_space < record_size {
                buffer_manager.unfix_page(frame_id, false);
                continue;
            }

            let tid = SlottedPage::new(buffer_manager.frame_mut(frame_id).data_mut())
                .add_slot(record_size);
            buffer_manager.unfix_page(frame_id, true);
            return Ok(tid);
        }

        let page_id = BufferManager::overall_page_id(self.segment_id, self.page_count);
        self.page_count += 1;
        crate::basalt_debug_log!(
            "[HeapSegment::allocate] Appending page {page_id} to segment {}",
            self.segment_id
        );

        let frame_id = buffer_manager.fix_page(page_id, true)?;
        let mut page = SlottedPage::format(buffer_manager.frame_mut(frame_id).data_mut());
        page.set_overall_page_id(page_id);
        let tid = page.add_slot(record_size);
        buffer_manager.unfix_page(frame_id, true);

        Ok(tid)
    }

    /// Copies the record behind `tid` into `record` and returns its stored
    /// length. The output buffer must hold the whole record; anything
    /// smaller is a caller bug.
    pub fn read(
        &self,
        tid: Tid,
        record: &mut [u8],
        buffer_manager: &mut BufferManager,
    ) -> Result<u32> {
        let page_id = BufferManager::overall_page_id(self.segment_id, tid.segment_page_id());
        let frame_id = buffer_manager.fix_page(page_id, false)?;

        let page = SlottedPage::new(buffer_manager.frame_mut(frame_id).data_mut());
        let slot = page.slot(tid.slot_id());
        let length = slot.length();
        if (record.len() as u32) < length {
            panic!(
                "read buffer of {} bytes cannot hold the {length}-byte record at {tid}",
                record.len()
            );
        }
        record[..length as usize].copy_from_slice(page.record(slot));

        buffer_manager.unfix_page(frame_id, false);
        Ok(length)
    }

    /// Overwrites the record behind `tid` in place and logs the update with
    /// its before and after images. Growing or shrinking a record is not
    /// supported here.
    pub fn write(
        &mut self,
        tid: Tid,
        record: &[u8],
        txn_id: TxnId,
        buffer_manager: &mut BufferManager,
        log_manager: &mut LogManager,
    ) -> Result<()> {
        let page_id = BufferManager::overall_page_id(self.segment_id, tid.segment_page_id());
        let frame_id = buffer_manager.fix_page(page_id, true)?;

        let slot =
            SlottedPage::new(buffer_manager.frame_mut(frame_id).data_mut()).slot(tid.slot_id());
        let start = slot.offset() as usize;

        let data = buffer_manager.frame_mut(frame_id).data_mut();
        let before = data[start..start + record.len()].to_vec();
        data[start..start + record.len()].copy_from_slice(record);
        buffer_manager.unfix_page(frame_id, true);

        log_manager.log_update(
            txn_id,
            page_id,
            record.len() as u64,
            u64::from(slot.offset()),
            &before,
            record,
        )?;
        Ok(())
    }

    /// Composite page id of the page holding `tid`.
    pub fn page_id_of(&self, tid: Tid) -> PageId {
        BufferManager::overall_page_id(self.segment_id, tid.segment_page_id())
    }
}
