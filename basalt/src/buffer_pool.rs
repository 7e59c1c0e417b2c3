//! Manages the buffer pool, a fixed set of in-memory frames that cache
//! segment pages.

use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::file::{BlockFile, FileMode};
use crate::{INVALID_PAGE_ID, PageId};

const SEGMENT_PAGE_BITS: u32 = 48;
const SEGMENT_PAGE_MASK: u64 = (1u64 << SEGMENT_PAGE_BITS) - 1;

/// A single frame in the buffer pool. Frames are owned by the pool; callers
/// address one through the index returned by `fix_page` until the matching
/// `unfix_page`.
#[derive(Debug)]
pub struct BufferFrame {
    frame_id: usize,
    page_id: PageId,
    data: Vec<u8>,
    dirty: bool,
}

impl BufferFrame {
    fn new(frame_id: usize, page_size: usize) -> Self {
        BufferFrame {
            frame_id,
            page_id: INVALID_PAGE_ID,
            data: vec![0; page_size],
            dirty: false,
        }
    }

    pub fn frame_id(&self) -> usize {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The buffer pool manager.
///
/// There is no replacement policy: pages occupy frames in arrival order and
/// `fix_page` fails with `StorageError::BufferFull` once every frame is
/// taken. Segment files live in `base_dir`, named by the decimal segment id.
pub struct BufferManager {
    page_size: usize,
    capacity: usize,
    pool: Vec<BufferFrame>,
    page_counter: usize,
    base_dir: PathBuf,
}

impl BufferManager {
    /// Creates a pool of `capacity` frames of `page_size` bytes each.
    pub fn new<P: AsRef<Path>>(page_size: usize, capacity: usize, base_dir: P) -> Self {
        let pool = (0..capacity)
            .map(|frame_id| BufferFrame::new(frame_id, page_size))
            .collect();
        BufferManager {
            page_size,
            capacity,
            pool,
            page_counter: 0,
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The segment id held in the 16 most significant bits of a page id.
    pub const fn segment_id(page_id: PageId) -> u16 {
        (page_id >> SEGMENT_PAGE_BITS) as u16
    }

    /// The page id within its segment, the 48 least significant bits.
    pub const fn segment_page_id(page_id: PageId) -> u64 {
        page_id & SEGMENT_PAGE_MASK
    }

    /// The composite page id for a segment and a page within it.
    pub const fn overall_page_id(segment_id: u16, segment_page_id: u64) -> PageId {
        ((segment_id as u64) << SEGMENT_PAGE_BITS) | segment_page_id
    }

    /// Pins the page into a frame and returns the frame index. The page is
    /// read from its segment file unless already resident. `exclusive` is
    /// accepted for a future locking extension and unused here.
    pub fn fix_page(&mut self, page_id: PageId, _exclusive: bool) -> Result<usize> {
        if page_id == INVALID_PAGE_ID {
            panic!("fix of the invalid page id");
        }

        if let Some(frame_id) = self.frame_id_of_page(page_id) {
            return Ok(frame_id);
        }

        if self.page_counter == self.capacity {
            return Err(StorageError::BufferFull);
        }
        let frame_id = self.page_counter;
        self.page_counter += 1;
        crate::basalt_debug_log!(
            "[BufferManager::fix_page] Loading page {page_id} into frame {frame_id}"
        );

        self.pool[frame_id].page_id = page_id;
        self.pool[frame_id].dirty = false;
        self.read_frame(frame_id)?;

        Ok(frame_id)
    }

    /// Releases a pinned frame. Dirtiness is sticky: once a frame is marked
    /// dirty it stays dirty until flushed or discarded.
    pub fn unfix_page(&mut self, frame_id: usize, is_dirty: bool) {
        let frame = &mut self.pool[frame_id];
        if frame.page_id == INVALID_PAGE_ID {
            panic!("unfix of frame {frame_id}, which holds no page");
        }
        if !frame.dirty {
            frame.dirty = is_dirty;
        }
    }

    pub fn frame(&self, frame_id: usize) -> &BufferFrame {
        &self.pool[frame_id]
    }

    pub fn frame_mut(&mut self, frame_id: usize) -> &mut BufferFrame {
        &mut self.pool[frame_id]
    }

    /// The frame currently holding `page_id`, if resident.
    pub fn frame_id_of_page(&self, page_id: PageId) -> Option<usize> {
        self.pool
            .iter()
            .position(|frame| frame.page_id == page_id)
    }

    /// Writes the page back if it is resident and dirty.
    pub fn flush_page(&mut self, page_id: PageId) -> Result<()> {
        if let Some(frame_id) = self.frame_id_of_page(page_id) {
            if self.pool[frame_id].dirty {
                self.write_frame(frame_id)?;
                self.pool[frame_id].dirty = false;
            }
        }
        Ok(())
    }

    /// Drops the buffered copy of the page without writing it back.
    pub fn discard_page(&mut self, page_id: PageId) {
        if let Some(frame_id) = self.frame_id_of_page(page_id) {
            self.reset_frame(frame_id);
        }
    }

    pub fn flush_all_pages(&mut self) -> Result<()> {
        for frame_id in 0..self.capacity {
            if self.pool[frame_id].dirty {
                self.write_frame(frame_id)?;
                self.pool[frame_id].dirty = false;
            }
        }
        Ok(())
    }

    pub fn discard_all_pages(&mut self) {
        for frame_id in 0..self.capacity {
            self.reset_frame(frame_id);
        }
    }

    /// Page ids in FIFO order. Reserved for a FIFO+LRU replacement policy;
    /// the current pool never evicts.
    pub fn get_fifo_list(&self) -> Vec<PageId> {
        Vec::new()
    }

    /// Page ids in LRU order. Reserved, see `get_fifo_list`.
    pub fn get_lru_list(&self) -> Vec<PageId> {
        Vec::new()
    }

    fn reset_frame(&mut self, frame_id: usize) {
        let frame = &mut self.pool[frame_id];
        frame.page_id = INVALID_PAGE_ID;
        frame.dirty = false;
        frame.data.fill(0);
    }

    fn segment_path(&self, segment_id: u16) -> PathBuf {
        self.base_dir.join(segment_id.to_string())
    }

    fn read_frame(&mut self, frame_id: usize) -> Result<()> {
        let page_id = self.pool[frame_id].page_id;
        let path = self.segment_path(Self::segment_id(page_id));
        let mut file = BlockFile::open(path, FileMode::Write)?;

        let start = Self::segment_page_id(page_id) * self.page_size as u64;
        let file_size = file.size()?;
        let frame = &mut self.pool[frame_id];
        frame.data.fill(0);
        // The page may extend past the current segment file; the missing
        // tail stays zeroed.
        if start < file_size {
            let available = ((file_size - start) as usize).min(self.page_size);
            file.read_block(start, &mut frame.data[..available])?;
        }
        Ok(())
    }

    fn write_frame(&mut self, frame_id: usize) -> Result<()> {
        let page_id = self.pool[frame_id].page_id;
        let path = self.segment_path(Self::segment_id(page_id));
        let mut file = BlockFile::open(path, FileMode::Write)?;

        let start = Self::segment_page_id(page_id) * self.page_size as u64;
        let end = start + self.page_size as u64;
        if file.size()? < end {
            file.resize(end)?;
        }
        file.write_block(&self.pool[frame_id].data, start)?;
        Ok(())
    }
}

impl Drop for BufferManager {
    /// Writes all dirty frames back to their segment files.
    fn drop(&mut self) {
        let _ = self.flush_all_pages();
    }
}
