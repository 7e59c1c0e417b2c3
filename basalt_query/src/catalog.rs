//! The table catalog: how many heap pages each table occupies, with a tiny
//! fixed-size on-disk record per table.

use std::collections::BTreeMap;
use std::io;

use basalt::file::BlockFile;

/// Conventional file name of the catalog inside a database directory.
pub const CATALOG_FILE_NAME: &str = "catalog";

/// Serialized size of one catalog record: table id and page count.
pub const CATALOG_RECORD_SIZE: usize = 16;

/// Maps table ids to their heap page counts. The backing file is an
/// explicit handle owned by the caller, never process-global state.
#[derive(Debug, Default)]
pub struct Catalog {
    pages: BTreeMap<u16, u64>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn num_heap_pages(&self, table_id: u16) -> u64 {
        self.pages.get(&table_id).copied().unwrap_or(0)
    }

    pub fn set_num_heap_pages(&mut self, table_id: u16, num_pages: u64) {
        self.pages.insert(table_id, num_pages);
    }

    /// Writes the record for one table at offset 0 of the catalog file.
    pub fn save_table(&self, table_id: u16, file: &mut BlockFile) -> io::Result<()> {
        let mut record = [0u8; CATALOG_RECORD_SIZE];
        record[0..8].copy_from_slice(&u64::from(table_id).to_le_bytes());
        record[8..16].copy_from_slice(&self.num_heap_pages(table_id).to_le_bytes());

        if file.size()? < CATALOG_RECORD_SIZE as u64 {
            file.resize(CATALOG_RECORD_SIZE as u64)?;
        }
        file.write_block(&record, 0)
    }

    /// Reads the record at offset 0 back as (table id, page count).
    pub fn load_table(file: &mut BlockFile) -> io::Result<(u16, u64)> {
        let mut record = [0u8; CATALOG_RECORD_SIZE];
        file.read_block(0, &mut record)?;
        let table_id = u64::from_le_bytes(record[0..8].try_into().unwrap()) as u16;
        let num_pages = u64::from_le_bytes(record[8..16].try_into().unwrap());
        Ok((table_id, num_pages))
    }
}
