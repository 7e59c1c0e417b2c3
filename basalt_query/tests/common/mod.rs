//! Shared helpers for the statistics and optimizer scenario tests: random
//! table population and growth-shape checks over cost sequences.

use std::path::Path;

use basalt::buffer_pool::BufferManager;
use basalt::file::{BlockFile, FileMode};
use basalt::heap::HeapSegment;
use basalt::wal::{LOG_FILE_NAME, LogManager};
use basalt::{DEFAULT_FRAME_COUNT, DEFAULT_PAGE_SIZE};
use basalt_query::catalog::{CATALOG_FILE_NAME, Catalog};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fills segment `table_id` with `num_tuples` rows of `num_cols` random
/// 32-bit fields drawn from `[1, max_rand)`, flushes everything, records
/// the table in the catalog file, and returns the page count.
pub fn populate_table(
    base_dir: &Path,
    table_id: u16,
    num_tuples: u32,
    num_cols: usize,
    max_rand: u32,
) -> u64 {
    let mut bm = BufferManager::new(DEFAULT_PAGE_SIZE, DEFAULT_FRAME_COUNT, base_dir);
    let log_file = BlockFile::open(base_dir.join(LOG_FILE_NAME), FileMode::Write).unwrap();
    let mut wal = LogManager::new(log_file);
    let mut heap = HeapSegment::new(table_id);
    let mut rng = StdRng::seed_from_u64(u64::from(table_id));

    let tuple_size = 4 * num_cols;
    let mut tuple = vec![0u8; tuple_size];
    for _ in 0..num_tuples {
        for col in 0..num_cols {
            let field: i32 = rng.gen_range(1..max_rand) as i32;
            tuple[col * 4..col * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
        let tid = heap.allocate(tuple_size as u32, &mut bm).unwrap();
        heap.write(tid, &tuple, 0, &mut bm, &mut wal).unwrap();
    }
    bm.flush_all_pages().unwrap();

    let mut catalog = Catalog::new();
    catalog.set_num_heap_pages(table_id, heap.page_count);
    let mut catalog_file =
        BlockFile::open(base_dir.join(CATALOG_FILE_NAME), FileMode::Write).unwrap();
    catalog.save_table(table_id, &mut catalog_file).unwrap();

    heap.page_count
}

fn diffs(sequence: &[f64]) -> Vec<f64> {
    sequence.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// True when the sequence is constant up to a standard deviation of one.
pub fn check_constant(sequence: &[f64]) -> bool {
    let len = sequence.len() as f64;
    let mean = sequence.iter().sum::<f64>() / len;
    let variance = sequence
        .iter()
        .map(|value| (value - mean) * (value - mean))
        .sum::<f64>()
        / len;
    variance.sqrt() < 1.0
}

/// True when consecutive differences are constant.
pub fn check_linear(sequence: &[f64]) -> bool {
    check_constant(&diffs(sequence))
}

/// True when consecutive differences grow linearly.
pub fn check_quadratic(sequence: &[f64]) -> bool {
    check_linear(&diffs(sequence))
}
