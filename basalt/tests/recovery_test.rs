//! End-to-end write-ahead-log scenarios: commit durability, abort rollback,
//! and crash recovery with interleaved transactions and checkpoints.

use basalt::buffer_pool::BufferManager;
use basalt::file::{BlockFile, FileMode};
use basalt::heap::HeapSegment;
use basalt::page::SlottedPage;
use basalt::transaction::TransactionManager;
use basalt::wal::{LOG_FILE_NAME, LogManager, LogRecordType};
use basalt::{Tid, TxnId};
use tempfile::{TempDir, tempdir};

const PAGE_SIZE: usize = 128;
const FRAME_COUNT: usize = 10;
const HEAP_SEGMENT: u16 = 123;
const TABLE_ID: u64 = 101;

struct Db {
    dir: TempDir,
    bm: BufferManager,
    wal: LogManager,
    tm: TransactionManager,
    heap: HeapSegment,
}

fn open_db() -> Db {
    let dir = tempdir().unwrap();
    let bm = BufferManager::new(PAGE_SIZE, FRAME_COUNT, dir.path());
    let log_file = BlockFile::open(dir.path().join(LOG_FILE_NAME), FileMode::Write).unwrap();
    let wal = LogManager::new(log_file);
    Db {
        dir,
        bm,
        wal,
        tm: TransactionManager::new(),
        heap: HeapSegment::new(HEAP_SEGMENT),
    }
}

fn log_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join(LOG_FILE_NAME)
}

/// Inserts a (table_id, field) row under the given transaction and records
/// the touched page with the transaction manager.
fn insert_row(db: &mut Db, txn_id: TxnId, field: u64) {
    let mut tuple = [0u8; 16];
    tuple[0..8].copy_from_slice(&TABLE_ID.to_le_bytes());
    tuple[8..16].copy_from_slice(&field.to_le_bytes());

    let tid = db.heap.allocate(tuple.len() as u32, &mut db.bm).unwrap();
    db.heap
        .write(tid, &tuple, txn_id, &mut db.bm, &mut db.wal)
        .unwrap();
    db.tm.add_modified_page(txn_id, db.heap.page_id_of(tid));
}

/// Scans the whole segment and checks that `field` occurs exactly once or
/// not at all, as requested.
fn look(db: &mut Db, field: u64, should_be_present: bool) -> bool {
    let mut count = 0;
    for segment_page in 0..db.heap.page_count {
        let page_id = BufferManager::overall_page_id(HEAP_SEGMENT, segment_page);
        let frame_id = db.bm.fix_page(page_id, false).unwrap();
        let slot_count =
            SlottedPage::new(db.bm.frame_mut(frame_id).data_mut())
                .header()
                .slot_count;

        for slot_id in 0..slot_count {
            let tid = Tid::new(segment_page, slot_id);
            let mut tuple = [0u8; 16];
            db.heap.read(tid, &mut tuple, &mut db.bm).unwrap();
            let stored = u64::from_le_bytes(tuple[8..16].try_into().unwrap());
            if stored == field {
                count += 1;
            }
        }
        db.bm.unfix_page(frame_id, false);
    }

    if count > 1 {
        return false;
    }
    if should_be_present { count == 1 } else { count == 0 }
}

/// One committed transaction inserting two rows, with a flush in between so
/// the pages hit disk at different times.
fn do_insert(db: &mut Db, field_1: u64, field_2: u64) {
    let txn_id = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(db, txn_id, field_1);
    db.bm.flush_all_pages().unwrap();
    insert_row(db, txn_id, field_2);
    db.tm.commit_txn(txn_id, &mut db.wal, &mut db.bm).unwrap();
}

/// One aborted transaction inserting two rows. The flush before the abort
/// forces dirty pages out, defeating NO-STEAL so the rollback has work.
fn dont_insert(db: &mut Db, field_1: u64, field_2: u64) {
    let txn_id = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(db, txn_id, field_1);
    insert_row(db, txn_id, field_2);
    flush_and_abort(db, txn_id);
}

fn flush_and_abort(db: &mut Db, txn_id: TxnId) {
    db.bm.flush_all_pages().unwrap();
    db.tm.abort_txn(txn_id, &mut db.wal, &mut db.bm).unwrap();
}

/// Simulates a crash: drop every buffered page, reset the log and
/// transaction managers, and run recovery over the surviving log file.
fn crash(db: &mut Db) {
    db.bm.discard_all_pages();
    let log_file = BlockFile::open(log_path(&db.dir), FileMode::Write).unwrap();
    db.wal.reset(log_file);
    db.tm.reset(&mut db.bm);
    db.wal.recovery(&mut db.bm).unwrap();
}

#[test]
fn one_committed_transaction_writes_four_log_records() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);

    assert_eq!(db.wal.total_log_records(), 4);
    assert_eq!(db.wal.total_log_records_of_type(LogRecordType::Update), 2);
}

#[test]
fn flushed_rows_survive_a_buffer_discard() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);

    assert!(look(&mut db, 5, true));
    assert!(look(&mut db, 10, true));
    assert!(look(&mut db, 3, false));

    let txn_id = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_id, 3);
    db.bm.flush_all_pages().unwrap();
    db.bm.discard_all_pages();

    assert!(look(&mut db, 3, true));
}

#[test]
fn committed_rows_survive_a_crash() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);

    crash(&mut db);

    assert!(look(&mut db, 5, true));
    assert!(look(&mut db, 10, true));
    assert!(look(&mut db, 3, false));
}

#[test]
fn aborted_rows_are_rolled_back_even_when_forced_to_disk() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);
    dont_insert(&mut db, 3, 4);

    assert!(look(&mut db, 5, true));
    assert!(look(&mut db, 10, true));
    assert!(look(&mut db, 3, false));
    assert!(look(&mut db, 4, false));
}

#[test]
fn interleaved_commit_and_abort_keep_only_committed_rows() {
    let mut db = open_db();

    let txn_1 = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_1, 5);

    let txn_2 = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_2, 3);
    insert_row(&mut db, txn_2, 4);
    db.tm.commit_txn(txn_2, &mut db.wal, &mut db.bm).unwrap();

    insert_row(&mut db, txn_1, 10);
    flush_and_abort(&mut db, txn_1);

    assert!(look(&mut db, 3, true));
    assert!(look(&mut db, 4, true));
    assert!(look(&mut db, 5, false));
    assert!(look(&mut db, 10, false));
}

#[test]
fn aborted_rows_stay_rolled_back_after_a_crash() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);
    dont_insert(&mut db, 3, 4);

    assert!(look(&mut db, 5, true));
    assert!(look(&mut db, 10, true));
    assert!(look(&mut db, 3, false));
    assert!(look(&mut db, 4, false));

    crash(&mut db);

    assert!(look(&mut db, 5, true));
    assert!(look(&mut db, 10, true));
    assert!(look(&mut db, 3, false));
    assert!(look(&mut db, 4, false));
}

#[test]
fn commit_abort_commit_then_crash_keeps_both_committed_transactions() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);
    dont_insert(&mut db, 3, 4);
    do_insert(&mut db, 1, 2);

    for (field, present) in [(5, true), (10, true), (3, false), (4, false), (1, true), (2, true)] {
        assert!(look(&mut db, field, present), "field {field} before crash");
    }

    crash(&mut db);

    for (field, present) in [(5, true), (10, true), (3, false), (4, false), (1, true), (2, true)] {
        assert!(look(&mut db, field, present), "field {field} after crash");
    }
}

#[test]
fn uncommitted_rows_vanish_after_a_crash() {
    let mut db = open_db();

    let txn_id = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_id, 5);
    db.bm.flush_all_pages().unwrap();
    insert_row(&mut db, txn_id, 10);

    crash(&mut db);

    assert!(look(&mut db, 5, false));
    assert!(look(&mut db, 10, false));
}

#[test]
fn crash_with_open_transactions_around_a_commit_keeps_only_the_commit() {
    let mut db = open_db();

    let txn_1 = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_1, 5);
    db.bm.flush_all_pages().unwrap();

    do_insert(&mut db, 3, 4);

    let txn_3 = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_3, 10);
    db.bm.flush_all_pages().unwrap();

    crash(&mut db);

    assert!(look(&mut db, 5, false));
    assert!(look(&mut db, 10, false));
    assert!(look(&mut db, 3, true));
    assert!(look(&mut db, 4, true));
}

#[test]
fn recovery_replays_correctly_across_a_checkpoint() {
    let mut db = open_db();

    let txn_1 = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_1, 5);
    db.bm.flush_all_pages().unwrap();

    do_insert(&mut db, 3, 4);

    db.wal.log_checkpoint(&mut db.bm).unwrap();

    let txn_3 = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_3, 10);
    db.bm.flush_all_pages().unwrap();

    crash(&mut db);

    assert!(look(&mut db, 5, false));
    assert!(look(&mut db, 10, false));
    assert!(look(&mut db, 3, true));
    assert!(look(&mut db, 4, true));
    assert_eq!(db.wal.total_log_records_of_type(LogRecordType::Checkpoint), 1);
}

#[test]
fn rollback_is_idempotent() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);

    let txn_id = db.tm.start_txn(&mut db.wal).unwrap();
    insert_row(&mut db, txn_id, 3);
    db.bm.flush_all_pages().unwrap();

    db.wal.rollback_txn(txn_id, &mut db.bm).unwrap();
    assert!(look(&mut db, 3, false));
    db.wal.rollback_txn(txn_id, &mut db.bm).unwrap();
    assert!(look(&mut db, 3, false));
    assert!(look(&mut db, 5, true));
    assert!(look(&mut db, 10, true));
}

#[test]
fn recovery_of_a_clean_shutdown_changes_no_pages() {
    let mut db = open_db();
    do_insert(&mut db, 5, 10);
    db.bm.flush_all_pages().unwrap();

    // Capture the on-disk page image before recovery runs.
    let page_id = BufferManager::overall_page_id(HEAP_SEGMENT, 0);
    db.bm.discard_all_pages();
    let frame_id = db.bm.fix_page(page_id, false).unwrap();
    let before: Vec<u8> = db.bm.frame(frame_id).data().to_vec();
    db.bm.unfix_page(frame_id, false);

    crash(&mut db);

    let frame_id = db.bm.fix_page(page_id, false).unwrap();
    assert_eq!(db.bm.frame(frame_id).data(), before.as_slice());
    db.bm.unfix_page(frame_id, false);
}
