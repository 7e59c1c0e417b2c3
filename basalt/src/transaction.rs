//! The transaction manager: id assignment, modified-page tracking, and the
//! NO-STEAL / FORCE commit and abort paths.

use std::collections::BTreeMap;

use crate::buffer_pool::BufferManager;
use crate::error::Result;
use crate::wal::LogManager;
use crate::{PageId, TxnId};

/// One entry in the transaction table.
#[derive(Debug, Default)]
pub struct Transaction {
    pub txn_id: TxnId,
    pub started: bool,
    /// Pages this transaction has modified, in modification order.
    pub modified_pages: Vec<PageId>,
}

impl Transaction {
    fn new(txn_id: TxnId) -> Self {
        Transaction {
            txn_id,
            started: true,
            modified_pages: Vec::new(),
        }
    }
}

/// The transaction manager. Commit flushes the transaction's pages before
/// logging (FORCE); abort discards its buffered pages (NO-STEAL) and then
/// lets the log manager undo whatever was already forced out.
#[derive(Debug, Default)]
pub struct TransactionManager {
    transaction_counter: TxnId,
    transaction_table: BTreeMap<TxnId, Transaction>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager::default()
    }

    /// Starts a transaction: assigns the next id and logs BEGIN.
    pub fn start_txn(&mut self, log_manager: &mut LogManager) -> Result<TxnId> {
        self.transaction_counter += 1;
        let txn_id = self.transaction_counter;
        self.transaction_table.insert(txn_id, Transaction::new(txn_id));
        log_manager.log_txn_begin(txn_id)?;
        crate::basalt_debug_log!("[TransactionManager::start_txn] Started txn {txn_id}");
        Ok(txn_id)
    }

    /// Records that the transaction modified `page_id`. Operators call this
    /// after every mutation.
    pub fn add_modified_page(&mut self, txn_id: TxnId, page_id: PageId) {
        let txn = self
            .transaction_table
            .get_mut(&txn_id)
            .unwrap_or_else(|| panic!("transaction {txn_id} does not exist"));
        txn.modified_pages.push(page_id);
    }

    /// Commits: flushes every modified page (FORCE), then logs COMMIT.
    pub fn commit_txn(
        &mut self,
        txn_id: TxnId,
        log_manager: &mut LogManager,
        buffer_manager: &mut BufferManager,
    ) -> Result<()> {
        let txn = self
            .transaction_table
            .get_mut(&txn_id)
            .unwrap_or_else(|| panic!("transaction {txn_id} does not exist"));
        if !txn.started {
            return Ok(());
        }

        for &page_id in &txn.modified_pages {
            buffer_manager.flush_page(page_id)?;
        }
        log_manager.log_commit(txn_id)?;
        txn.started = false;
        crate::basalt_debug_log!("[TransactionManager::commit_txn] Committed txn {txn_id}");
        Ok(())
    }

    /// Aborts: discards the transaction's buffered pages (under NO-STEAL
    /// nothing reached disk), then logs ABORT, which also rolls back any
    /// page that was forced out anyway.
    pub fn abort_txn(
        &mut self,
        txn_id: TxnId,
        log_manager: &mut LogManager,
        buffer_manager: &mut BufferManager,
    ) -> Result<()> {
        let txn = self
            .transaction_table
            .get_mut(&txn_id)
            .unwrap_or_else(|| panic!("transaction {txn_id} does not exist"));
        if !txn.started {
            return Ok(());
        }

        for &page_id in &txn.modified_pages {
            buffer_manager.discard_page(page_id);
        }
        log_manager.log_abort(txn_id, buffer_manager)?;
        txn.started = false;
        crate::basalt_debug_log!("[TransactionManager::abort_txn] Aborted txn {txn_id}");
        Ok(())
    }

    /// Drops all buffered pages and clears the table and counter. Used to
    /// simulate a crash; the caller resets the log manager alongside.
    pub fn reset(&mut self, buffer_manager: &mut BufferManager) {
        buffer_manager.discard_all_pages();
        self.transaction_counter = 0;
        self.transaction_table.clear();
    }
}
