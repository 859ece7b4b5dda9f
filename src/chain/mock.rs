use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use bitcoin::{Transaction, Txid};

use crate::chain::api::{Broadcaster, NetworkSync, OutputSource};
use crate::error::BackendError;
use crate::sync::{SyncMode, SyncOutcome};
use crate::tx::UnspentOutput;

/// Pure in-memory chain for tests and offline planning.
#[derive(Debug, Default)]
pub struct MemoryChain {
    outputs: Mutex<HashMap<String, Vec<UnspentOutput>>>,
    broadcasts: Mutex<Vec<Transaction>>,
    tip_height: Mutex<Option<u32>>,
    fail_sync: AtomicBool,
    fail_broadcast: AtomicBool,
    sync_calls: AtomicUsize,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_outputs(&self, account: &str, outputs: Vec<UnspentOutput>) {
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.to_string(), outputs);
    }

    pub fn set_tip(&self, height: u32) {
        *self.tip_height.lock().unwrap_or_else(PoisonError::into_inner) = Some(height);
    }

    pub fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    pub fn fail_broadcast(&self, fail: bool) {
        self.fail_broadcast.store(fail, Ordering::SeqCst);
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NetworkSync for MemoryChain {
    fn sync_account(&self, account: &str, mode: &SyncMode) -> Result<SyncOutcome, BackendError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        log::debug!("[MOCK] sync {} {:?}", account, mode.mode);

        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(BackendError::new("connection refused"));
        }
        Ok(SyncOutcome {
            tip_height: *self.tip_height.lock().unwrap_or_else(PoisonError::into_inner),
            new_transactions: 0,
        })
    }
}

impl OutputSource for MemoryChain {
    fn spendable_outputs(&self, account: &str) -> Vec<UnspentOutput> {
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .cloned()
            .unwrap_or_default()
    }
}

impl Broadcaster for MemoryChain {
    fn broadcast(&self, tx: &Transaction) -> Result<Txid, BackendError> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(BackendError::new("broadcast rejected"));
        }
        self.broadcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx.clone());
        Ok(tx.compute_txid())
    }
}
