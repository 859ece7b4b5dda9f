//! Outgoing transactions waiting for signature or broadcast.
//!
//! Queuing reserves the transaction's inputs so a later selection on the
//! same account cannot pick them again. Cancelling releases them. Inputs of
//! a broadcast transaction stay excluded until a sync that started after the
//! broadcast refreshes the output cache.

use std::collections::{BTreeMap, HashMap};

use bitcoin::{OutPoint, Transaction, Txid};

use crate::chain::api::Broadcaster;
use crate::error::{BackendError, QueueError};
use crate::tx::types::UnsignedTransaction;

#[derive(Debug, Clone)]
pub struct QueuedTransaction {
    pub id: u64,
    pub unsigned: UnsignedTransaction,
    pub signed: Option<Transaction>,
}

#[derive(Debug, Default)]
pub struct BroadcastSummary {
    pub sent: Vec<(u64, Txid)>,
    pub failed: Vec<(u64, BackendError)>,
}

#[derive(Debug, Default)]
pub struct OutgoingQueue {
    next_id: u64,
    entries: BTreeMap<u64, QueuedTransaction>,
    reserved: HashMap<OutPoint, u64>,
    /// Outpoint -> broadcast epoch it was spent in.
    broadcast_spent: HashMap<OutPoint, u64>,
    /// Bumped on every successful broadcast.
    epoch: u64,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `outpoint` must not be selected.
    pub fn is_excluded(&self, outpoint: &OutPoint) -> bool {
        self.reserved.contains_key(outpoint) || self.broadcast_spent.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&QueuedTransaction> {
        self.entries.get(&id)
    }

    pub fn queue(&mut self, unsigned: UnsignedTransaction) -> Result<u64, QueueError> {
        if let Some(op) = unsigned.outpoints().find(|op| self.is_excluded(op)) {
            return Err(QueueError::OutputsReserved(*op));
        }

        let id = self.next_id;
        self.next_id += 1;

        for op in unsigned.outpoints() {
            self.reserved.insert(*op, id);
        }
        log::info!(
            "[QUEUE] queued tx #{} ({} inputs, fee {})",
            id,
            unsigned.inputs.len(),
            unsigned.fee
        );
        self.entries.insert(
            id,
            QueuedTransaction {
                id,
                unsigned,
                signed: None,
            },
        );
        Ok(id)
    }

    pub fn attach_signed(&mut self, id: u64, signed: Transaction) -> Result<(), QueueError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(QueueError::UnknownTransaction(id))?;
        entry.signed = Some(signed);
        Ok(())
    }

    pub fn signed(&self, id: u64) -> Result<&Transaction, QueueError> {
        self.entries
            .get(&id)
            .ok_or(QueueError::UnknownTransaction(id))?
            .signed
            .as_ref()
            .ok_or(QueueError::NotSigned(id))
    }

    /// Drops a queued transaction and returns its inputs to the pool.
    pub fn cancel(&mut self, id: u64) -> Result<UnsignedTransaction, QueueError> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or(QueueError::UnknownTransaction(id))?;
        self.reserved.retain(|_, owner| *owner != id);
        log::info!("[QUEUE] cancelled tx #{}", id);
        Ok(entry.unsigned)
    }

    /// Broadcasts every signed entry. Failures stay queued for the next attempt.
    pub fn broadcast_all<B>(&mut self, broadcaster: &B) -> BroadcastSummary
    where
        B: Broadcaster + ?Sized,
    {
        let mut summary = BroadcastSummary::default();
        let ready: Vec<u64> = self
            .entries
            .values()
            .filter(|e| e.signed.is_some())
            .map(|e| e.id)
            .collect();

        for id in ready {
            let Some(signed) = self.entries.get(&id).and_then(|e| e.signed.as_ref()) else {
                continue;
            };

            match broadcaster.broadcast(signed) {
                Ok(txid) => {
                    log::info!("[QUEUE] broadcast tx #{} as {}", id, txid);
                    let epoch = self.epoch;
                    self.epoch += 1;
                    if let Some(entry) = self.entries.remove(&id) {
                        for op in entry.unsigned.outpoints() {
                            self.broadcast_spent.insert(*op, epoch);
                        }
                    }
                    self.reserved.retain(|_, owner| *owner != id);
                    summary.sent.push((id, txid));
                }
                Err(e) => {
                    log::warn!("[QUEUE] broadcast of tx #{} failed: {}", id, e);
                    summary.failed.push((id, e));
                }
            }
        }
        summary
    }

    /// Broadcast epoch to capture before a sync's network step starts.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// A sync that started at `epoch` succeeded: the output cache now
    /// reflects every broadcast made before it. Later broadcasts stay masked.
    pub fn on_synced(&mut self, epoch: u64) {
        self.broadcast_spent.retain(|_, spent_in| *spent_in >= epoch);
    }
}
