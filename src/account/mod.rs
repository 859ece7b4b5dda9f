//! Wallet accounts and the manager that synchronizes them.
//!
//! Every account variant wraps an [`AccountCore`] and exposes the same
//! [`WalletAccount`] capabilities. Variants differ in where change goes,
//! which outputs may fund a spend and who signs.

pub mod bip44;
pub mod colored;
pub mod common;
pub mod external;
pub mod keychain;
pub mod manager;


use bitcoin::{Amount, ScriptBuf, Transaction};

use crate::error::{ConstructionError, QueueError, SigningError, SyncError};
use crate::sync::{AccountSyncState, SyncMode, SyncReport};
use crate::tx::{BroadcastSummary, Receiver, SpendRequest, UnsignedTransaction, UnspentOutput};

pub use common::AccountCore;
pub use bip44::Bip44Account;
pub use colored::ColoredCoinAccount;
pub use external::ExternalSignatureAccount;
pub use keychain::DerivedKeychain;
pub use manager::{ManagerState, SyncSummary, WalletManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Bip44,
    ExternalSignature,
    ColoredCoin,
}

pub trait WalletAccount: Send + Sync {
    fn core(&self) -> &AccountCore;

    fn kind(&self) -> AccountKind;

    /// Script receiving change of transactions built by this account.
    fn change_script(&self) -> Option<ScriptBuf>;

    fn sign_transaction(&self, unsigned: &UnsignedTransaction) -> Result<Transaction, SigningError>;

    /// Account-specific spendability on top of confirmations and the queue.
    fn is_spendable(&self, _utxo: &UnspentOutput) -> bool {
        true
    }

    /// Called after a sync that actually ran.
    fn on_synced(&self) {}

    /// Called once `unsigned` is in the outgoing queue.
    fn on_queued(&self, _unsigned: &UnsignedTransaction) {}

    /// Accounts that only sync while selected in the UI.
    fn only_sync_when_active(&self) -> bool {
        false
    }

    fn id(&self) -> &str {
        self.core().id()
    }

    fn synchronize(&self, mode: &SyncMode) -> Result<SyncReport, SyncError> {
        let report = self.core().synchronize(mode)?;
        if report.did_sync() {
            self.on_synced();
        }
        Ok(report)
    }

    fn sync_state(&self) -> AccountSyncState {
        self.core().sync_state()
    }

    fn spendable_outputs(&self) -> Vec<UnspentOutput> {
        self.core().outputs(|u| self.is_spendable(u))
    }

    fn build_unsigned_transaction(
        &self,
        request: &SpendRequest,
    ) -> Result<UnsignedTransaction, ConstructionError> {
        let change = self.change_script().ok_or_else(|| {
            ConstructionError::InvalidArgument("account has no change script".to_string())
        })?;
        self.core()
            .builder()
            .build(&self.spendable_outputs(), request, &change)
    }

    /// Whether `receiver` could be paid right now, without reserving anything.
    fn check_amount(
        &self,
        receiver: &Receiver,
        fee_per_kb: Amount,
    ) -> Result<(), ConstructionError> {
        self.build_unsigned_transaction(&SpendRequest::single(receiver.clone(), fee_per_kb))
            .map(|_| ())
    }

    fn calculate_max_spendable(&self, fee_per_kb: Amount) -> Amount {
        self.core()
            .builder()
            .max_spendable(&self.spendable_outputs(), fee_per_kb, |_| true)
    }

    fn build_sweep(
        &self,
        destination: &ScriptBuf,
        fee_per_kb: Amount,
    ) -> Result<UnsignedTransaction, ConstructionError> {
        self.core()
            .builder()
            .build_sweep(&self.spendable_outputs(), destination, fee_per_kb, |_| true)
    }

    fn queue_transaction(&self, unsigned: UnsignedTransaction) -> Result<u64, QueueError> {
        let id = self.core().queue().queue(unsigned.clone())?;
        self.on_queued(&unsigned);
        Ok(id)
    }

    /// Signs a queued transaction in place.
    fn sign_queued_transaction(&self, id: u64) -> Result<(), QueueError> {
        let unsigned = self
            .core()
            .queue()
            .get(id)
            .map(|entry| entry.unsigned.clone())
            .ok_or(QueueError::UnknownTransaction(id))?;

        // Queue lock is not held while the signer runs.
        let signed = self.sign_transaction(&unsigned)?;
        self.core().queue().attach_signed(id, signed)
    }

    fn cancel_queued_transaction(&self, id: u64) -> Result<UnsignedTransaction, QueueError> {
        self.core().queue().cancel(id)
    }

    fn broadcast_outgoing_transactions(&self) -> BroadcastSummary {
        let core = self.core();
        core.queue().broadcast_all(core.backend())
    }
}
