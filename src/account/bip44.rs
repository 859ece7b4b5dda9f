use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bdk_wallet::KeychainKind;
use bitcoin::{ScriptBuf, Transaction};

use crate::account::common::AccountCore;
use crate::account::keychain::DerivedKeychain;
use crate::account::{AccountKind, WalletAccount};
use crate::chain::api::TransactionSigner;
use crate::error::SigningError;
use crate::tx::UnsignedTransaction;

/// HD account backed by an external/internal descriptor pair. Change goes to
/// the first internal script that has not received funds yet.
pub struct Bip44Account {
    core: AccountCore,
    keychain: Mutex<DerivedKeychain>,
    signer: Arc<dyn TransactionSigner>,
}

impl Bip44Account {
    pub fn new(
        core: AccountCore,
        keychain: DerivedKeychain,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            core,
            keychain: Mutex::new(keychain),
            signer,
        }
    }

    pub fn keychain(&self) -> MutexGuard<'_, DerivedKeychain> {
        self.keychain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WalletAccount for Bip44Account {
    fn core(&self) -> &AccountCore {
        &self.core
    }

    fn kind(&self) -> AccountKind {
        AccountKind::Bip44
    }

    fn change_script(&self) -> Option<ScriptBuf> {
        self.keychain().next_unused_script(KeychainKind::Internal)
    }

    fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<Transaction, SigningError> {
        self.signer.sign(unsigned)
    }

    fn on_synced(&self) {
        let outputs = self.core.backend().spendable_outputs(self.core.id());
        let derived = self.keychain().mark_outputs_used(&outputs);
        log::debug!("[KEYCHAIN] {}: {} scripts derived after sync", self.core.id(), derived);
    }

    fn on_queued(&self, unsigned: &UnsignedTransaction) {
        if let Some(change) = &unsigned.change {
            self.keychain().mark_script_used(&change.script_pubkey);
        }
    }
}
