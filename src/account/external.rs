use std::sync::{Arc, Mutex, PoisonError};

use bdk_wallet::KeychainKind;
use bitcoin::{ScriptBuf, Transaction};

use crate::account::common::AccountCore;
use crate::account::keychain::DerivedKeychain;
use crate::account::{AccountKind, WalletAccount};
use crate::chain::api::ExternalSignatureProvider;
use crate::error::SigningError;
use crate::tx::UnsignedTransaction;

/// Watch-only HD account whose transactions are signed by a hardware device.
pub struct ExternalSignatureAccount {
    core: AccountCore,
    keychain: Mutex<DerivedKeychain>,
    provider: Arc<dyn ExternalSignatureProvider>,
}

impl ExternalSignatureAccount {
    pub fn new(
        core: AccountCore,
        keychain: DerivedKeychain,
        provider: Arc<dyn ExternalSignatureProvider>,
    ) -> Self {
        Self {
            core,
            keychain: Mutex::new(keychain),
            provider,
        }
    }

    /// BIP44 account type reported by the device.
    pub fn bip44_account_type(&self) -> u32 {
        self.provider.bip44_account_type()
    }
}

impl WalletAccount for ExternalSignatureAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }

    fn kind(&self) -> AccountKind {
        AccountKind::ExternalSignature
    }

    fn change_script(&self) -> Option<ScriptBuf> {
        self.keychain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_unused_script(KeychainKind::Internal)
    }

    fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<Transaction, SigningError> {
        log::info!(
            "[SIGN] {}: requesting signature from external device ({} inputs)",
            self.core.id(),
            unsigned.inputs.len()
        );
        self.provider.signed_transaction(unsigned, self.core.id())
    }

    fn on_synced(&self) {
        let outputs = self.core.backend().spendable_outputs(self.core.id());
        self.keychain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark_outputs_used(&outputs);
    }

    fn on_queued(&self, unsigned: &UnsignedTransaction) {
        if let Some(change) = &unsigned.change {
            self.keychain
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .mark_script_used(&change.script_pubkey);
        }
    }
}
