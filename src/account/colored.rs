use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use bitcoin::{OutPoint, ScriptBuf, Transaction};

use crate::account::common::AccountCore;
use crate::account::{AccountKind, WalletAccount};
use crate::chain::api::TransactionSigner;
use crate::error::SigningError;
use crate::tx::{UnsignedTransaction, UnspentOutput};

/// Single-address account holding colored-coin assets.
///
/// Outputs that carry an asset are never spent as plain bitcoin, and change
/// returns to the account's only address.
pub struct ColoredCoinAccount {
    core: AccountCore,
    address_script: ScriptBuf,
    asset_outputs: Mutex<HashSet<OutPoint>>,
    signer: Arc<dyn TransactionSigner>,
}

impl ColoredCoinAccount {
    pub fn new(
        core: AccountCore,
        address_script: ScriptBuf,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            core,
            address_script,
            asset_outputs: Mutex::new(HashSet::new()),
            signer,
        }
    }

    pub fn address_script(&self) -> &ScriptBuf {
        &self.address_script
    }

    /// Replaces the asset index with the outpoints currently carrying assets.
    pub fn set_asset_outputs(&self, outpoints: impl IntoIterator<Item = OutPoint>) {
        let mut assets = self.asset_outputs.lock().unwrap_or_else(PoisonError::into_inner);
        assets.clear();
        assets.extend(outpoints);
        log::debug!("[COLORED] {}: {} asset outputs", self.core.id(), assets.len());
    }

    pub fn carries_asset(&self, outpoint: &OutPoint) -> bool {
        self.asset_outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(outpoint)
    }
}

impl WalletAccount for ColoredCoinAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }

    fn kind(&self) -> AccountKind {
        AccountKind::ColoredCoin
    }

    fn change_script(&self) -> Option<ScriptBuf> {
        Some(self.address_script.clone())
    }

    fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<Transaction, SigningError> {
        self.signer.sign(unsigned)
    }

    fn is_spendable(&self, utxo: &UnspentOutput) -> bool {
        !self.carries_asset(&utxo.outpoint)
    }

    fn only_sync_when_active(&self) -> bool {
        true
    }
}
