// BDK 2.3 wallet + Electrum chain collaborator

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{anyhow, Result};
use bdk_electrum::electrum_client::{self, ElectrumApi};
use bdk_electrum::BdkElectrumClient;
use bdk_wallet::bitcoin::{Network, Transaction, Txid};
use bdk_wallet::chain::ChainPosition;
use bdk_wallet::file_store::Store;
use bdk_wallet::{Balance, ChangeSet, KeychainKind, PersistedWallet, Wallet};

use crate::chain::api::{Broadcaster, NetworkSync, OutputSource};
use crate::error::BackendError;
use crate::sync::{Mode, SyncMode, SyncOutcome};
use crate::tx::UnspentOutput;

pub const DB_MAGIC: &[u8] = b"bdk_wallet_magic_bytes";

/// Addresses revealed up front on both keychains.
const LOOKAHEAD: u32 = 50;
/// Discovery window for a full scan.
const STOP_GAP: usize = 20;
const BATCH_SIZE: usize = 5;

pub type WalletStore = Store<ChangeSet>;

/// Loads the wallet from `db_path`, or creates it if the store is empty.
pub fn open_wallet(
    descriptor: String,
    change_descriptor: Option<String>,
    network: Network,
    db_path: impl AsRef<Path>,
) -> Result<(PersistedWallet<WalletStore>, WalletStore)> {
    let (mut db, _) = Store::<ChangeSet>::load_or_create(DB_MAGIC, db_path)?;

    let loaded = Wallet::load()
        .descriptor(KeychainKind::External, Some(descriptor.clone()))
        .descriptor(KeychainKind::Internal, change_descriptor.clone())
        .check_network(network)
        .load_wallet(&mut db)?;

    let mut wallet = match loaded {
        Some(wallet) => {
            log::info!("[WALLET] Loaded from persistence.");
            wallet
        }
        None => {
            log::info!("[WALLET] Creating new...");
            let change = change_descriptor
                .ok_or_else(|| anyhow!("change descriptor required for a new wallet"))?;
            Wallet::create(descriptor, change)
                .network(network)
                .lookahead(LOOKAHEAD)
                .create_wallet(&mut db)?
        }
    };

    let _ = wallet.reveal_addresses_to(KeychainKind::External, LOOKAHEAD);
    let _ = wallet.reveal_addresses_to(KeychainKind::Internal, LOOKAHEAD);
    wallet.persist(&mut db)?;

    Ok((wallet, db))
}

/// Unspent outputs of `wallet`, confirmations counted against its local tip.
/// Unconfirmed outputs have zero confirmations.
pub fn local_unspent(wallet: &Wallet) -> Vec<UnspentOutput> {
    let tip = wallet.latest_checkpoint().height();
    wallet
        .list_unspent()
        .map(|local| {
            let confirmations = match local.chain_position {
                ChainPosition::Confirmed { anchor, .. } => {
                    tip.saturating_sub(anchor.block_id.height) + 1
                }
                ChainPosition::Unconfirmed { .. } => 0,
            };
            UnspentOutput {
                outpoint: local.outpoint,
                value: local.txout.value,
                confirmations,
                script_pubkey: local.txout.script_pubkey,
            }
        })
        .collect()
}

/// A persisted BDK wallet synchronized through Electrum.
pub struct ElectrumBackend {
    wallet: Mutex<PersistedWallet<WalletStore>>,
    db: Mutex<WalletStore>,
    client: BdkElectrumClient<electrum_client::Client>,
}

impl ElectrumBackend {
    pub fn connect(
        wallet: PersistedWallet<WalletStore>,
        db: WalletStore,
        electrum_url: &str,
    ) -> Result<Self> {
        log::info!("[ELECTRUM] Connecting to {}", electrum_url);
        let client = electrum_client::Client::new(electrum_url)?;
        Ok(Self {
            wallet: Mutex::new(wallet),
            db: Mutex::new(db),
            client: BdkElectrumClient::new(client),
        })
    }

    fn wallet(&self) -> MutexGuard<'_, PersistedWallet<WalletStore>> {
        self.wallet.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn local_outputs(&self) -> Vec<UnspentOutput> {
        local_unspent(&self.wallet())
    }

    pub fn balance(&self) -> Balance {
        self.wallet().balance()
    }

    fn persist(&self, wallet: &mut PersistedWallet<WalletStore>) -> Result<(), BackendError> {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        wallet
            .persist(&mut db)
            .map_err(|e| BackendError::new(format!("persist failed: {}", e)))?;
        Ok(())
    }
}

impl NetworkSync for ElectrumBackend {
    fn sync_account(&self, account: &str, mode: &SyncMode) -> Result<SyncOutcome, BackendError> {
        let started = Instant::now();
        let mut wallet = self.wallet();
        let known = wallet.transactions().count();

        match mode.mode {
            Mode::FullSync => {
                log::info!("[ELECTRUM] {}: full scan (stop_gap={})", account, STOP_GAP);
                let request = wallet.start_full_scan().build();
                let update = self
                    .client
                    .full_scan(request, STOP_GAP, BATCH_SIZE, false)
                    .map_err(|e| BackendError::new(e.to_string()))?;
                wallet
                    .apply_update(update)
                    .map_err(|e| BackendError::new(e.to_string()))?;
            }
            _ => {
                log::info!("[ELECTRUM] {}: sync of revealed scripts", account);
                let request = wallet.start_sync_with_revealed_spks().build();
                let update = self
                    .client
                    .sync(request, BATCH_SIZE, false)
                    .map_err(|e| BackendError::new(e.to_string()))?;
                wallet
                    .apply_update(update)
                    .map_err(|e| BackendError::new(e.to_string()))?;
            }
        }
        self.persist(&mut wallet)?;

        let outcome = SyncOutcome {
            tip_height: Some(wallet.latest_checkpoint().height()),
            new_transactions: wallet.transactions().count().saturating_sub(known),
        };
        log::info!(
            "[ELECTRUM] {}: tip {:?}, {} new txs in {:?}",
            account,
            outcome.tip_height,
            outcome.new_transactions,
            started.elapsed()
        );
        Ok(outcome)
    }
}

impl OutputSource for ElectrumBackend {
    fn spendable_outputs(&self, _account: &str) -> Vec<UnspentOutput> {
        self.local_outputs()
    }
}

impl Broadcaster for ElectrumBackend {
    fn broadcast(&self, tx: &Transaction) -> Result<Txid, BackendError> {
        self.client
            .inner
            .transaction_broadcast(tx)
            .map_err(|e| BackendError::new(e.to_string()))
    }
}
