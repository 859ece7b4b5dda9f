use bitcoin::{Transaction, Txid};

use crate::error::{BackendError, SigningError};
use crate::sync::{SyncMode, SyncOutcome};
use crate::tx::{UnsignedTransaction, UnspentOutput};

/// Network side of an account's synchronization. Implementations do their
/// own UTXO/history/height fetching; the coordinator only looks at
/// success or failure.
pub trait NetworkSync: Send + Sync {
    fn sync_account(&self, account: &str, mode: &SyncMode) -> Result<SyncOutcome, BackendError>;
}

/// The account's cached unspent outputs, in a stable order.
pub trait OutputSource: Send + Sync {
    fn spendable_outputs(&self, account: &str) -> Vec<UnspentOutput>;
}

pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, tx: &Transaction) -> Result<Txid, BackendError>;
}

/// Signs with keys held by the wallet (behind the key cipher).
pub trait TransactionSigner: Send + Sync {
    fn sign(&self, unsigned: &UnsignedTransaction) -> Result<Transaction, SigningError>;
}

/// Hardware wallets provide signatures so accounts can work without the
/// private keys themselves.
pub trait ExternalSignatureProvider: Send + Sync {
    fn signed_transaction(
        &self,
        unsigned: &UnsignedTransaction,
        account: &str,
    ) -> Result<Transaction, SigningError>;

    fn bip44_account_type(&self) -> u32;
}

/// Everything an account needs from the chain side.
pub trait ChainBackend: NetworkSync + OutputSource + Broadcaster {}

impl<T: NetworkSync + OutputSource + Broadcaster> ChainBackend for T {}
