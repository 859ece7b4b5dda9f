//! Account synchronization scheduling and unsigned transaction construction
//! for a multi-account Bitcoin wallet.

pub mod account;
pub mod chain;
pub mod config;
pub mod error;
pub mod sync;
pub mod tx;

pub use account::{AccountCore, AccountKind, WalletAccount, WalletManager};
pub use chain::{open_wallet, ElectrumBackend, MemoryChain};
pub use config::{NetworkParams, SizeModel, WalletConfig};
pub use error::{BackendError, ConstructionError, QueueError, SigningError, SyncError};
pub use sync::{AccountSyncCoordinator, SyncMode, SyncReport};
pub use tx::{CoinSelector, SpendRequest, UnsignedTransaction, UnsignedTransactionBuilder};
