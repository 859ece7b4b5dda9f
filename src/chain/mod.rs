pub mod api;
pub mod electrum;
pub mod mock;

pub use api::{
    Broadcaster, ChainBackend, ExternalSignatureProvider, NetworkSync, OutputSource,
    TransactionSigner,
};
pub use electrum::{open_wallet, ElectrumBackend};
pub use mock::MemoryChain;
