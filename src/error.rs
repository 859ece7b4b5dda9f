use bitcoin::Amount;
use thiserror::Error;

/// Failure reported by an external collaborator (network, storage, broadcast).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The network step failed. The throttle was not advanced, so the next
    /// call retries once the interval allows it.
    #[error("Synchronization failed: {0}")]
    Failed(#[from] BackendError),

    /// Another synchronization of the same account is already running.
    #[error("Synchronization already in progress for account {0}")]
    InProgress(String),
}

/// Errors raised while constructing an unsigned transaction. None of these
/// are retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("Output too small: {value} is below the dust threshold {dust_threshold}")]
    OutputTooSmall { value: Amount, dust_threshold: Amount },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Outpoint {0} is already reserved by a queued transaction")]
    OutputsReserved(bitcoin::OutPoint),

    #[error("Unknown queued transaction {0}")]
    UnknownTransaction(u64),

    #[error("Queued transaction {0} has not been signed")]
    NotSigned(u64),

    #[error("Signing queued transaction failed: {0}")]
    Signing(#[from] SigningError),
}

/// Error surfaced by the signing collaborator (key cipher, hardware device).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid key cipher")]
    InvalidKeyCipher,

    #[error("Signer rejected transaction: {0}")]
    Rejected(String),
}
