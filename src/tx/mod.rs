//! Unsigned transaction construction.
//!
//! - `types`: outputs, receivers, spend requests and the unsigned transaction
//! - `selector`: coin selection with iterative fee estimation and dust handling
//! - `builder`: request validation, selection and the closing balance check
//! - `queue`: outgoing transactions and input reservation

pub mod builder;
pub mod queue;
pub mod selector;
pub mod types;


pub use builder::UnsignedTransactionBuilder;
pub use queue::{BroadcastSummary, OutgoingQueue, QueuedTransaction};
pub use selector::{CoinSelector, Selection, SelectionOrder};
pub use types::{fee_for_size, Receiver, SpendRequest, UnsignedTransaction, UnspentOutput};
