//! Account synchronization scheduling.
//!
//! - `types`: sync requests and reports
//! - `throttle`: pure interval check over an account's last-sync table
//! - `coordinator`: per-account gate that runs the network step at most once
//!   at a time and records success
//! - `autosync`: periodic full-vs-normal decision

pub mod autosync;
pub mod clock;
pub mod coordinator;
pub mod throttle;
pub mod types;

#[cfg(test)]
mod tests;

pub use autosync::AutoSyncPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{AccountSyncCoordinator, SyncPhase};
pub use throttle::{is_due, record_success, AccountSyncState, SyncIntervals};
pub use types::{Mode, Scope, SyncMode, SyncOutcome, SyncReport};
