use serde::{Deserialize, Serialize};

/// How thorough a synchronization is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    OneAddress,
    FastSync,
    NormalSync,
    FullSync,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::OneAddress, Mode::FastSync, Mode::NormalSync, Mode::FullSync];

    /// Slot of this mode in per-mode tables.
    pub const fn index(self) -> usize {
        match self {
            Mode::OneAddress => 0,
            Mode::FastSync => 1,
            Mode::NormalSync => 2,
            Mode::FullSync => 3,
        }
    }
}

/// Which accounts a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    CurrentAccount,
    AllAccounts,
}

/// A synchronization request. `forced` bypasses the interval throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncMode {
    pub mode: Mode,
    pub scope: Scope,
    pub forced: bool,
}

impl SyncMode {
    pub const NORMAL: SyncMode = SyncMode::new(Mode::NormalSync, Scope::CurrentAccount, false);
    pub const NORMAL_FORCED: SyncMode =
        SyncMode::new(Mode::NormalSync, Scope::CurrentAccount, true);
    pub const NORMAL_ALL_ACCOUNTS_FORCED: SyncMode =
        SyncMode::new(Mode::NormalSync, Scope::AllAccounts, true);
    pub const FULL_SYNC_CURRENT_ACCOUNT_FORCED: SyncMode =
        SyncMode::new(Mode::FullSync, Scope::CurrentAccount, true);
    pub const FULL_SYNC_ALL_ACCOUNTS: SyncMode =
        SyncMode::new(Mode::FullSync, Scope::AllAccounts, false);
    pub const FAST_SYNC_CURRENT_ACCOUNT: SyncMode =
        SyncMode::new(Mode::FastSync, Scope::CurrentAccount, false);
    pub const ONE_ADDRESS_CURRENT_ACCOUNT: SyncMode =
        SyncMode::new(Mode::OneAddress, Scope::CurrentAccount, false);

    pub const fn new(mode: Mode, scope: Scope, forced: bool) -> Self {
        Self { mode, scope, forced }
    }

    pub fn is_all_accounts(&self) -> bool {
        self.scope == Scope::AllAccounts
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::NORMAL
    }
}

/// What the network step reports back on success. Informational only; the
/// throttle only cares that it succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub tip_height: Option<u32>,
    pub new_transactions: usize,
}

/// Result of a `synchronize` call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    /// Throttled: the last successful sync for this mode is recent enough.
    Skipped,
    Synchronized(SyncOutcome),
}

impl SyncReport {
    pub fn did_sync(&self) -> bool {
        matches!(self, SyncReport::Synchronized(_))
    }
}
