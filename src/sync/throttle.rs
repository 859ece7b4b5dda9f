//! Interval throttling for account synchronization.
//!
//! Pure functions over an account's last-sync table and the process-wide
//! interval table. No clock access happens here; callers pass `now`.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::sync::types::{Mode, SyncMode};

static INTERVALS: OnceLock<SyncIntervals> = OnceLock::new();

/// Minimum time between two non-forced syncs of the same mode, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncIntervals {
    millis: [u64; 4],
}

impl SyncIntervals {
    pub const DEFAULT: SyncIntervals = SyncIntervals {
        millis: [1_000, 1_000, 30_000, 120_000],
    };

    pub const fn new(one_address: u64, fast: u64, normal: u64, full: u64) -> Self {
        Self {
            millis: [one_address, fast, normal, full],
        }
    }

    pub fn interval_for(&self, mode: Mode) -> u64 {
        self.millis[mode.index()]
    }

    /// Installs the process-wide table. Only the first call wins; returns
    /// `false` if a table was already installed (or already read).
    pub fn install(intervals: SyncIntervals) -> bool {
        let installed = INTERVALS.set(intervals).is_ok();
        if !installed {
            log::warn!("[THROTTLE] Sync intervals already initialised, ignoring override");
        }
        installed
    }

    /// The process-wide table, falling back to `DEFAULT`.
    pub fn global() -> &'static SyncIntervals {
        INTERVALS.get_or_init(|| SyncIntervals::DEFAULT)
    }
}

impl Default for SyncIntervals {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Last successful sync timestamp per mode, owned by exactly one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSyncState {
    last_sync: [Option<u64>; 4],
}

impl AccountSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sync(&self, mode: Mode) -> Option<u64> {
        self.last_sync[mode.index()]
    }

    /// Forget every recorded sync; used when the account is reset.
    pub fn clear(&mut self) {
        self.last_sync = [None; 4];
    }
}

/// Whether a sync for `requested` should go to the network at `now`.
pub fn is_due(
    state: &AccountSyncState,
    requested: &SyncMode,
    intervals: &SyncIntervals,
    now: u64,
) -> bool {
    if requested.forced {
        return true;
    }

    match state.last_sync(requested.mode) {
        None => true,
        Some(last) => {
            let age = now.saturating_sub(last);
            age > intervals.interval_for(requested.mode)
        }
    }
}

/// Called only after the network step reported success.
pub fn record_success(state: &mut AccountSyncState, mode: Mode, now: u64) {
    log::trace!("[THROTTLE] record {:?} at {}", mode, now);
    state.last_sync[mode.index()] = Some(now);
}
