use crate::sync::types::SyncMode;

const MS_PER_MINUTE: u64 = 60 * 1000;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Periodic background sync policy.
///
/// Every tick runs a normal sync of the current account, except when the last
/// full sync is unknown or too old, in which case all accounts get a full sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSyncPolicy {
    pub min_autosync_interval: u64,
    pub min_fullsync_interval: u64,
}

impl Default for AutoSyncPolicy {
    fn default() -> Self {
        Self {
            min_autosync_interval: MS_PER_MINUTE,
            min_fullsync_interval: 5 * MS_PER_HOUR,
        }
    }
}

impl AutoSyncPolicy {
    pub fn next_mode(&self, last_full_sync: Option<u64>, now: u64) -> SyncMode {
        match last_full_sync {
            Some(last) if now.saturating_sub(last) < self.min_fullsync_interval => SyncMode::NORMAL,
            _ => SyncMode::FULL_SYNC_ALL_ACCOUNTS,
        }
    }

    /// Whether a tick at `now` should run at all.
    pub fn tick_due(&self, last_tick: Option<u64>, now: u64) -> bool {
        match last_tick {
            None => true,
            Some(last) => now.saturating_sub(last) > self.min_autosync_interval,
        }
    }
}
