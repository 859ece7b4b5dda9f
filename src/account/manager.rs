use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::account::WalletAccount;
use crate::error::{BackendError, SyncError};
use crate::sync::{AutoSyncPolicy, Clock, Mode, SyncMode, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Ready,
    Synchronizing,
}

/// Per-account result of one `synchronize` call.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub synchronized: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, SyncError)>,
}

impl SyncSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Decrements the running counter when a sync round ends.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owns the wallet's accounts and fans synchronization out over them.
///
/// Each account's network step runs on the blocking pool; accounts sync in
/// parallel while each account's own coordinator keeps it to one at a time.
pub struct WalletManager {
    accounts: BTreeMap<String, Arc<dyn WalletAccount>>,
    active: Option<String>,
    running: AtomicUsize,
    policy: AutoSyncPolicy,
    clock: Arc<dyn Clock>,
    last_full_sync: Mutex<Option<u64>>,
    last_tick: Mutex<Option<u64>>,
}

impl WalletManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: BTreeMap::new(),
            active: None,
            running: AtomicUsize::new(0),
            policy: AutoSyncPolicy::default(),
            clock,
            last_full_sync: Mutex::new(None),
            last_tick: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: AutoSyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds an account. The first one added becomes active.
    pub fn add_account(&mut self, account: Arc<dyn WalletAccount>) {
        let id = account.id().to_string();
        if self.active.is_none() {
            self.active = Some(id.clone());
        }
        log::info!("[MANAGER] added account {} ({:?})", id, account.kind());
        self.accounts.insert(id, account);
    }

    pub fn account(&self, id: &str) -> Option<&Arc<dyn WalletAccount>> {
        self.accounts.get(id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Arc<dyn WalletAccount>> {
        self.accounts.values()
    }

    /// Returns false if no account has that id.
    pub fn set_active(&mut self, id: &str) -> bool {
        if !self.accounts.contains_key(id) {
            return false;
        }
        self.active = Some(id.to_string());
        true
    }

    pub fn active_account(&self) -> Option<&Arc<dyn WalletAccount>> {
        self.active.as_deref().and_then(|id| self.accounts.get(id))
    }

    pub fn state(&self) -> ManagerState {
        if self.running.load(Ordering::Acquire) > 0 {
            ManagerState::Synchronizing
        } else {
            ManagerState::Ready
        }
    }

    pub fn last_full_sync(&self) -> Option<u64> {
        *self.last_full_sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn targets(&self, mode: &SyncMode) -> Vec<Arc<dyn WalletAccount>> {
        if !mode.is_all_accounts() {
            return self.active_account().cloned().into_iter().collect();
        }
        let active = self.active.as_deref();
        self.accounts
            .values()
            .filter(|a| !a.only_sync_when_active() || Some(a.id()) == active)
            .cloned()
            .collect()
    }

    /// Synchronizes the active account, or every eligible account when the
    /// mode targets all of them.
    pub async fn synchronize(&self, mode: SyncMode) -> SyncSummary {
        self.running.fetch_add(1, Ordering::AcqRel);
        let _guard = RunningGuard(&self.running);

        let started = Instant::now();
        let targets = self.targets(&mode);
        log::info!(
            "[MANAGER] {:?} over {} account(s), forced={}",
            mode.mode,
            targets.len(),
            mode.forced
        );

        let handles: Vec<_> = targets
            .into_iter()
            .map(|account| {
                let id = account.id().to_string();
                let handle = tokio::task::spawn_blocking(move || account.synchronize(&mode));
                (id, handle)
            })
            .collect();

        let mut summary = SyncSummary::default();
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(SyncReport::Synchronized(_))) => summary.synchronized.push(id),
                Ok(Ok(SyncReport::Skipped)) => summary.skipped.push(id),
                Ok(Err(e)) => summary.failed.push((id, e)),
                Err(join) => {
                    log::error!("[MANAGER] sync task for {} aborted: {}", id, join);
                    summary
                        .failed
                        .push((id, SyncError::Failed(BackendError::new(join.to_string()))));
                }
            }
        }

        log::info!(
            "[MANAGER] done in {:?}: {} synced, {} skipped, {} failed",
            started.elapsed(),
            summary.synchronized.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        summary
    }

    /// One auto-sync tick. Returns `None` when the tick came too early.
    pub async fn auto_sync(&self) -> Option<SyncSummary> {
        let now = self.clock.now_millis();
        {
            let mut last_tick = self.last_tick.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.policy.tick_due(*last_tick, now) {
                return None;
            }
            *last_tick = Some(now);
        }

        let mode = self.policy.next_mode(self.last_full_sync(), now);
        let summary = self.synchronize(mode).await;

        if mode.mode == Mode::FullSync && summary.is_success() {
            *self.last_full_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        }
        Some(summary)
    }
}
