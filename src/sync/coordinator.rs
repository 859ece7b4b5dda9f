use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::error::{BackendError, SyncError};
use crate::sync::clock::Clock;
use crate::sync::throttle::{self, AccountSyncState, SyncIntervals};
use crate::sync::types::{SyncMode, SyncOutcome, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Synchronizing,
}

/// Per-account sync gate.
///
/// Applies the interval throttle, runs the account's network step and
/// advances the throttle only when that step succeeds. At most one step runs
/// per account at a time; a call arriving while one is in flight is rejected
/// with [`SyncError::InProgress`].
pub struct AccountSyncCoordinator {
    account: String,
    state: Mutex<AccountSyncState>,
    in_flight: AtomicBool,
    intervals: SyncIntervals,
    clock: Arc<dyn Clock>,
}

/// Resets the phase to idle even if the network step panics.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AccountSyncCoordinator {
    /// Uses the process-wide interval table.
    pub fn new(account: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_intervals(account, *SyncIntervals::global(), clock)
    }

    pub fn with_intervals(
        account: impl Into<String>,
        intervals: SyncIntervals,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            account: account.into(),
            state: Mutex::new(AccountSyncState::new()),
            in_flight: AtomicBool::new(false),
            intervals,
            clock,
        }
    }

    /// Restores a state previously persisted by the account's storage layer.
    pub fn restore(self, state: AccountSyncState) -> Self {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        if self.in_flight.load(Ordering::Acquire) {
            SyncPhase::Synchronizing
        } else {
            SyncPhase::Idle
        }
    }

    pub fn state(&self) -> AccountSyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_due(&self, mode: &SyncMode) -> bool {
        let state = self.state();
        throttle::is_due(&state, mode, &self.intervals, self.clock.now_millis())
    }

    /// Runs `step` if `mode` is due, otherwise reports [`SyncReport::Skipped`].
    pub fn synchronize<F>(&self, mode: &SyncMode, step: F) -> Result<SyncReport, SyncError>
    where
        F: FnOnce(&SyncMode) -> Result<SyncOutcome, BackendError>,
    {
        if !self.is_due(mode) {
            log::debug!("[SYNC] {}: {:?} not due, skipping", self.account, mode.mode);
            return Ok(SyncReport::Skipped);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("[SYNC] {}: sync already in flight, rejecting", self.account);
            return Err(SyncError::InProgress(self.account.clone()));
        }
        let _guard = InFlightGuard(&self.in_flight);

        // A sync that finished between the check above and taking the slot
        // already covers this window.
        if !self.is_due(mode) {
            return Ok(SyncReport::Skipped);
        }

        log::info!("[SYNC] {}: starting {:?} (forced={})", self.account, mode.mode, mode.forced);
        let started = Instant::now();

        match step(mode) {
            Ok(outcome) => {
                let now = self.clock.now_millis();
                throttle::record_success(
                    &mut self.state.lock().unwrap_or_else(PoisonError::into_inner),
                    mode.mode,
                    now,
                );
                log::info!(
                    "[SYNC] {}: {:?} done in {:?} ({} new txs)",
                    self.account,
                    mode.mode,
                    started.elapsed(),
                    outcome.new_transactions
                );
                Ok(SyncReport::Synchronized(outcome))
            }
            Err(e) => {
                log::warn!(
                    "[SYNC] {}: {:?} failed after {:?}: {}",
                    self.account,
                    mode.mode,
                    started.elapsed(),
                    e
                );
                Err(SyncError::Failed(e))
            }
        }
    }
}

impl std::fmt::Debug for AccountSyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSyncCoordinator")
            .field("account", &self.account)
            .field("phase", &self.phase())
            .field("state", &self.state())
            .finish()
    }
}
