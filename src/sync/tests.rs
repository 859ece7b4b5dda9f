#![cfg(test)]
use crate::error::{BackendError, SyncError};
use crate::sync::{
    is_due, record_success, AccountSyncCoordinator, AccountSyncState, AutoSyncPolicy,
    ManualClock, Mode, Scope, SyncIntervals, SyncMode, SyncOutcome, SyncPhase, SyncReport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

// =========================================================================
// Helpers
// =========================================================================

const T0: u64 = 1_700_000_000_000;

fn coordinator(clock: Arc<ManualClock>) -> AccountSyncCoordinator {
    AccountSyncCoordinator::with_intervals("acct", SyncIntervals::DEFAULT, clock)
}

fn ok_step(
    calls: &AtomicUsize,
) -> impl FnOnce(&SyncMode) -> Result<SyncOutcome, BackendError> + '_ {
    move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(SyncOutcome::default())
    }
}

// =========================================================================
// Throttle
// =========================================================================

#[test]
fn forced_is_always_due() {
    let mut state = AccountSyncState::new();
    for mode in Mode::ALL {
        record_success(&mut state, mode, T0);
        let req = SyncMode::new(mode, Scope::CurrentAccount, true);
        assert!(is_due(&state, &req, &SyncIntervals::DEFAULT, T0));
    }
}

#[test]
fn never_synced_is_due() {
    let state = AccountSyncState::new();
    for mode in Mode::ALL {
        let req = SyncMode::new(mode, Scope::AllAccounts, false);
        assert!(is_due(&state, &req, &SyncIntervals::DEFAULT, T0));
    }
}

#[test]
fn within_interval_is_not_due() {
    let intervals = SyncIntervals::DEFAULT;
    let mut state = AccountSyncState::new();

    for mode in Mode::ALL {
        record_success(&mut state, mode, T0);
        let req = SyncMode::new(mode, Scope::CurrentAccount, false);
        let interval = intervals.interval_for(mode);

        assert!(!is_due(&state, &req, &intervals, T0));
        // Boundary: exactly the interval is still throttled.
        assert!(!is_due(&state, &req, &intervals, T0 + interval));
        assert!(is_due(&state, &req, &intervals, T0 + interval + 1));
    }
}

#[test]
fn modes_are_tracked_independently() {
    let mut state = AccountSyncState::new();
    record_success(&mut state, Mode::NormalSync, T0);

    assert!(!is_due(&state, &SyncMode::NORMAL, &SyncIntervals::DEFAULT, T0 + 10));
    assert!(is_due(&state, &SyncMode::FAST_SYNC_CURRENT_ACCOUNT, &SyncIntervals::DEFAULT, T0 + 10));
    assert_eq!(state.last_sync(Mode::FullSync), None);
}

#[test]
fn default_interval_table() {
    let t = SyncIntervals::DEFAULT;
    assert_eq!(t.interval_for(Mode::OneAddress), 1_000);
    assert_eq!(t.interval_for(Mode::FastSync), 1_000);
    assert_eq!(t.interval_for(Mode::NormalSync), 30_000);
    assert_eq!(t.interval_for(Mode::FullSync), 120_000);
}

#[test]
fn interval_table_is_fixed_after_first_read() {
    let current = *SyncIntervals::global();
    assert!(!SyncIntervals::install(SyncIntervals::new(1, 1, 1, 1)));
    assert_eq!(*SyncIntervals::global(), current);
}

#[test]
fn sync_state_serializes() {
    let mut state = AccountSyncState::new();
    record_success(&mut state, Mode::FullSync, T0);

    let json = serde_json::to_string(&state).unwrap();
    let back: AccountSyncState = serde_json::from_str(&json).unwrap();
    assert_eq!(back.last_sync(Mode::FullSync), Some(T0));
}

// =========================================================================
// Coordinator
// =========================================================================

#[test]
fn two_normal_syncs_five_seconds_apart_hit_network_once() {
    let clock = Arc::new(ManualClock::new(T0));
    let coord = coordinator(clock.clone());
    let calls = AtomicUsize::new(0);

    let first = coord.synchronize(&SyncMode::NORMAL, ok_step(&calls)).unwrap();
    clock.advance(5_000);
    let second = coord.synchronize(&SyncMode::NORMAL, ok_step(&calls)).unwrap();

    assert!(first.did_sync());
    assert_eq!(second, SyncReport::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn polling_within_window_never_exceeds_one_call() {
    let clock = Arc::new(ManualClock::new(T0));
    let coord = coordinator(clock.clone());
    let calls = AtomicUsize::new(0);

    for _ in 0..30 {
        coord.synchronize(&SyncMode::NORMAL, ok_step(&calls)).unwrap();
        clock.advance(1_000);
    }
    // 30 polls over 30s: the first syncs, the rest stay inside the window.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(1_000);
    coord.synchronize(&SyncMode::NORMAL, ok_step(&calls)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn forced_sync_bypasses_throttle() {
    let clock = Arc::new(ManualClock::new(T0));
    let coord = coordinator(clock);
    let calls = AtomicUsize::new(0);

    coord.synchronize(&SyncMode::NORMAL, ok_step(&calls)).unwrap();
    coord.synchronize(&SyncMode::NORMAL_FORCED, ok_step(&calls)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn failure_does_not_advance_throttle() {
    let clock = Arc::new(ManualClock::new(T0));
    let coord = coordinator(clock.clone());

    let err = coord
        .synchronize(&SyncMode::NORMAL, |_| Err(BackendError::new("server down")))
        .unwrap_err();
    assert!(matches!(err, SyncError::Failed(_)));
    assert_eq!(coord.state().last_sync(Mode::NormalSync), None);
    assert_eq!(coord.phase(), SyncPhase::Idle);

    // Retry immediately is allowed because nothing was recorded.
    let calls = AtomicUsize::new(0);
    clock.advance(10);
    assert!(coord.synchronize(&SyncMode::NORMAL, ok_step(&calls)).unwrap().did_sync());
    assert_eq!(coord.state().last_sync(Mode::NormalSync), Some(T0 + 10));
}

#[test]
fn success_is_recorded_before_report() {
    let clock = Arc::new(ManualClock::new(T0));
    let coord = coordinator(clock.clone());

    coord
        .synchronize(&SyncMode::FULL_SYNC_ALL_ACCOUNTS, |_| {
            clock.advance(2_000);
            Ok(SyncOutcome::default())
        })
        .unwrap();

    // Timestamp taken when the step returned, not when it started.
    assert_eq!(coord.state().last_sync(Mode::FullSync), Some(T0 + 2_000));
    assert!(!coord.is_due(&SyncMode::FULL_SYNC_ALL_ACCOUNTS));
}

#[test]
fn concurrent_sync_is_rejected() {
    let clock = Arc::new(ManualClock::new(T0));
    let coord = Arc::new(coordinator(clock));
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let worker = {
        let coord = coord.clone();
        let entered = entered.clone();
        let release = release.clone();
        std::thread::spawn(move || {
            coord.synchronize(&SyncMode::NORMAL_FORCED, |_| {
                entered.wait();
                release.wait();
                Ok(SyncOutcome::default())
            })
        })
    };

    entered.wait();
    assert_eq!(coord.phase(), SyncPhase::Synchronizing);
    let second = coord.synchronize(&SyncMode::NORMAL_FORCED, |_| Ok(SyncOutcome::default()));
    assert!(matches!(second, Err(SyncError::InProgress(_))));
    release.wait();

    assert!(worker.join().unwrap().unwrap().did_sync());
    assert_eq!(coord.phase(), SyncPhase::Idle);
}

#[test]
fn restored_state_is_respected() {
    let clock = Arc::new(ManualClock::new(T0 + 1_000));
    let mut state = AccountSyncState::new();
    record_success(&mut state, Mode::NormalSync, T0);

    let coord = coordinator(clock).restore(state);
    assert!(!coord.is_due(&SyncMode::NORMAL));

    coord.reset();
    assert!(coord.is_due(&SyncMode::NORMAL));
}

// =========================================================================
// Auto sync
// =========================================================================

#[test]
fn autosync_prefers_full_sync_when_stale() {
    let policy = AutoSyncPolicy::default();

    assert_eq!(policy.next_mode(None, T0), SyncMode::FULL_SYNC_ALL_ACCOUNTS);
    assert_eq!(policy.next_mode(Some(T0), T0 + 60_000), SyncMode::NORMAL);
    assert_eq!(
        policy.next_mode(Some(T0), T0 + policy.min_fullsync_interval),
        SyncMode::FULL_SYNC_ALL_ACCOUNTS
    );
}

#[test]
fn autosync_tick_interval() {
    let policy = AutoSyncPolicy::default();
    assert!(policy.tick_due(None, T0));
    assert!(!policy.tick_due(Some(T0), T0 + 30_000));
    assert!(policy.tick_due(Some(T0), T0 + 60_001));
}
