use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::chain::api::ChainBackend;
use crate::error::SyncError;
use crate::sync::{AccountSyncCoordinator, AccountSyncState, Clock, SyncMode, SyncReport};
use crate::tx::{OutgoingQueue, UnsignedTransactionBuilder, UnspentOutput};

/// State every account variant shares: its sync gate, chain collaborator,
/// transaction builder and outgoing queue.
pub struct AccountCore {
    id: String,
    coordinator: AccountSyncCoordinator,
    backend: Arc<dyn ChainBackend>,
    builder: UnsignedTransactionBuilder,
    queue: Mutex<OutgoingQueue>,
}

impl AccountCore {
    pub fn new(
        id: impl Into<String>,
        backend: Arc<dyn ChainBackend>,
        builder: UnsignedTransactionBuilder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let id = id.into();
        let coordinator = AccountSyncCoordinator::new(id.clone(), clock);
        Self::with_coordinator(id, coordinator, backend, builder)
    }

    pub fn with_coordinator(
        id: impl Into<String>,
        coordinator: AccountSyncCoordinator,
        backend: Arc<dyn ChainBackend>,
        builder: UnsignedTransactionBuilder,
    ) -> Self {
        Self {
            id: id.into(),
            coordinator,
            backend,
            builder,
            queue: Mutex::new(OutgoingQueue::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coordinator(&self) -> &AccountSyncCoordinator {
        &self.coordinator
    }

    pub fn backend(&self) -> &dyn ChainBackend {
        self.backend.as_ref()
    }

    pub fn builder(&self) -> &UnsignedTransactionBuilder {
        &self.builder
    }

    pub fn queue(&self) -> MutexGuard<'_, OutgoingQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sync_state(&self) -> AccountSyncState {
        self.coordinator.state()
    }

    /// Throttled network sync. A successful one refreshes the output cache,
    /// so outputs spent by transactions broadcast before the network step
    /// started no longer need masking.
    pub fn synchronize(&self, mode: &SyncMode) -> Result<SyncReport, SyncError> {
        let mut started_at = None;
        let report = self.coordinator.synchronize(mode, |m| {
            started_at = Some(self.queue().epoch());
            self.backend.sync_account(&self.id, m)
        })?;
        if let (true, Some(epoch)) = (report.did_sync(), started_at) {
            self.queue().on_synced(epoch);
        }
        Ok(report)
    }

    /// Cached outputs minus those reserved or spent by outgoing
    /// transactions, further narrowed by `keep`. Order is the backend's.
    pub fn outputs<P>(&self, keep: P) -> Vec<UnspentOutput>
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        let queue = self.queue();
        self.backend
            .spendable_outputs(&self.id)
            .into_iter()
            .filter(|u| !queue.is_excluded(&u.outpoint) && keep(u))
            .collect()
    }
}

impl std::fmt::Debug for AccountCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCore")
            .field("id", &self.id)
            .field("coordinator", &self.coordinator)
            .field("queued", &self.queue().len())
            .finish()
    }
}
