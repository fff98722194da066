use crate::broadcast::SubscriberHub;
use crate::ingest::IngestState;
use crate::shutdown::{self, ShutdownReceiver};
use crate::subscriptions::SubscriptionStore;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub hub: SubscriberHub,
    pub subscriptions: SubscriptionStore,
    pub ingest_state: watch::Receiver<IngestState>,
    pub shutdown: ShutdownReceiver,
}

impl AppState {
    pub fn new(
        hub: SubscriberHub,
        ingest_state: watch::Receiver<IngestState>,
        shutdown: ShutdownReceiver,
    ) -> Self {
        Self {
            hub,
            subscriptions: SubscriptionStore::new(),
            ingest_state,
            shutdown,
        }
    }

    /// Ingest state as seen by probes; `Stopping` as soon as shutdown is
    /// requested, even before the loop has noticed.
    pub fn current_ingest_state(&self) -> IngestState {
        if shutdown::is_cancelled(&self.shutdown) {
            IngestState::Stopping
        } else {
            *self.ingest_state.borrow()
        }
    }
}
