//! StateStore - single writer, many non-blocking readers

use contracts::{StateEvent, StateSnapshot, StopSignal, WorkerHandle};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Owner of the published snapshot
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<StateSnapshot>,
}

impl StateStore {
    pub fn new(initial: StateSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Reader handle; reads never wait for the writer
    pub fn reader(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Apply one event and publish the result
    pub fn apply(&self, event: StateEvent) {
        if let StateEvent::Status(status) = &event {
            info!(state = status.state.as_str(), message = %status.message, "system status changed");
            observability::metrics::record_system_state(status.state);
        }
        self.tx.send_modify(|snapshot| snapshot.apply(event));
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.tx.borrow().clone()
    }
}

/// Read side of the store
#[derive(Debug, Clone)]
pub struct StateReader {
    rx: watch::Receiver<StateSnapshot>,
}

impl StateReader {
    /// Latest published snapshot
    pub fn snapshot(&self) -> StateSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next publish; `false` once the store is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Single consumer of every `StateEvent`
pub struct StateAggregator {
    store: StateStore,
    events: mpsc::Receiver<StateEvent>,
}

impl StateAggregator {
    pub fn new(store: StateStore, events: mpsc::Receiver<StateEvent>) -> Self {
        Self { store, events }
    }

    pub fn spawn(self, stop: StopSignal) -> WorkerHandle {
        let signal = stop.clone();
        WorkerHandle::spawn("state_aggregator", stop, self.run(signal))
    }

    async fn run(mut self, stop: StopSignal) {
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.store.apply(event),
                    None => break,
                },
            }
        }

        // Publish whatever was sent before the stop
        let mut drained = 0usize;
        while let Ok(event) = self.events.try_recv() {
            self.store.apply(event);
            drained += 1;
        }
        debug!(drained, "state aggregator stopped");
    }
}
