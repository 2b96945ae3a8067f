//! Live fan-out of completed records
//!
//! At-most-once, best-effort delivery: subscribers attached after a push,
//! or that fell behind the channel capacity, never see the missed records.
//! There is no per-subscriber backlog and no replay.

use {crate::types::CompletedRecord, tokio::sync::broadcast};

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<CompletedRecord>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach a live subscriber. Only records published after this call
    /// are delivered to it.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletedRecord> {
        self.tx.subscribe()
    }

    /// Push a record to every currently-connected subscriber.
    ///
    /// Returns how many subscribers received it; zero when nobody is
    /// listening, which is not an error.
    pub fn publish(&self, record: CompletedRecord) -> usize {
        self.tx.send(record).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
