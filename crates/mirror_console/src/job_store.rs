use std::sync::Arc;

use mirror_contract::TransferRecord;
use tokio::sync::watch;
use tracing::debug;

pub type Snapshot = Arc<Vec<TransferRecord>>;

/// Client-side cache of transfer jobs.
///
/// The backend is the only authority, so the collection is only ever swapped
/// wholesale or shrunk by a confirmed delete. Subscribers see the new value
/// as soon as the mutating call returns.
#[derive(Debug)]
pub struct JobStore {
    tx: watch::Sender<Snapshot>,
}

impl JobStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    pub fn replace_all(&self, records: Vec<TransferRecord>) {
        debug!(count = records.len(), "job store replaced");
        self.tx.send_replace(Arc::new(records));
    }

    /// Drops `id` after the backend acknowledged its deletion. Absent ids are
    /// a no-op; returns whether anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if !current.iter().any(|record| record.id == id) {
                return false;
            }
            let remaining = current
                .iter()
                .filter(|record| record.id != id)
                .cloned()
                .collect();
            *current = Arc::new(remaining);
            true
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<TransferRecord> {
        self.tx.borrow().iter().find(|record| record.id == id).cloned()
    }

    /// Whether any job is still `PENDING` or `DOWNLOADING`.
    pub fn has_pending_work(&self) -> bool {
        self.tx.borrow().iter().any(TransferRecord::is_active)
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
