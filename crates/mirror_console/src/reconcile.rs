use std::sync::{Arc, Weak};
use std::time::Duration;

use mirror_client::{BackendApi, ClientError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::job_store::JobStore;
use crate::session::SessionGuard;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every cached job is terminal; no request was made.
    Skipped,
    Refreshed(usize),
    /// The fetch failed and the previous snapshot was kept.
    Failed,
    /// The store is gone; any fetched result was dropped.
    Detached,
}

/// Pulls the full job collection and swaps it into the store.
///
/// Only a weak handle to the store is kept so a fetch resolving after the
/// view is torn down lands nowhere.
pub struct Reconciler {
    api: Arc<dyn BackendApi>,
    store: Weak<JobStore>,
    session: Option<Arc<SessionGuard>>,
}

impl Reconciler {
    pub fn new(api: Arc<dyn BackendApi>, store: &Arc<JobStore>) -> Self {
        Self {
            api,
            store: Arc::downgrade(store),
            session: None,
        }
    }

    /// Rejected tokens seen while polling invalidate this session.
    pub fn with_session(mut self, session: Arc<SessionGuard>) -> Self {
        self.session = Some(session);
        self
    }

    /// Unconditional fetch-and-replace.
    pub async fn refresh(&self) -> Result<TickOutcome, ClientError> {
        let records = match self.api.list_files().await {
            Ok(records) => records,
            Err(err) => {
                if err.is_auth() {
                    if let Some(session) = &self.session {
                        session.invalidate().await;
                    }
                }
                return Err(err);
            }
        };

        match self.store.upgrade() {
            Some(store) => {
                let count = records.len();
                store.replace_all(records);
                Ok(TickOutcome::Refreshed(count))
            }
            None => {
                debug!("job store dropped before fetch resolved; discarding result");
                Ok(TickOutcome::Detached)
            }
        }
    }

    /// One poll step: fetch only while the current snapshot still has a
    /// pending or downloading job. Failures are logged and swallowed.
    pub async fn tick(&self) -> TickOutcome {
        let has_pending_work = match self.store.upgrade() {
            Some(store) => store.has_pending_work(),
            None => return TickOutcome::Detached,
        };
        if !has_pending_work {
            return TickOutcome::Skipped;
        }

        match self.refresh().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "job refresh failed; keeping previous snapshot");
                TickOutcome::Failed
            }
        }
    }
}

/// Drives a [`Reconciler`] on a fixed cadence.
///
/// Each step runs as its own task, so stopping the timer never cancels a
/// request already on the wire, and a slow step can overlap the next one.
pub struct PollScheduler {
    reconciler: Arc<Reconciler>,
    period: Duration,
    timer: Option<JoinHandle<()>>,
}

const MIN_PERIOD: Duration = Duration::from_millis(1);

impl PollScheduler {
    /// Periods below one millisecond are raised to it.
    pub fn new(reconciler: Arc<Reconciler>, period: Duration) -> Self {
        Self {
            reconciler,
            period: period.max(MIN_PERIOD),
            timer: None,
        }
    }

    /// Fetches once right away, then ticks every period. Restarting an
    /// active scheduler replaces its timer.
    pub fn start(&mut self) {
        self.stop();

        let initial = self.reconciler.clone();
        tokio::spawn(async move {
            if let Err(err) = initial.refresh().await {
                warn!(error = %err, "initial job fetch failed");
            }
        });

        let reconciler = self.reconciler.clone();
        let period = self.period;
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let step = reconciler.clone();
                tokio::spawn(async move {
                    step.tick().await;
                });
            }
        }));
        info!(period_ms = self.period.as_millis() as u64, "job polling started");
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            info!("job polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
