//! Operator-facing operations tying the session, job store and backend
//! together.

use std::sync::Arc;
use std::time::Duration;

use mirror_client::{BackendApi, ClientError};
use mirror_contract::{CredentialsUpdate, TransferRecord, User};
use thiserror::Error;
use tracing::{info, warn};

use crate::dispatch::{DownloadView, ViewVariant};
use crate::job_store::JobStore;
use crate::reconcile::{PollScheduler, Reconciler, TickOutcome};
use crate::session::{Session, SessionGuard};

pub const FILE_UNAVAILABLE_MESSAGE: &str = "File not found or no longer available.";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Session(#[from] anyhow::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("not logged in")]
    NotAuthenticated,
    /// Carries the backend's own wording when it sent one.
    #[error("{message}")]
    Unavailable {
        id: String,
        message: String,
        source: ClientError,
    },
}

pub struct Console {
    api: Arc<dyn BackendApi>,
    session: Arc<SessionGuard>,
    store: Arc<JobStore>,
    reconciler: Arc<Reconciler>,
    share_base: String,
}

impl Console {
    pub fn new(
        api: Arc<dyn BackendApi>,
        session: Arc<SessionGuard>,
        share_base: impl Into<String>,
    ) -> Self {
        let store = Arc::new(JobStore::new());
        let reconciler =
            Arc::new(Reconciler::new(api.clone(), &store).with_session(session.clone()));
        Self {
            api,
            session,
            store,
            reconciler,
            share_base: share_base.into(),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    /// A scheduler polling this console's store; not started.
    pub fn scheduler(&self, period: Duration) -> PollScheduler {
        PollScheduler::new(self.reconciler.clone(), period)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ConsoleError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ConsoleError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }
        let auth = self.api.login(email, password).await?;
        Ok(self.session.login(auth.token, auth.user).await?)
    }

    pub async fn logout(&self) -> Result<(), ConsoleError> {
        self.session.logout().await?;
        self.store.replace_all(Vec::new());
        Ok(())
    }

    /// Unconditional fetch-and-replace of the job collection.
    pub async fn refresh(&self) -> Result<usize, ConsoleError> {
        match self.reconciler.refresh().await? {
            TickOutcome::Refreshed(count) => Ok(count),
            _ => Ok(self.store.len()),
        }
    }

    /// Submits a new transfer, then refreshes so the job shows up at once.
    pub async fn upload(&self, url: &str) -> Result<TransferRecord, ConsoleError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConsoleError::InvalidInput(
                "a source URL is required".to_string(),
            ));
        }
        let created = self.guarded(self.api.create_transfer(url).await).await?;
        info!(job_id = %created.id, "transfer created");
        self.refresh_after_mutation().await;
        Ok(created)
    }

    /// Deletes a job. The record leaves the store only once the backend
    /// acknowledged; returns whether it was cached locally.
    pub async fn delete(&self, id: &str) -> Result<bool, ConsoleError> {
        self.guarded(self.api.delete_file(id).await).await?;
        let removed = self.store.remove(id);
        info!(job_id = %id, removed, "transfer deleted");
        self.refresh_after_mutation().await;
        Ok(removed)
    }

    /// Changes the operator's email and/or password, keeping the current
    /// token.
    pub async fn update_credentials(
        &self,
        new_email: Option<String>,
        new_password: Option<String>,
    ) -> Result<Option<String>, ConsoleError> {
        let update = CredentialsUpdate {
            new_email: new_email.filter(|email| !email.trim().is_empty()),
            new_password: new_password.filter(|password| !password.is_empty()),
        };
        if update.is_empty() {
            return Err(ConsoleError::InvalidInput(
                "provide a new email or a new password".to_string(),
            ));
        }
        let current = self
            .session
            .current()
            .ok_or(ConsoleError::NotAuthenticated)?;

        let response = self.guarded(self.api.update_credentials(&update).await).await?;
        let user = response.user.unwrap_or_else(|| User {
            email: update.new_email.clone().unwrap_or(current.user.email.clone()),
            ..current.user.clone()
        });
        self.session.login(current.token, user).await?;
        Ok(response.message)
    }

    /// Public download page for one job. Works without a session.
    pub async fn download_view(
        &self,
        id: &str,
        variant: ViewVariant,
    ) -> Result<DownloadView, ConsoleError> {
        match self.api.download_info(id).await {
            Ok(info) => Ok(DownloadView::from_info(&info, variant)),
            Err(source) => {
                warn!(job_id = %id, error = %source, "download info unavailable");
                let message = source
                    .detail()
                    .unwrap_or(FILE_UNAVAILABLE_MESSAGE)
                    .to_string();
                Err(ConsoleError::Unavailable {
                    id: id.to_string(),
                    message,
                    source,
                })
            }
        }
    }

    /// View over the cached record, for jobs already in the store.
    pub fn cached_view(&self, id: &str, variant: ViewVariant) -> Option<DownloadView> {
        self.store
            .get(id)
            .map(|record| DownloadView::from_record(&record, variant))
    }

    pub fn share_link(&self, id: &str) -> String {
        format!("{}/download/{}", self.share_base.trim_end_matches('/'), id)
    }

    async fn guarded<T>(&self, result: Result<T, ClientError>) -> Result<T, ConsoleError> {
        if let Err(err) = &result {
            if err.is_auth() {
                self.session.invalidate().await;
            }
        }
        Ok(result?)
    }

    async fn refresh_after_mutation(&self) {
        if let Err(err) = self.reconciler.refresh().await {
            warn!(error = %err, "refresh after change failed");
        }
    }
}
