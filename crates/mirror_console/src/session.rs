use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirror_client::TokenSource;
use mirror_contract::User;
use mirror_storage::{SessionStorage, StoredSession};
use tracing::{info, warn};

use crate::clock::Clock;

/// Durable side of the session. The stored token is the real credential.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredSession>>;
    async fn token(&self) -> Result<Option<String>>;
    async fn save(&self, token: &str, user: &User, stored_at: DateTime<Utc>) -> Result<()>;
    async fn clear(&self) -> Result<bool>;
}

#[async_trait]
impl SessionStore for SessionStorage {
    async fn load(&self) -> Result<Option<StoredSession>> {
        SessionStorage::load(self).await
    }

    async fn token(&self) -> Result<Option<String>> {
        SessionStorage::token(self).await
    }

    async fn save(&self, token: &str, user: &User, stored_at: DateTime<Utc>) -> Result<()> {
        SessionStorage::save(self, token, user, stored_at).await
    }

    async fn clear(&self) -> Result<bool> {
        SessionStorage::clear(self).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub established_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Download(String),
    Dashboard,
    Settings,
    Root,
}

impl Route {
    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Dashboard | Route::Settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Render(Route),
    Redirect(Route),
}

/// Holds the operator session in memory, mirrored to durable storage.
pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Session>>,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            current: RwLock::new(None),
        }
    }

    /// Builds a guard seeded from whatever session durable storage holds.
    pub async fn restore(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let guard = Self::new(store, clock);
        if let Some(stored) = guard.store.load().await? {
            info!(user = %stored.user.email, "restored session");
            guard.set(Some(Session {
                token: stored.token,
                user: stored.user,
                established_at: stored.stored_at,
            }));
        }
        Ok(guard)
    }

    pub async fn login(&self, token: String, user: User) -> Result<Session> {
        let established_at = self.clock.now_utc();
        self.store.save(&token, &user, established_at).await?;
        let session = Session {
            token,
            user,
            established_at,
        };
        self.set(Some(session.clone()));
        info!(user = %session.user.email, "session established");
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        self.set(None);
        self.store.clear().await?;
        info!("session cleared");
        Ok(())
    }

    /// Tears the session down after the backend rejected its token.
    pub async fn invalidate(&self) {
        if self.take().is_some() {
            warn!("session invalidated by backend");
        }
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear durable session");
        }
    }

    /// Drops the in-memory session if its durable token has been removed
    /// behind our back. Returns whether a session is still held.
    pub async fn observe(&self) -> Result<bool> {
        if self.current().is_none() {
            return Ok(false);
        }
        if self.store.token().await?.is_some() {
            return Ok(true);
        }
        if self.take().is_some() {
            info!("durable token removed externally; session torn down");
        }
        Ok(false)
    }

    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Routing gate only; the backend still checks the token.
    pub fn gate(&self, route: Route) -> RouteDecision {
        match route {
            Route::Root => RouteDecision::Redirect(Route::Dashboard),
            route if route.requires_session() && !self.is_authenticated() => {
                RouteDecision::Redirect(Route::Login)
            }
            route => RouteDecision::Render(route),
        }
    }

    fn set(&self, session: Option<Session>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    fn take(&self) -> Option<Session> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl TokenSource for SessionGuard {
    fn bearer_token(&self) -> Option<String> {
        self.current().map(|session| session.token)
    }
}
