//! Per-caller sessions
//!
//! Every caller identifies itself with a [`SessionId`]; the registry hands out
//! one [`Navigator`] per id so callers never share a connection pool.

use crate::client::Navigator;
use crate::{Error, PoolSettings, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The id used by callers that do not send one
impl Default for SessionId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Shared map of session id to navigator
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Navigator>>>>,
    settings: PoolSettings,
}

impl SessionRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            sessions: Arc::default(),
            settings,
        }
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Navigator for `id`, created disconnected on first use
    pub async fn navigator(&self, id: &SessionId) -> Arc<Navigator> {
        if let Some(navigator) = self.sessions.read().await.get(id) {
            return Arc::clone(navigator);
        }

        let mut sessions = self.sessions.write().await;
        let navigator = sessions.entry(id.clone()).or_insert_with(|| {
            info!(session = %id, "creating session");
            Arc::new(Navigator::new(self.settings))
        });
        Arc::clone(navigator)
    }

    /// Navigator for `id` without creating one
    pub async fn get(&self, id: &SessionId) -> Option<Arc<Navigator>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Forget a session, closing its pool if it is connected
    pub async fn remove(&self, id: &SessionId) -> Result<()> {
        let navigator = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or(Error::NoActiveConnection)?;

        info!(session = %id, "removing session");
        if navigator.is_connected().await {
            navigator.disconnect().await?;
        }
        Ok(())
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
