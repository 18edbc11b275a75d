//! Process-wide registry of connected agent sessions.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

use crate::session::Session;

/// Registration failure.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent {0:?} already has a live session")]
    AlreadyConnected(String),
}

/// Map of agent id to live session, at most one session per id.
///
/// Construct one per server and share it via `Arc`: the connection accept
/// path registers and removes sessions, dispatchers look them up. The lock
/// guards only the map; per-session state has its own synchronization, so
/// traffic on one agent never serializes another.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a newly connected agent.
    ///
    /// # Errors
    /// Rejects a colliding id with [`RegistryError::AlreadyConnected`];
    /// the incumbent session and its pending calls are left untouched.
    pub async fn register(
        &self,
        agent_id: &str,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Result<Arc<Session>, RegistryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(agent_id) {
            return Err(RegistryError::AlreadyConnected(agent_id.to_owned()));
        }
        let session = Arc::new(Session::new(agent_id.to_owned(), outbound));
        sessions.insert(agent_id.to_owned(), Arc::clone(&session));
        Ok(session)
    }

    /// Live session for an agent, if any.
    pub async fn lookup(&self, agent_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(agent_id).cloned()
    }

    /// Drop an agent's session and fail all of its in-flight calls.
    ///
    /// Called once per session, when its transport terminates.
    pub async fn remove(&self, agent_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().await.remove(agent_id)?;
        session.close();
        Some(session)
    }

    /// Ids of all connected agents, sorted.
    pub async fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_control_core::AgentReply;
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        registry.register("A1", tx_a).await.unwrap();
        let err = registry.register("A1", tx_b).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyConnected(id) if id == "A1"));
    }

    #[tokio::test]
    async fn rejected_duplicate_leaves_incumbent_pending_calls_alone() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        let incumbent = registry.register("A1", tx_a).await.unwrap();
        let (id, rx) = incumbent.correlations().create();

        assert!(registry.register("A1", tx_b).await.is_err());
        assert_eq!(incumbent.correlations().pending_count(), 1);

        assert!(
            incumbent
                .correlations()
                .resolve(id, AgentReply::Text("still here".to_owned()))
        );
        assert_eq!(
            rx.await.unwrap().unwrap(),
            AgentReply::Text("still here".to_owned())
        );
    }

    #[tokio::test]
    async fn remove_cancels_pending_and_frees_the_id() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = registry.register("A1", tx).await.unwrap();
        let (_id, pending) = session.correlations().create();

        assert!(registry.remove("A1").await.is_some());
        assert!(pending.await.unwrap().is_err());
        assert!(registry.remove("A1").await.is_none());

        let (tx, _rx) = mpsc::unbounded_channel();
        tokio_test::assert_ok!(registry.register("A1", tx).await);
    }

    #[tokio::test]
    async fn list_active_is_sorted() {
        let registry = SessionRegistry::new();
        for id in ["zulu", "alpha", "mike"] {
            let (tx, _rx) = mpsc::unbounded_channel();
            registry.register(id, tx).await.unwrap();
        }
        assert_eq!(registry.list_active().await, ["alpha", "mike", "zulu"]);
    }
}
