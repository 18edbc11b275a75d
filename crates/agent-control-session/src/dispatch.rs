//! Correlated command dispatch over a session's shared stream.

use std::{sync::Arc, time::Duration};

use agent_control_core::{AgentReply, protocol};
use thiserror::Error;
use tokio::time;

use crate::registry::SessionRegistry;

/// Reply budget used by callers that do not pick their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a dispatched command produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("agent is not connected")]
    Offline,
    #[error("agent did not reply in time")]
    Timeout,
    #[error("session closed while the command was in flight")]
    Disconnected,
}

/// Issues correlated commands and awaits their replies.
///
/// Cheap to clone; any number of tasks may dispatch concurrently against
/// the same session without cross-talk. Each call suspends only on its own
/// reply slot, never on the read loop or on other callers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this dispatcher resolves agent ids against.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Send one command to an agent and wait for the matching reply.
    ///
    /// A payload that parses as a JSON object is forwarded with the
    /// correlation id injected; any other payload is wrapped as a plain
    /// `command` envelope, so callers may pass structured commands and
    /// bare strings uniformly.
    ///
    /// # Errors
    /// `Offline` when the agent has no live session, `Timeout` when no
    /// reply arrives within `timeout` (the pending entry is removed),
    /// `Disconnected` when the session is torn down while the call is in
    /// flight. A timeout affects only this call; the session and other
    /// pending calls stay live.
    pub async fn dispatch(
        &self,
        agent_id: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<AgentReply, DispatchError> {
        let session = self
            .registry
            .lookup(agent_id)
            .await
            .ok_or(DispatchError::Offline)?;

        let (command_id, reply) = session.correlations().create();
        let frame = protocol::encode_command(payload, command_id);
        if let Err(err) = session.send_raw(frame) {
            session.correlations().expire(command_id);
            return Err(err);
        }
        tracing::debug!("agent {agent_id}: sent command {command_id}");

        match time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DispatchError::Disconnected),
            Err(_) => {
                session.correlations().expire(command_id);
                tracing::debug!("agent {agent_id}: command {command_id} timed out");
                Err(DispatchError::Timeout)
            }
        }
    }
}
