//! Per-agent session state: the outbound queue and correlation table.

use agent_control_core::{AgentReply, Inbound};
use tokio::sync::mpsc;

use crate::{correlation::CorrelationTable, dispatch::DispatchError};

/// Server-side state for one connected agent.
///
/// Owns the sending half of the session's outbound queue (a single writer
/// task drains it, keeping wire frames whole) and the correlation table
/// that pairs outbound commands with inbound replies.
#[derive(Debug)]
pub struct Session {
    agent_id: String,
    outbound: mpsc::UnboundedSender<String>,
    correlations: CorrelationTable,
}

impl Session {
    pub(crate) fn new(agent_id: String, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            agent_id,
            outbound,
            correlations: CorrelationTable::new(),
        }
    }

    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Correlation table owned by this session.
    #[must_use]
    pub fn correlations(&self) -> &CorrelationTable {
        &self.correlations
    }

    /// Queue a wire frame for the writer task.
    ///
    /// # Errors
    /// Fails with `Disconnected` when the writer side is gone.
    pub fn send_raw(&self, frame: String) -> Result<(), DispatchError> {
        self.outbound
            .send(frame)
            .map_err(|_| DispatchError::Disconnected)
    }

    /// Route one inbound message, in arrival order.
    ///
    /// Correlated replies complete their pending call; messages without a
    /// usable id complete the oldest pending call; whatever matches nothing
    /// is dropped. Unsolicited input is never buffered.
    pub fn handle_message(&self, raw: &str) {
        match Inbound::parse(raw) {
            Inbound::Reply { command_id, body } => {
                if !self
                    .correlations
                    .resolve(command_id, AgentReply::Structured(body))
                {
                    tracing::debug!(
                        "agent {}: reply {command_id} matched no pending command, dropped",
                        self.agent_id
                    );
                }
            }
            Inbound::Foreign(body) => {
                tracing::debug!(
                    "agent {}: unusable correlation id in {body}, dropped",
                    self.agent_id
                );
            }
            Inbound::Text(text) => {
                if !self.correlations.resolve_fallback(AgentReply::Text(text)) {
                    tracing::debug!(
                        "agent {}: unsolicited message with nothing pending, dropped",
                        self.agent_id
                    );
                }
            }
        }
    }

    /// Fail every in-flight call; the session is going away.
    pub(crate) fn close(&self) {
        self.correlations.cancel_all(DispatchError::Disconnected);
    }
}
