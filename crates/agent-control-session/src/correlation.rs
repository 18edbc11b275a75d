//! Pending-call table tying outbound command ids to their reply slots.

use std::{collections::HashMap, sync::Mutex};

use agent_control_core::AgentReply;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::dispatch::DispatchError;

/// Receiver half of a pending call.
pub type ReplyReceiver = oneshot::Receiver<Result<AgentReply, DispatchError>>;

type ReplySlot = oneshot::Sender<Result<AgentReply, DispatchError>>;

#[derive(Debug)]
struct PendingCall {
    seq: u64,
    slot: ReplySlot,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<Uuid, PendingCall>,
    next_seq: u64,
}

/// Per-session map from correlation id to a single-assignment reply slot.
///
/// An entry leaves the table exactly once: reply received, timeout, or
/// session teardown. A settled id can never resolve again.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    inner: Mutex<Inner>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh pending call and hand back its id and receiver.
    #[must_use]
    pub fn create(&self) -> (Uuid, ReplyReceiver) {
        let (slot, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.pending.insert(id, PendingCall { seq, slot });
        (id, rx)
    }

    /// Complete the matching pending call with a correlated reply.
    ///
    /// Returns false when the id is unknown or already settled; duplicate
    /// and late replies are dropped by the caller, not treated as errors.
    pub fn resolve(&self, id: Uuid, reply: AgentReply) -> bool {
        let Some(call) = self.inner.lock().unwrap().pending.remove(&id) else {
            return false;
        };
        call.slot.send(Ok(reply)).is_ok()
    }

    /// Complete the earliest still-pending call with an uncorrelated reply.
    ///
    /// Best-effort legacy matching for agents that answer with plain text;
    /// returns false when nothing is pending.
    pub fn resolve_fallback(&self, reply: AgentReply) -> bool {
        let mut reply = Ok(reply);
        loop {
            let call = {
                let mut inner = self.inner.lock().unwrap();
                let Some(id) = inner
                    .pending
                    .iter()
                    .min_by_key(|(_, call)| call.seq)
                    .map(|(id, _)| *id)
                else {
                    return false;
                };
                inner.pending.remove(&id)
            };
            let Some(call) = call else {
                return false;
            };
            match call.slot.send(reply) {
                Ok(()) => return true,
                // That waiter went away; try the next oldest.
                Err(unsent) => reply = unsent,
            }
        }
    }

    /// Fail every remaining call; used when the session is torn down.
    pub fn cancel_all(&self, reason: DispatchError) {
        let calls: Vec<PendingCall> = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.drain().map(|(_, call)| call).collect()
        };
        for call in calls {
            let _ = call.slot.send(Err(reason));
        }
    }

    /// Drop a timed-out entry without producing a second resolution.
    pub fn expire(&self, id: Uuid) {
        self.inner.lock().unwrap().pending.remove(&id);
    }

    /// Number of in-flight calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}
