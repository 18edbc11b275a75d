//! Wire protocol between the control plane and its agents.
//!
//! Everything on the wire is a single JSON text message. Outbound commands
//! carry a `command_id` the agent echoes back in its reply; replies without
//! one are matched best-effort against the oldest pending command.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Informational message sent to a connection that tried to register an
/// agent id which already has a live session.
pub const DUPLICATE_AGENT_ID: &str = "client_id_already_used";

/// Message from the server to an agent, before correlation-id injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Plain text command wrapped for the wire.
    Command { command: String },
    /// One slice of a chunked file upload. The agent appends slices in
    /// order and finalises the file on the last index.
    FileUploadChunk {
        target_path: String,
        filename: String,
        chunk_index: usize,
        total_chunks: usize,
        data: String,
    },
    /// Informational error pushed to an agent; never correlated.
    Error { message: String },
}

impl AgentCommand {
    /// Notice sent to a duplicate connection before it is closed.
    #[must_use]
    pub fn duplicate_id_notice() -> Self {
        Self::Error {
            message: DUPLICATE_AGENT_ID.to_owned(),
        }
    }

    /// Wire form of this message.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Build the wire envelope for a caller-supplied payload.
///
/// A payload that parses as a JSON object is forwarded as-is with the
/// correlation id injected as `command_id`; anything else is wrapped as a
/// plain [`AgentCommand::Command`].
#[must_use]
pub fn encode_command(payload: &str, command_id: Uuid) -> String {
    let value = match serde_json::from_str::<Value>(payload) {
        Ok(object @ Value::Object(_)) => object,
        _ => serde_json::to_value(AgentCommand::Command {
            command: payload.to_owned(),
        })
        .unwrap_or_default(),
    };
    attach_command_id(value, command_id).to_string()
}

fn attach_command_id(mut value: Value, command_id: Uuid) -> Value {
    if let Value::Object(fields) = &mut value {
        fields.insert(
            "command_id".to_owned(),
            Value::String(command_id.to_string()),
        );
    }
    value
}

/// A message received from an agent, classified for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Structured reply carrying a usable correlation id.
    Reply { command_id: Uuid, body: Value },
    /// Structured message whose `command_id` is present but unusable; it
    /// matches nothing and must not consume a fallback slot.
    Foreign(Value),
    /// Anything else: undecodable text or a structured message with no id.
    Text(String),
}

impl Inbound {
    /// Classify one raw wire message.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Ok(body) = serde_json::from_str::<Value>(raw) else {
            return Self::Text(raw.to_owned());
        };
        match body.get("command_id") {
            None => Self::Text(raw.to_owned()),
            Some(id) => match id.as_str().map(Uuid::parse_str) {
                Some(Ok(command_id)) => Self::Reply { command_id, body },
                _ => Self::Foreign(body),
            },
        }
    }
}

/// Reply value delivered back to a dispatch caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentReply {
    /// Structured reply matched by correlation id.
    Structured(Value),
    /// Raw text matched through the fallback path.
    Text(String),
}

impl AgentReply {
    /// Agent-reported `status` field, when the reply is structured.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Structured(body) => body.get("status").and_then(Value::as_str),
            Self::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_payload_is_wrapped() {
        let id = Uuid::new_v4();
        let frame = encode_command("listdir:/tmp", id);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["command"], "listdir:/tmp");
        assert_eq!(value["command_id"], id.to_string());
    }

    #[test]
    fn structured_payload_gets_id_injected() {
        let id = Uuid::new_v4();
        let frame = encode_command(r#"{"type":"ping","nonce":7}"#, id);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["nonce"], 7);
        assert_eq!(value["command_id"], id.to_string());
    }

    #[test]
    fn non_object_json_is_wrapped_verbatim() {
        let id = Uuid::new_v4();
        let frame = encode_command("[1,2,3]", id);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["command"], "[1,2,3]");
    }

    #[test]
    fn inbound_reply_with_id() {
        let id = Uuid::new_v4();
        let raw = json!({ "command_id": id.to_string(), "status": "ok" }).to_string();
        match Inbound::parse(&raw) {
            Inbound::Reply { command_id, body } => {
                assert_eq!(command_id, id);
                assert_eq!(body["status"], "ok");
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn inbound_without_id_is_text() {
        assert_eq!(
            Inbound::parse(r#"{"status":"ok"}"#),
            Inbound::Text(r#"{"status":"ok"}"#.to_owned())
        );
        assert_eq!(Inbound::parse("pong"), Inbound::Text("pong".to_owned()));
    }

    #[test]
    fn malformed_id_is_foreign() {
        let raw = r#"{"command_id":"not-a-uuid","status":"ok"}"#;
        assert!(matches!(Inbound::parse(raw), Inbound::Foreign(_)));
        let raw = r#"{"command_id":42,"status":"ok"}"#;
        assert!(matches!(Inbound::parse(raw), Inbound::Foreign(_)));
    }

    #[test]
    fn duplicate_notice_wire_shape() {
        let notice = AgentCommand::duplicate_id_notice().to_json();
        assert_eq!(
            notice,
            r#"{"type":"error","message":"client_id_already_used"}"#
        );
    }

    #[test]
    fn chunk_command_round_trips() {
        let command = AgentCommand::FileUploadChunk {
            target_path: "incoming".to_owned(),
            filename: "report.pdf".to_owned(),
            chunk_index: 2,
            total_chunks: 5,
            data: "aGVsbG8=".to_owned(),
        };
        let parsed: AgentCommand = serde_json::from_str(&command.to_json()).unwrap();
        match parsed {
            AgentCommand::FileUploadChunk {
                chunk_index,
                total_chunks,
                ..
            } => {
                assert_eq!(chunk_index, 2);
                assert_eq!(total_chunks, 5);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn reply_status_helper() {
        let reply = AgentReply::Structured(json!({ "status": "error", "result": "nope" }));
        assert_eq!(reply.status(), Some("error"));
        assert_eq!(AgentReply::Text("pong".to_owned()).status(), None);
    }
}
