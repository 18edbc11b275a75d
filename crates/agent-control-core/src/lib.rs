//! Wire protocol and chunk codec for the agent control plane.
//!
//! This crate provides the pieces shared by the server and by agent
//! implementations:
//! - `AgentCommand` / `Inbound` - the JSON wire envelopes
//! - `AgentReply` - the value a dispatched command resolves to
//! - chunk codec - split/reassemble large payloads for a text channel

pub mod chunk;
pub mod protocol;

pub use chunk::{Chunk, ChunkAssembler, ChunkError, DEFAULT_CHUNK_SIZE};
pub use protocol::{AgentCommand, AgentReply, DUPLICATE_AGENT_ID, Inbound, encode_command};
