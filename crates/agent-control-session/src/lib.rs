//! Session management and command correlation for the agent control plane.
//!
//! Provides:
//! - `SessionRegistry` - at most one live session per agent id
//! - `CorrelationTable` - pending-call tracking per session
//! - `Dispatcher` - correlated request/response over one shared stream
//! - chunked file/directory delivery built on `Dispatcher`

pub mod archive;
pub mod correlation;
pub mod dispatch;
pub mod registry;
pub mod session;
pub mod transfer;

pub use correlation::CorrelationTable;
pub use dispatch::{DEFAULT_TIMEOUT, DispatchError, Dispatcher};
pub use registry::{RegistryError, SessionRegistry};
pub use session::Session;
pub use transfer::{TransferError, TransferOutcome};
