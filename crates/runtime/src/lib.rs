//! Loper Runtime - handle registry, resource lifecycle, and query streaming
//!
//! This crate is the host side of the bridge a sandboxed shell module uses to
//! drive a remote database service. The module never holds host objects; it
//! sees only opaque integer handles:
//!
//! - **Handle tables**: one [`HandleTable`] per resource kind, counters that never reuse values
//! - **Managers**: [`ConnectionManager`], [`SessionManager`] and [`QueryStreamBridge`] own the lifecycle rules
//! - **Streaming**: a pump task per query feeds a bounded buffer that pulls drain in order
//! - **Dispatch**: [`Bridge`] exposes the flat API and evaluates wire envelopes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ shell module │  handles, strings, base64 chunks
//! └──────┬───────┘
//!        │ RequestEnvelope / ResponseEnvelope
//! ┌──────▼───────┐
//! │    Bridge    │  This crate
//! │  ┌────────┐  │
//! │  │ Mgrs   │  │  Connection → Session → Reader cascade
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Tables │  │  Handle → resource
//! │  └────────┘  │
//! └──────┬───────┘
//!        │ ServiceTransport / ServiceClient
//! ┌──────▼───────┐
//! │  transport   │  RPCs, frame streams
//! └──────────────┘
//! ```
//!
//! Closing a resource cancels every in-flight operation below it; those
//! operations resolve with [`Error::ResourceClosed`].

mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod handle_table;
pub mod history;
pub mod logging;
pub mod query;
mod registry;
pub mod session;
pub mod testing;
pub mod transport;

pub use bridge::{Bridge, LiveCounts};
pub use config::{BridgeConfig, HistoryConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{Error, Result};
pub use handle_table::HandleTable;
pub use history::{FileHistory, HistorySnapshot, HistoryStore};
pub use loper_protocol::{ConnectionHandle, GlobalSessionId, HandleKind, ReaderHandle, SessionHandle};
pub use query::{QueryStreamBridge, ReadBatch, ReaderState};
pub use session::{SessionManager, SessionState};
pub use transport::{
	Credentials, Frame, FrameStream, ServiceClient, ServiceTransport, TransportError, TransportResult,
};
