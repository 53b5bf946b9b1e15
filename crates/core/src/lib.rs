//! Loper - typed handles for a remote database service
//!
//! Object façade over [`loper_runtime::Bridge`]. Each wrapper owns one bridge
//! handle and forwards to the bridge; lifecycle rules (cascading closes,
//! exhausted readers, cancellation) stay in the runtime.
//!
//! ```ignore
//! let client = Client::new(transport, BridgeConfig::default());
//! let connection = client.connect("https://db.example.com", None).await?;
//! let session = connection.create_session().await?;
//! let mut stream = session.execute_query("SELECT 1;").await?;
//! while let Some(chunk) = stream.next().await? {
//!     render(&chunk);
//! }
//! connection.close()?;
//! ```

mod client;
mod connection;
mod query_stream;
mod session;

pub use client::Client;
pub use connection::Connection;
pub use loper_runtime::{BridgeConfig, Credentials, Error, GlobalSessionId, ReadBatch, Result};
pub use query_stream::QueryStream;
pub use session::Session;
