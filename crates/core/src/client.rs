use std::sync::Arc;

use loper_runtime::{Bridge, BridgeConfig, Credentials, Result, ServiceTransport};

use crate::Connection;

/// Entry point: owns the bridge every handle below it goes through.
#[derive(Clone)]
pub struct Client {
	bridge: Arc<Bridge>,
}

impl Client {
	pub fn new(transport: Arc<dyn ServiceTransport>, config: BridgeConfig) -> Self {
		Self::from_bridge(Arc::new(Bridge::new(transport, config)))
	}

	/// Wraps an existing bridge, e.g. one also driven through wire dispatch.
	pub fn from_bridge(bridge: Arc<Bridge>) -> Self {
		Self { bridge }
	}

	pub fn bridge(&self) -> &Arc<Bridge> {
		&self.bridge
	}

	/// Opens a connection to the service at `url`.
	pub async fn connect(&self, url: &str, credentials: Option<Credentials>) -> Result<Connection> {
		let handle = self.bridge.open_connection(url, credentials).await?;
		Ok(Connection::new(Arc::clone(&self.bridge), handle))
	}

	/// Closes every open connection and waits for background cleanup.
	pub async fn shutdown(&self) {
		self.bridge.shutdown().await;
	}
}
