//! In-memory transport for exercising the bridge without a remote service.
//!
//! [`ScriptedTransport`] records every call it receives and answers from a
//! script: queries registered with [`ScriptedTransport::script_query`] replay
//! a fixed frame list, while [`ScriptedTransport::live_query`] hands the test
//! a sender so frames can be fed (or withheld) while a pull is in flight.
//!
//! # Example
//!
//! ```ignore
//! use loper_runtime::testing::ScriptedTransport;
//! use loper_runtime::{Bridge, BridgeConfig, Frame};
//!
//! #[tokio::test]
//! async fn streams_one_chunk() {
//!     let transport = ScriptedTransport::new().with_session_ids(["abc123"]);
//!     transport.script_query("SELECT 1;", [Frame::Data(vec![1, 2].into()), Frame::End]);
//!
//!     let bridge = Bridge::new(transport.shared(), BridgeConfig::default());
//!     // ... open a connection, create a session, execute and pull
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use loper_protocol::GlobalSessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::transport::{
	Credentials, Frame, FrameStream, ServiceClient, ServiceTransport, TransportError, TransportResult,
};

/// A call observed by [`ScriptedTransport`], in the order it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
	CreateClient { url: String },
	OpenConnection,
	CloseConnection,
	CreateSession,
	CloseSession { session: String },
	ExecuteQuery { session: String, text: String },
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
	CreateClient,
	OpenConnection,
	CloseConnection,
	CreateSession,
	CloseSession,
	ExecuteQuery,
}

enum QueryScript {
	Frames(Vec<Frame>),
	Live(mpsc::UnboundedReceiver<Frame>),
}

#[derive(Default)]
struct State {
	calls: Vec<TransportCall>,
	session_ids: VecDeque<String>,
	sessions_created: usize,
	queries: HashMap<String, VecDeque<QueryScript>>,
	failures: HashMap<FailurePoint, String>,
	hang_create_session: bool,
}

/// Scripted [`ServiceTransport`] shared by every client it builds.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
	state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Global ids handed out by `create_session`, in order. Once used up, ids
	/// fall back to `session-N`.
	pub fn with_session_ids<I, S>(self, ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.state.lock().session_ids.extend(ids.into_iter().map(Into::into));
		self
	}

	/// Makes `create_session` wait forever, so tests can close the connection underneath it.
	pub fn with_hanging_create_session(self) -> Self {
		self.state.lock().hang_create_session = true;
		self
	}

	/// Makes every later call to `point` fail with `message`.
	pub fn fail(&self, point: FailurePoint, message: impl Into<String>) {
		self.state.lock().failures.insert(point, message.into());
	}

	/// Queues the frames replayed by the next execution of `text`.
	///
	/// A query without a script yields a single [`Frame::End`].
	pub fn script_query(&self, text: impl Into<String>, frames: impl IntoIterator<Item = Frame>) {
		self.state
			.lock()
			.queries
			.entry(text.into())
			.or_default()
			.push_back(QueryScript::Frames(frames.into_iter().collect()));
	}

	/// Queues a query whose frames are fed through the returned sender.
	///
	/// Dropping the sender finishes the stream.
	pub fn live_query(&self, text: impl Into<String>) -> mpsc::UnboundedSender<Frame> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.state
			.lock()
			.queries
			.entry(text.into())
			.or_default()
			.push_back(QueryScript::Live(rx));
		tx
	}

	pub fn calls(&self) -> Vec<TransportCall> {
		self.state.lock().calls.clone()
	}

	/// Number of recorded calls matching `predicate`.
	pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
		self.state.lock().calls.iter().filter(|call| predicate(call)).count()
	}

	pub fn shared(&self) -> Arc<dyn ServiceTransport> {
		Arc::new(self.clone())
	}

	fn record(&self, call: TransportCall, point: FailurePoint) -> TransportResult<()> {
		let mut state = self.state.lock();
		state.calls.push(call);
		match state.failures.get(&point) {
			Some(message) => Err(TransportError::new(message.clone())),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl ServiceTransport for ScriptedTransport {
	async fn create_client(
		&self,
		url: &Url,
		_credentials: Option<&Credentials>,
	) -> TransportResult<Arc<dyn ServiceClient>> {
		self.record(
			TransportCall::CreateClient { url: url.to_string() },
			FailurePoint::CreateClient,
		)?;
		Ok(Arc::new(ScriptedClient {
			transport: self.clone(),
		}))
	}
}

struct ScriptedClient {
	transport: ScriptedTransport,
}

#[async_trait]
impl ServiceClient for ScriptedClient {
	async fn open_connection(&self) -> TransportResult<()> {
		self.transport
			.record(TransportCall::OpenConnection, FailurePoint::OpenConnection)
	}

	async fn close_connection(&self) -> TransportResult<()> {
		self.transport
			.record(TransportCall::CloseConnection, FailurePoint::CloseConnection)
	}

	async fn create_session(&self) -> TransportResult<GlobalSessionId> {
		self.transport
			.record(TransportCall::CreateSession, FailurePoint::CreateSession)?;

		let hang = self.transport.state.lock().hang_create_session;
		if hang {
			std::future::pending::<()>().await;
		}

		let mut state = self.transport.state.lock();
		state.sessions_created += 1;
		let id = match state.session_ids.pop_front() {
			Some(id) => id,
			None => format!("session-{}", state.sessions_created),
		};
		Ok(GlobalSessionId::new(id))
	}

	async fn close_session(&self, session: &GlobalSessionId) -> TransportResult<()> {
		self.transport.record(
			TransportCall::CloseSession {
				session: session.to_string(),
			},
			FailurePoint::CloseSession,
		)
	}

	async fn execute_query(&self, session: &GlobalSessionId, text: &str) -> TransportResult<FrameStream> {
		self.transport.record(
			TransportCall::ExecuteQuery {
				session: session.to_string(),
				text: text.to_string(),
			},
			FailurePoint::ExecuteQuery,
		)?;

		let script = self
			.transport
			.state
			.lock()
			.queries
			.get_mut(text)
			.and_then(VecDeque::pop_front);

		Ok(match script {
			Some(QueryScript::Frames(frames)) => stream::iter(frames).boxed(),
			Some(QueryScript::Live(mut rx)) => stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed(),
			None => stream::iter([Frame::End]).boxed(),
		})
	}
}
