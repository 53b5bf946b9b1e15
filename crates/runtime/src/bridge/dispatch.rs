use loper_protocol::{BridgeRequest, BridgeResponse, RequestEnvelope, ResponseEnvelope};
use tracing::debug;

use super::Bridge;
use crate::error::{Error, Result};
use crate::transport::Credentials;

impl Bridge {
	/// Evaluates one wire request. Failures become [`BridgeResponse::Error`].
	pub async fn dispatch(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
		let RequestEnvelope { id, request } = envelope;
		let operation = request.operation();

		let response = match self.handle_request(request).await {
			Ok(response) => response,
			Err(err) => {
				debug!(target: "loper::bridge", id, operation, error = %err, "request failed");
				error_response(&err)
			}
		};
		ResponseEnvelope { id, response }
	}

	/// Evaluates a JSON-encoded [`RequestEnvelope`] and encodes the reply.
	///
	/// Only a payload that cannot be decoded fails; bridge errors are encoded
	/// in the response.
	pub async fn dispatch_json(&self, payload: &str) -> Result<String> {
		let envelope: RequestEnvelope = serde_json::from_str(payload)?;
		let response = self.dispatch(envelope).await;
		Ok(serde_json::to_string(&response)?)
	}

	async fn handle_request(&self, request: BridgeRequest) -> Result<BridgeResponse> {
		Ok(match request {
			BridgeRequest::OpenConnection { url, credentials } => {
				let connection = self
					.open_connection(&url, credentials.map(Credentials::new))
					.await?;
				BridgeResponse::Connection { connection }
			}
			BridgeRequest::CloseConnection { connection } => {
				self.close_connection(connection)?;
				BridgeResponse::Ok
			}
			BridgeRequest::CreateSession { connection } => {
				let (session, global_session_id) = self.create_session(connection).await?;
				BridgeResponse::Session {
					session,
					global_session_id,
				}
			}
			BridgeRequest::CloseSession { session } => {
				self.close_session(session)?;
				BridgeResponse::Ok
			}
			BridgeRequest::ExecuteQuery { session, text } => {
				let reader = self.execute_query(session, &text).await?;
				BridgeResponse::Reader { reader }
			}
			BridgeRequest::Pull { reader } => match self.pull(reader).await? {
				Some(data) => BridgeResponse::Chunk { data },
				None => BridgeResponse::EndOfStream,
			},
			BridgeRequest::PullAvailable { reader } => {
				let batch = self.pull_available(reader).await?;
				BridgeResponse::Chunks {
					chunks: batch.chunks,
					finished: batch.finished,
				}
			}
			BridgeRequest::CloseReader { reader } => {
				self.close_reader(reader);
				BridgeResponse::Ok
			}
		})
	}
}

fn error_response(err: &Error) -> BridgeResponse {
	BridgeResponse::Error {
		code: err.code(),
		message: err.to_string(),
	}
}
