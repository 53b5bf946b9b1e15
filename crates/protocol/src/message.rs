//! Request and response messages exchanged across the sandbox boundary.
//!
//! The shell sends a [`RequestEnvelope`] per bridge call and receives exactly
//! one [`ResponseEnvelope`] carrying the same `id`. Calls on different handles
//! may be in flight at once, so responses can arrive out of request order.
//!
//! Chunk payloads travel as standard base64 strings.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::handle::{ConnectionHandle, GlobalSessionId, ReaderHandle, SessionHandle};

/// A flat bridge call issued by the shell module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
	OpenConnection {
		url: String,
		/// Opaque credentials forwarded to the transport untouched.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		credentials: Option<String>,
	},
	CloseConnection {
		connection: ConnectionHandle,
	},
	CreateSession {
		connection: ConnectionHandle,
	},
	CloseSession {
		session: SessionHandle,
	},
	ExecuteQuery {
		session: SessionHandle,
		text: String,
	},
	/// Wait for the next chunk of a query result.
	Pull {
		reader: ReaderHandle,
	},
	/// Take every chunk already buffered, waiting only if none is.
	PullAvailable {
		reader: ReaderHandle,
	},
	CloseReader {
		reader: ReaderHandle,
	},
}

impl BridgeRequest {
	/// Short operation name used in logs.
	pub fn operation(&self) -> &'static str {
		match self {
			BridgeRequest::OpenConnection { .. } => "open_connection",
			BridgeRequest::CloseConnection { .. } => "close_connection",
			BridgeRequest::CreateSession { .. } => "create_session",
			BridgeRequest::CloseSession { .. } => "close_session",
			BridgeRequest::ExecuteQuery { .. } => "execute_query",
			BridgeRequest::Pull { .. } => "pull",
			BridgeRequest::PullAvailable { .. } => "pull_available",
			BridgeRequest::CloseReader { .. } => "close_reader",
		}
	}
}

/// Result of a [`BridgeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeResponse {
	Connection {
		connection: ConnectionHandle,
	},
	Session {
		session: SessionHandle,
		global_session_id: GlobalSessionId,
	},
	Reader {
		reader: ReaderHandle,
	},
	Chunk {
		#[serde(with = "base64_bytes")]
		data: Bytes,
	},
	Chunks {
		#[serde(with = "base64_chunks")]
		chunks: Vec<Bytes>,
		/// True once the stream has signalled its end.
		finished: bool,
	},
	EndOfStream,
	Ok,
	Error {
		code: ErrorCode,
		message: String,
	},
}

/// Stable error classification the shell can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	InvalidHandle,
	IllegalState,
	ServiceError,
	TransportFailure,
	ResourceClosed,
	InvalidArgument,
	InternalError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
	pub id: u64,
	pub request: BridgeRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
	pub id: u64,
	pub response: BridgeResponse,
}

mod base64_bytes {
	use base64::Engine;
	use base64::engine::general_purpose::STANDARD;
	use bytes::Bytes;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&STANDARD.encode(data))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		STANDARD
			.decode(encoded.as_bytes())
			.map(Bytes::from)
			.map_err(serde::de::Error::custom)
	}
}

mod base64_chunks {
	use base64::Engine;
	use base64::engine::general_purpose::STANDARD;
	use bytes::Bytes;
	use serde::ser::SerializeSeq;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(chunks: &[Bytes], serializer: S) -> Result<S::Ok, S::Error> {
		let mut seq = serializer.serialize_seq(Some(chunks.len()))?;
		for chunk in chunks {
			seq.serialize_element(&STANDARD.encode(chunk))?;
		}
		seq.end()
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Bytes>, D::Error> {
		Vec::<String>::deserialize(deserializer)?
			.into_iter()
			.map(|encoded| {
				STANDARD
					.decode(encoded.as_bytes())
					.map(Bytes::from)
					.map_err(serde::de::Error::custom)
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_uses_snake_case_tag() {
		let json = r#"{"id": 9, "request": {"type": "execute_query", "session": 1, "text": "SELECT 1"}}"#;
		let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();

		assert_eq!(envelope.id, 9);
		assert_eq!(envelope.request.operation(), "execute_query");
		match envelope.request {
			BridgeRequest::ExecuteQuery { session, text } => {
				assert_eq!(session, SessionHandle::from(1));
				assert_eq!(text, "SELECT 1");
			}
			other => panic!("Expected ExecuteQuery, got {other:?}"),
		}
	}

	#[test]
	fn open_connection_credentials_are_optional() {
		let json = r#"{"type": "open_connection", "url": "https://host"}"#;
		let request: BridgeRequest = serde_json::from_str(json).unwrap();
		assert_eq!(
			request,
			BridgeRequest::OpenConnection {
				url: "https://host".to_string(),
				credentials: None,
			}
		);
	}

	#[test]
	fn chunk_payload_is_base64() {
		let response = BridgeResponse::Chunk {
			data: Bytes::from_static(&[0x01, 0x02]),
		};
		let value = serde_json::to_value(&response).unwrap();
		assert_eq!(value["type"], "chunk");
		assert_eq!(value["data"], "AQI=");
	}

	#[test]
	fn chunks_decode_in_order() {
		let json = r#"{"type": "chunks", "chunks": ["AQ==", "Ag=="], "finished": true}"#;
		let response: BridgeResponse = serde_json::from_str(json).unwrap();
		match response {
			BridgeResponse::Chunks { chunks, finished } => {
				assert_eq!(chunks, vec![Bytes::from_static(&[1]), Bytes::from_static(&[2])]);
				assert!(finished);
			}
			other => panic!("Expected Chunks, got {other:?}"),
		}
	}

	#[test]
	fn invalid_base64_is_rejected() {
		let json = r#"{"type": "chunk", "data": "not base64!"}"#;
		assert!(serde_json::from_str::<BridgeResponse>(json).is_err());
	}

	#[test]
	fn error_code_serializes_snake_case() {
		let response = BridgeResponse::Error {
			code: ErrorCode::InvalidHandle,
			message: "Invalid handle: reader#1".to_string(),
		};
		let value = serde_json::to_value(&response).unwrap();
		assert_eq!(value["code"], "invalid_handle");
	}
}
