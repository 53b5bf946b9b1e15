//! Opaque handle types handed to the shell module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three kinds of host-owned resource a handle can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
	Connection,
	Session,
	Reader,
}

impl fmt::Display for HandleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			HandleKind::Connection => "connection",
			HandleKind::Session => "session",
			HandleKind::Reader => "reader",
		})
	}
}

/// A handle newtype bound to one [`HandleKind`].
///
/// Handles of different kinds never mix: a session handle cannot be passed
/// where a connection handle is expected.
pub trait TypedHandle: Copy + Eq + Ord + fmt::Debug + Send + Sync + 'static {
	const KIND: HandleKind;

	fn from_raw(raw: u32) -> Self;

	fn raw(self) -> u32;
}

macro_rules! typed_handle {
	($(#[$meta:meta])* $name:ident => $kind:expr) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(u32);

		impl TypedHandle for $name {
			const KIND: HandleKind = $kind;

			fn from_raw(raw: u32) -> Self {
				Self(raw)
			}

			fn raw(self) -> u32 {
				self.0
			}
		}

		impl From<u32> for $name {
			fn from(raw: u32) -> Self {
				Self(raw)
			}
		}

		impl From<$name> for u32 {
			fn from(handle: $name) -> u32 {
				handle.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}#{}", $kind, self.0)
			}
		}
	};
}

typed_handle!(
	/// Handle to an open connection to the remote service.
	ConnectionHandle => HandleKind::Connection
);
typed_handle!(
	/// Handle to a session scoped to one connection.
	SessionHandle => HandleKind::Session
);
typed_handle!(
	/// Handle to the pull-based reader over one query's result chunks.
	ReaderHandle => HandleKind::Reader
);

/// Session identifier assigned by the remote service.
///
/// Opaque to the bridge; only the service interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalSessionId(String);

impl GlobalSessionId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for GlobalSessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for GlobalSessionId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for GlobalSessionId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn handles_serialize_as_bare_integers() {
		let json = serde_json::to_string(&SessionHandle::from(7)).unwrap();
		assert_eq!(json, "7");

		let handle: ReaderHandle = serde_json::from_str("42").unwrap();
		assert_eq!(handle.raw(), 42);
	}

	#[test]
	fn handle_display_names_kind() {
		assert_eq!(ConnectionHandle::from(3).to_string(), "connection#3");
		assert_eq!(ReaderHandle::from(1).to_string(), "reader#1");
	}

	#[test]
	fn global_session_id_is_transparent() {
		let id = GlobalSessionId::new("abc123");
		assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
		assert_eq!(id.as_str(), "abc123");
	}
}
