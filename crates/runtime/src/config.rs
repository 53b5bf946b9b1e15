//! Bridge configuration loaded from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frames buffered between a stream pump and its reader.
pub const DEFAULT_CHUNK_BUFFER: usize = 10;
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
	/// Capacity of the channel between a query's pump task and its reader.
	pub chunk_buffer: usize,
	pub history: HistoryConfig,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			chunk_buffer: DEFAULT_CHUNK_BUFFER,
			history: HistoryConfig::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
	pub path: PathBuf,
	/// Oldest entries are dropped beyond this count; 0 keeps everything.
	pub max_entries: usize,
}

impl Default for HistoryConfig {
	fn default() -> Self {
		Self {
			path: default_history_path(),
			max_entries: DEFAULT_HISTORY_LIMIT,
		}
	}
}

impl BridgeConfig {
	/// Loads the config at `path`. A missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let config = match fs::read_to_string(path) {
			Ok(content) => serde_json::from_str::<Self>(&content)?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
			Err(err) => return Err(err.into()),
		};
		config.validate()?;
		Ok(config)
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(path, serde_json::to_string_pretty(self)?)?;
		Ok(())
	}

	pub fn validate(&self) -> Result<()> {
		if self.chunk_buffer == 0 {
			return Err(Error::InvalidArgument("chunk_buffer must be greater than zero".to_string()));
		}
		Ok(())
	}
}

/// `$XDG_DATA_HOME/loper/history.json`, falling back to `~/.local/share`.
fn default_history_path() -> PathBuf {
	let data_home = std::env::var_os("XDG_DATA_HOME")
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
		.unwrap_or_else(|| PathBuf::from("."));
	data_home.join("loper").join("history.json")
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn missing_file_loads_defaults() {
		let tmp = TempDir::new().unwrap();
		let config = BridgeConfig::load(&tmp.path().join("absent.json")).unwrap();
		assert_eq!(config.chunk_buffer, DEFAULT_CHUNK_BUFFER);
		assert_eq!(config.history.max_entries, DEFAULT_HISTORY_LIMIT);
		assert!(config.history.path.ends_with("loper/history.json"));
	}

	#[test]
	fn partial_file_keeps_other_defaults() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("bridge.json");
		fs::write(&path, r#"{"chunk_buffer": 64}"#).unwrap();

		let config = BridgeConfig::load(&path).unwrap();
		assert_eq!(config.chunk_buffer, 64);
		assert_eq!(config.history.max_entries, DEFAULT_HISTORY_LIMIT);
	}

	#[test]
	fn zero_chunk_buffer_is_rejected() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("bridge.json");
		fs::write(&path, r#"{"chunk_buffer": 0}"#).unwrap();

		let err = BridgeConfig::load(&path).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[test]
	fn malformed_file_is_a_json_error() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("bridge.json");
		fs::write(&path, "{ nope").unwrap();

		assert!(matches!(BridgeConfig::load(&path).unwrap_err(), Error::Json(_)));
	}

	#[test]
	fn save_and_load() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("nested/bridge.json");
		let config = BridgeConfig {
			chunk_buffer: 3,
			history: HistoryConfig {
				path: tmp.path().join("history.json"),
				max_entries: 0,
			},
		};

		config.save(&path).unwrap();
		assert_eq!(BridgeConfig::load(&path).unwrap(), config);
	}
}
