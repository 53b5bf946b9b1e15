//! Persisted command history for the shell.
//!
//! The bridge itself never touches history; the UI glue appends each
//! submitted command and loads the list when the shell starts.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::error::Result;

/// Loaded history plus the cursor position the shell should start from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySnapshot {
	pub entries: Vec<String>,
	/// Index just past the newest entry.
	pub cursor: usize,
}

pub trait HistoryStore: Send + Sync {
	fn append(&self, text: &str) -> Result<()>;

	fn load(&self) -> Result<HistorySnapshot>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
	#[serde(default)]
	entries: Vec<String>,
}

/// History kept as a JSON document on disk.
pub struct FileHistory {
	path: PathBuf,
	max_entries: usize,
	lock: Mutex<()>,
}

impl FileHistory {
	pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
		Self {
			path: path.into(),
			max_entries,
			lock: Mutex::new(()),
		}
	}

	pub fn from_config(config: &HistoryConfig) -> Self {
		Self::new(config.path.clone(), config.max_entries)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read(&self) -> Result<HistoryFile> {
		match fs::read_to_string(&self.path) {
			Ok(content) => Ok(serde_json::from_str(&content)?),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HistoryFile::default()),
			Err(err) => Err(err.into()),
		}
	}
}

impl HistoryStore for FileHistory {
	/// Blank commands and immediate repeats are not recorded.
	fn append(&self, text: &str) -> Result<()> {
		let text = text.trim_end();
		if text.trim().is_empty() {
			return Ok(());
		}

		let _guard = self.lock.lock();
		let mut file = self.read()?;
		if file.entries.last().map(String::as_str) == Some(text) {
			return Ok(());
		}
		file.entries.push(text.to_string());
		if self.max_entries > 0 && file.entries.len() > self.max_entries {
			let excess = file.entries.len() - self.max_entries;
			file.entries.drain(..excess);
		}

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
		tracing::trace!(target: "loper::history", entries = file.entries.len(), "history appended");
		Ok(())
	}

	fn load(&self) -> Result<HistorySnapshot> {
		let _guard = self.lock.lock();
		let file = self.read()?;
		let cursor = file.entries.len();
		Ok(HistorySnapshot {
			entries: file.entries,
			cursor,
		})
	}
}
