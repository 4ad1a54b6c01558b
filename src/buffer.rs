//! In-memory record of every tracked file
//!
//! A `Buffer` mirrors one synced file; the `BufferStore` indexes all of
//! them by server-assigned id and by workspace-relative path. Content and
//! checksum are only ever updated together.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::util::{is_binary, md5_hex};

/// Wire-level content encoding of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
	/// Text content, transferred verbatim
	Utf8,
	/// Binary content, transferred base64-encoded
	Base64,
}

impl Encoding {
	/// Classify content with the binary-detection heuristic.
	pub fn detect(content: &[u8]) -> Encoding {
		if is_binary(content) {
			Encoding::Base64
		} else {
			Encoding::Utf8
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Encoding::Utf8 => "utf8",
			Encoding::Base64 => "base64",
		}
	}
}

impl std::fmt::Display for Encoding {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One synced file.
///
/// `content` is `None` while the buffer is pending: the server told us it
/// exists but we have not fetched (or no longer trust) its content. A
/// pending buffer never produces outbound patches.
#[derive(Debug, Clone)]
pub struct Buffer {
	pub id: u64,
	/// Slash-normalized path relative to the workspace root
	pub path: String,
	pub content: Option<Vec<u8>>,
	/// MD5 of `content` when present, otherwise the last server-declared MD5
	pub md5: String,
	pub encoding: Encoding,
}

impl Buffer {
	/// Build a buffer from known-good local content.
	pub fn from_content(id: u64, path: String, content: Vec<u8>, encoding: Encoding) -> Buffer {
		let md5 = md5_hex(&content);
		Buffer { id, path, content: Some(content), md5, encoding }
	}

	/// Content has not been fetched yet (or was discarded as divergent).
	pub fn pending(&self) -> bool {
		self.content.is_none()
	}
}

/// All known buffers, indexed by id and by path.
#[derive(Default)]
pub struct BufferStore {
	by_id: HashMap<u64, Buffer>,
	ids_by_path: HashMap<String, u64>,
}

impl BufferStore {
	pub fn new() -> BufferStore {
		BufferStore::default()
	}

	/// Track a buffer. A previous buffer under the same id or path is
	/// replaced, keeping the id<->path mapping unique in both directions.
	pub fn register(&mut self, buf: Buffer) {
		if let Some(old) = self.by_id.remove(&buf.id) {
			self.ids_by_path.remove(&old.path);
		}
		if let Some(old_id) = self.ids_by_path.remove(&buf.path) {
			self.by_id.remove(&old_id);
		}
		self.ids_by_path.insert(buf.path.clone(), buf.id);
		self.by_id.insert(buf.id, buf);
	}

	/// Replace a buffer's content, recomputing its checksum in the same
	/// step so no inconsistent state is ever observable.
	pub fn update_content(&mut self, id: u64, content: Vec<u8>) -> bool {
		match self.by_id.get_mut(&id) {
			Some(buf) => {
				buf.md5 = md5_hex(&content);
				buf.content = Some(content);
				true
			}
			None => false,
		}
	}

	pub fn remove(&mut self, id: u64) -> Option<Buffer> {
		let buf = self.by_id.remove(&id)?;
		self.ids_by_path.remove(&buf.path);
		Some(buf)
	}

	/// Remap a buffer to a new path, preserving its id and content.
	pub fn rename(&mut self, old_path: &str, new_path: &str) -> Option<u64> {
		let id = self.ids_by_path.remove(old_path)?;
		self.ids_by_path.insert(new_path.to_string(), id);
		if let Some(buf) = self.by_id.get_mut(&id) {
			buf.path = new_path.to_string();
		}
		Some(id)
	}

	pub fn get(&self, id: u64) -> Option<&Buffer> {
		self.by_id.get(&id)
	}

	pub fn get_mut(&mut self, id: u64) -> Option<&mut Buffer> {
		self.by_id.get_mut(&id)
	}

	pub fn by_path(&self, path: &str) -> Option<&Buffer> {
		self.ids_by_path.get(path).and_then(|id| self.by_id.get(id))
	}

	pub fn contains_path(&self, path: &str) -> bool {
		self.ids_by_path.contains_key(path)
	}

	/// Ids of every buffer at or below a directory prefix. Used to
	/// cascade a directory deletion to the files nested beneath it.
	pub fn ids_under(&self, dir: &str) -> Vec<u64> {
		let prefix = format!("{}/", dir.trim_end_matches('/'));
		self.ids_by_path
			.iter()
			.filter(|(path, _)| path.as_str() == dir || path.starts_with(&prefix))
			.map(|(_, id)| *id)
			.collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
		self.by_id.values()
	}

	pub fn clear(&mut self) {
		self.by_id.clear();
		self.ids_by_path.clear();
	}

	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}
}


// vim: ts=4
