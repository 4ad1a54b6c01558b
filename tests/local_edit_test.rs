//! Local Edit Flow Tests
//!
//! The change path end to end, minus the socket: a tracked file is
//! rewritten on disk, the new checksum differs, a patch transforming old
//! into new goes out, and the store commits the new content and checksum.
//! An unchanged re-observation produces nothing.

use roomsync::buffer::{Buffer, BufferStore, Encoding};
use roomsync::patch::PatchEngine;
use roomsync::util::md5_hex;
use std::fs;
use tempfile::TempDir;

/// Mirror of the watcher's change turn: compare checksums, diff, commit.
/// Returns the outbound patch, or None when the change is a self-echo.
fn observe_change(
	store: &mut BufferStore,
	engine: &PatchEngine,
	path: &str,
	current: &[u8],
) -> Option<String> {
	let buf = store.by_path(path)?;
	let (id, base, encoding) = (buf.id, buf.content.clone()?, buf.encoding);

	if md5_hex(current) == buf.md5 {
		return None;
	}

	let patch = engine.make_patch(&base, current, encoding).ok()?;
	store.update_content(id, current.to_vec());
	Some(patch)
}

#[test]
fn test_rewrite_produces_patch_and_commits() {
	let tmp = TempDir::new().unwrap();
	let file = tmp.path().join("a.txt");
	fs::write(&file, "hello").unwrap();

	let mut store = BufferStore::new();
	let engine = PatchEngine::new();
	let content = fs::read(&file).unwrap();
	let c1 = md5_hex(&content);
	store.register(Buffer::from_content(1, "a.txt".to_string(), content, Encoding::Utf8));

	fs::write(&file, "hello world").unwrap();
	let current = fs::read(&file).unwrap();
	let c2 = md5_hex(&current);
	assert_ne!(c1, c2);

	let patch = observe_change(&mut store, &engine, "a.txt", &current)
		.expect("a real edit must produce a patch");

	// The patch transforms the old revision into the new one
	let applied = engine.apply_patch(b"hello", &patch, Encoding::Utf8).unwrap();
	assert_eq!(applied.content, b"hello world");

	// The store ends at the new content and checksum
	let buf = store.by_path("a.txt").unwrap();
	assert_eq!(buf.content.as_deref(), Some(&b"hello world"[..]));
	assert_eq!(buf.md5, c2);
}

#[test]
fn test_unchanged_file_is_suppressed() {
	let mut store = BufferStore::new();
	let engine = PatchEngine::new();
	store.register(Buffer::from_content(1, "a.txt".to_string(), b"stable".to_vec(), Encoding::Utf8));
	let md5 = store.by_path("a.txt").unwrap().md5.clone();

	// Re-observing identical content (the echo of our own write) is silent
	assert!(observe_change(&mut store, &engine, "a.txt", b"stable").is_none());

	let buf = store.by_path("a.txt").unwrap();
	assert_eq!(buf.md5, md5);
	assert_eq!(buf.content.as_deref(), Some(&b"stable"[..]));
}

#[test]
fn test_pending_buffer_never_patches() {
	let mut store = BufferStore::new();
	let engine = PatchEngine::new();
	store.register(Buffer {
		id: 1,
		path: "a.txt".to_string(),
		content: None,
		md5: "whatever".to_string(),
		encoding: Encoding::Utf8,
	});

	assert!(observe_change(&mut store, &engine, "a.txt", b"anything").is_none());
}

#[test]
fn test_untracked_path_produces_nothing() {
	let mut store = BufferStore::new();
	let engine = PatchEngine::new();
	assert!(observe_change(&mut store, &engine, "missing.txt", b"content").is_none());
}

// vim: ts=4
