//! Filesystem watcher: native notifications to semantic sync events
//!
//! A single recursive watch on the workspace root feeds a channel read by
//! the client's event loop. Native event kinds collapse onto four
//! semantic events; renames stay deliberately coarse because most
//! platforms cannot reliably distinguish a rename from remove+create, so
//! the client re-scans the affected directory instead of trusting pairs.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

use crate::logging::*;

/// A semantic change at one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
	Created(PathBuf),
	Changed(PathBuf),
	Removed(PathBuf),
	Renamed(PathBuf),
}

impl FsChange {
	pub fn path(&self) -> &Path {
		match self {
			FsChange::Created(p) | FsChange::Changed(p) | FsChange::Removed(p)
			| FsChange::Renamed(p) => p,
		}
	}
}

/// Map one native event onto semantic changes, one per affected path.
pub fn classify(event: &Event) -> Vec<FsChange> {
	let wrap: Option<fn(PathBuf) -> FsChange> = match event.kind {
		EventKind::Create(_) => Some(FsChange::Created),
		EventKind::Modify(ModifyKind::Name(_)) => Some(FsChange::Renamed),
		EventKind::Modify(_) => Some(FsChange::Changed),
		EventKind::Remove(_) => Some(FsChange::Removed),
		_ => None,
	};
	match wrap {
		Some(wrap) => event.paths.iter().cloned().map(wrap).collect(),
		None => Vec::new(),
	}
}

/// Holds the native watcher alive for the lifetime of the client.
pub struct DirWatcher {
	_watcher: RecommendedWatcher,
}

impl DirWatcher {
	/// Watch a workspace root recursively, delivering events into the
	/// caller's channel. The watcher thread never blocks on the receiver.
	pub fn start(root: &Path, tx: UnboundedSender<FsChange>) -> Result<DirWatcher, notify::Error> {
		let mut watcher =
			notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
				Ok(event) => {
					for change in classify(&event) {
						let _ = tx.send(change);
					}
				}
				Err(e) => warn!("Watcher error: {}", e),
			})?;
		watcher.watch(root, RecursiveMode::Recursive)?;
		info!("Watching {}", root.display());

		Ok(DirWatcher { _watcher: watcher })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

	fn event(kind: EventKind, path: &str) -> Event {
		Event::new(kind).add_path(PathBuf::from(path))
	}

	#[test]
	fn test_create_classification() {
		let changes = classify(&event(EventKind::Create(CreateKind::File), "/w/a.txt"));
		assert_eq!(changes, vec![FsChange::Created(PathBuf::from("/w/a.txt"))]);
	}

	#[test]
	fn test_data_modify_is_change() {
		let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
		let changes = classify(&event(kind, "/w/a.txt"));
		assert_eq!(changes, vec![FsChange::Changed(PathBuf::from("/w/a.txt"))]);
	}

	#[test]
	fn test_metadata_modify_is_change() {
		let kind = EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime));
		let changes = classify(&event(kind, "/w/a.txt"));
		assert_eq!(changes, vec![FsChange::Changed(PathBuf::from("/w/a.txt"))]);
	}

	#[test]
	fn test_rename_classification() {
		let kind = EventKind::Modify(ModifyKind::Name(RenameMode::From));
		let changes = classify(&event(kind, "/w/old.txt"));
		assert_eq!(changes, vec![FsChange::Renamed(PathBuf::from("/w/old.txt"))]);
	}

	#[test]
	fn test_remove_classification() {
		let changes = classify(&event(EventKind::Remove(RemoveKind::File), "/w/gone.txt"));
		assert_eq!(changes, vec![FsChange::Removed(PathBuf::from("/w/gone.txt"))]);
	}

	#[test]
	fn test_access_is_dropped() {
		let kind = EventKind::Access(notify::event::AccessKind::Read);
		assert!(classify(&event(kind, "/w/a.txt")).is_empty());
	}

	#[test]
	fn test_multi_path_event() {
		let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
		let ev = Event::new(kind)
			.add_path(PathBuf::from("/w/old.txt"))
			.add_path(PathBuf::from("/w/new.txt"));
		let changes = classify(&ev);
		assert_eq!(changes.len(), 2);
		assert!(changes.contains(&FsChange::Renamed(PathBuf::from("/w/new.txt"))));
	}
}

// vim: ts=4
