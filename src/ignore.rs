//! Hierarchical ignore-rule evaluation
//!
//! Each directory may carry rule sets loaded from the recognized ignore
//! file names. A traversal threads an explicit stack of immutable rule
//! sets from the workspace root down to the directory being visited;
//! evaluation walks the stack innermost-first and the first matching
//! pattern wins. Only a practical glob subset is supported, no negation.

use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::logging::*;

/// File names consulted for ignore rules, in evaluation order.
pub const IGNORE_FILES: &[&str] = &[".gitignore", ".hgignore", ".roomignore"];

/// Dot-prefixed names that are still synced.
pub const HIDDEN_WHITELIST: &[&str] = &[".gitignore", ".hgignore", ".roomignore", ".roomsync"];

/// Patterns written to a fresh `.roomignore` when sharing a directory.
pub const DEFAULT_IGNORES: &[&str] = &["extern", "node_modules", "tmp", "vendor"];

/// Is this name hidden from sync? (dot-prefixed and not whitelisted)
pub fn is_hidden(name: &str) -> bool {
	name.starts_with('.') && !HIDDEN_WHITELIST.contains(&name)
}

/// Write the default `.roomignore` unless one already exists.
pub fn write_default_ignore(root: &Path) -> std::io::Result<()> {
	let path = root.join(".roomignore");
	if path.exists() {
		return Ok(());
	}
	std::fs::write(&path, DEFAULT_IGNORES.join("\n"))
}

struct Pattern {
	raw: String,
	anchored: bool,
	glob: GlobMatcher,
}

/// The ignore rules of one directory, loaded from every recognized
/// ignore file present there.
pub struct IgnoreSet {
	dir: PathBuf,
	patterns: Vec<Pattern>,
}

impl IgnoreSet {
	/// Load the rule set for a directory. Unreadable files are skipped,
	/// invalid patterns are logged and dropped.
	pub fn load(dir: &Path) -> Self {
		let mut patterns = Vec::new();

		for name in IGNORE_FILES {
			let file = dir.join(name);
			let contents = match std::fs::read_to_string(&file) {
				Ok(c) => c,
				Err(_) => continue,
			};
			for line in contents.lines() {
				let line = line.trim();
				if line.is_empty() || line.starts_with('#') {
					continue;
				}
				let anchored = line.starts_with('/');
				let raw = line.trim_start_matches('/').trim_end_matches('/');
				if raw.is_empty() {
					continue;
				}
				match Glob::new(raw) {
					Ok(glob) => {
						debug!("Adding {} to ignore patterns for {}", line, dir.display());
						patterns.push(Pattern {
							raw: line.to_string(),
							anchored,
							glob: glob.compile_matcher(),
						});
					}
					Err(e) => {
						warn!("Ignoring bad pattern {} in {}: {}", line, file.display(), e);
					}
				}
			}
		}

		IgnoreSet { dir: dir.to_path_buf(), patterns }
	}

	/// Match a path against this set. `rel` is the path relative to the
	/// set's own directory. Returns the matching pattern, if any.
	fn matched(&self, rel: &Path) -> Option<&str> {
		for pattern in &self.patterns {
			if pattern.anchored {
				// Anchored patterns only match the first component below
				// this directory (which covers everything nested in it).
				if let Some(first) = rel.components().next() {
					if pattern.glob.is_match(Path::new(first.as_os_str())) {
						return Some(&pattern.raw);
					}
				}
			} else {
				// Unanchored patterns match the basename or the relative
				// path of the entry or of any ancestor below this set.
				for ancestor in rel.ancestors() {
					if ancestor.as_os_str().is_empty() {
						break;
					}
					if pattern.glob.is_match(ancestor) {
						return Some(&pattern.raw);
					}
					if let Some(name) = ancestor.file_name() {
						if pattern.glob.is_match(Path::new(name)) {
							return Some(&pattern.raw);
						}
					}
				}
			}
		}
		None
	}
}

/// An immutable stack of rule sets from the workspace root down to one
/// directory. Cloning is cheap; descending pushes one set.
#[derive(Clone)]
pub struct IgnoreChain {
	root: PathBuf,
	sets: Vec<Arc<IgnoreSet>>,
}

impl IgnoreChain {
	/// Chain holding only the workspace root's rule set.
	pub fn root(root: &Path) -> Self {
		IgnoreChain { root: root.to_path_buf(), sets: vec![Arc::new(IgnoreSet::load(root))] }
	}

	/// Extend the chain with a subdirectory's rule set.
	pub fn descend(&self, dir: &Path) -> Self {
		let mut sets = self.sets.clone();
		sets.push(Arc::new(IgnoreSet::load(dir)));
		IgnoreChain { root: self.root.clone(), sets }
	}

	/// Build the chain for an arbitrary directory below the root. Used
	/// when an event arrives for a path we are not currently traversing.
	pub fn for_path(root: &Path, dir: &Path) -> Self {
		let mut chain = IgnoreChain::root(root);
		if let Ok(rel) = dir.strip_prefix(root) {
			let mut current = root.to_path_buf();
			for comp in rel.components() {
				current.push(comp);
				chain = chain.descend(&current);
			}
		}
		chain
	}

	/// Is this absolute path excluded from sync?
	pub fn is_ignored(&self, path: &Path) -> bool {
		let rel_to_root = match path.strip_prefix(&self.root) {
			Ok(rel) => rel,
			Err(_) => return false,
		};

		for comp in rel_to_root.components() {
			let name = comp.as_os_str().to_string_lossy();
			if is_hidden(&name) {
				debug!("{} ignored: hidden component {}", path.display(), name);
				return true;
			}
		}

		for set in self.sets.iter().rev() {
			let rel = match path.strip_prefix(&set.dir) {
				Ok(rel) => rel,
				Err(_) => continue,
			};
			if rel.as_os_str().is_empty() {
				continue;
			}
			if let Some(pattern) = set.matched(rel) {
				debug!(
					"{} ignored by pattern {} in {}",
					path.display(),
					pattern,
					set.dir.display()
				);
				return true;
			}
		}

		false
	}
}


// vim: ts=4
