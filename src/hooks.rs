//! Saved-file hooks
//!
//! The workspace descriptor may declare a map of glob pattern to shell
//! command. When the server reports a buffer as saved, every matching
//! hook runs with the saved path substituted for the placeholder token.
//! A save of the descriptor itself reloads the hook table first.

use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Descriptor, DESCRIPTOR_FILE};
use crate::logging::*;

/// Token replaced with the saved path in hook commands.
pub const HOOK_PATH_TOKEN: &str = "#HOOK_FILE";

struct Hook {
	pattern: String,
	matcher: GlobMatcher,
	command: String,
	/// One run at a time per hook; overlapping saves are dropped.
	running: Arc<AtomicBool>,
}

/// The hook table of one workspace.
pub struct Hooks {
	root: PathBuf,
	hooks: Vec<Hook>,
}

impl Hooks {
	/// Load hooks from the workspace descriptor. Invalid globs are
	/// logged and skipped.
	pub fn load(root: &Path) -> Hooks {
		let mut hooks = Hooks { root: root.to_path_buf(), hooks: Vec::new() };
		hooks.reload();
		hooks
	}

	pub fn reload(&mut self) {
		self.hooks.clear();

		let descriptor = match Descriptor::load(&self.root) {
			Ok(d) => d,
			Err(e) => {
				warn!("Cannot load hooks: {}", e);
				return;
			}
		};
		if descriptor.hooks.is_empty() {
			debug!("No hooks in {}", DESCRIPTOR_FILE);
			return;
		}

		for (pattern, command) in descriptor.hooks {
			match Glob::new(&pattern) {
				Ok(glob) => {
					info!("Installing hook: {} -> {}", pattern, command);
					self.hooks.push(Hook {
						pattern,
						matcher: glob.compile_matcher(),
						command,
						running: Arc::new(AtomicBool::new(false)),
					});
				}
				Err(e) => warn!("Ignoring hook with bad pattern {}: {}", pattern, e),
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.hooks.is_empty()
	}

	/// Commands whose pattern matches a workspace-relative path. Patterns
	/// without a separator also match against the basename.
	fn matching(&self, rel_path: &str) -> Vec<(String, Arc<AtomicBool>)> {
		let basename = Path::new(rel_path)
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_default();

		self.hooks
			.iter()
			.filter(|hook| {
				hook.matcher.is_match(rel_path)
					|| (!hook.pattern.contains('/') && hook.matcher.is_match(&basename))
			})
			.map(|hook| (hook.command.replace(HOOK_PATH_TOKEN, rel_path), hook.running.clone()))
			.collect()
	}

	/// A buffer was saved on the server: reload on descriptor changes,
	/// then spawn every matching command.
	pub fn on_saved(&mut self, rel_path: &str) {
		if rel_path == DESCRIPTOR_FILE {
			info!("Descriptor saved, reloading hooks");
			self.reload();
		}

		for (command, running) in self.matching(rel_path) {
			if running.swap(true, Ordering::SeqCst) {
				debug!("Hook already running, skipping: {}", command);
				continue;
			}
			info!("Running hook: {}", command);
			let root = self.root.clone();
			tokio::spawn(async move {
				let result = tokio::process::Command::new("sh")
					.arg("-c")
					.arg(&command)
					.current_dir(&root)
					.output()
					.await;
				match result {
					Ok(output) => {
						if !output.stdout.is_empty() {
							info!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
						}
						if !output.stderr.is_empty() {
							error!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
						}
					}
					Err(e) => error!("Hook failed to start: {}", e),
				}
				running.store(false, Ordering::SeqCst);
			});
		}
	}
}


// vim: ts=4
