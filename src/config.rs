//! Credentials, the workspace descriptor and workspace URL handling
//!
//! Two files feed the client: `~/.roomsyncrc.json` holds the user's
//! credentials, and a `.roomsync` descriptor in the workspace root maps
//! the directory to its workspace URL (and optionally declares hooks).
//! The core never parses anything else; CLI flags override both.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Name of the per-workspace descriptor file.
pub const DESCRIPTOR_FILE: &str = ".roomsync";

/// Default port of the workspace protocol endpoint (TLS).
pub const DEFAULT_PORT: u16 = 3448;

/// Default port of the plaintext endpoint, used only to recognize
/// `http://` workspace URLs.
pub const DEFAULT_INSECURE_PORT: u16 = 3148;

/// User credentials from `~/.roomsyncrc.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
	pub username: String,
	pub secret: String,
	#[serde(default)]
	pub default_host: Option<String>,
}

impl Credentials {
	pub fn path() -> Result<PathBuf, ConfigError> {
		let home = std::env::var("HOME")
			.map_err(|_| ConfigError::Missing { what: "HOME directory".to_string() })?;
		Ok(PathBuf::from(home).join(".roomsyncrc.json"))
	}

	pub fn load() -> Result<Credentials, ConfigError> {
		let path = Credentials::path()?;
		let contents = std::fs::read_to_string(&path).map_err(|e| {
			ConfigError::CredentialsUnavailable { path: path.display().to_string(), source: e }
		})?;
		serde_json::from_str(&contents).map_err(|e| ConfigError::ParseFailed {
			path: path.display().to_string(),
			message: e.to_string(),
		})
	}
}

/// The persisted `.roomsync` descriptor.
///
/// Unknown fields are carried through load/save so other tools can stash
/// their own data in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Descriptor {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,

	/// Glob pattern -> shell command, run when a matching path is saved
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub hooks: HashMap<String, String>,

	#[serde(flatten)]
	pub extra: HashMap<String, Value>,
}

impl Descriptor {
	/// Load the descriptor from a workspace root. A missing file yields
	/// the empty descriptor; a malformed one is an error.
	pub fn load(root: &Path) -> Result<Descriptor, ConfigError> {
		let path = root.join(DESCRIPTOR_FILE);
		let contents = match std::fs::read_to_string(&path) {
			Ok(c) => c,
			Err(_) => return Ok(Descriptor::default()),
		};
		serde_json::from_str(&contents).map_err(|e| ConfigError::ParseFailed {
			path: path.display().to_string(),
			message: e.to_string(),
		})
	}

	pub fn save(&self, root: &Path) -> std::io::Result<()> {
		let path = root.join(DESCRIPTOR_FILE);
		let contents = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
		std::fs::write(path, contents)
	}
}

/// Host/owner/workspace resolved from a workspace URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
	pub host: String,
	pub port: u16,
	pub secure: bool,
	pub owner: String,
	pub workspace: String,
}

fn valid_segment(s: &str) -> bool {
	!s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || "-@+._".contains(c))
}

/// Parse `http(s)://host[/r]/owner/workspace` into its parts.
pub fn parse_workspace_url(url: &str) -> Result<ParsedUrl, ConfigError> {
	let invalid = || ConfigError::InvalidUrl { url: url.to_string() };

	let (secure, rest) = if let Some(rest) = url.strip_prefix("https://") {
		(true, rest)
	} else if let Some(rest) = url.strip_prefix("http://") {
		(false, rest)
	} else {
		return Err(invalid());
	};

	let mut parts = rest.split('/');
	let authority = parts.next().ok_or_else(invalid)?;
	let (host, port) = match authority.split_once(':') {
		Some((host, port)) => {
			(host, port.parse::<u16>().map_err(|_| invalid())?)
		}
		None => (authority, if secure { DEFAULT_PORT } else { DEFAULT_INSECURE_PORT }),
	};
	if host.is_empty() {
		return Err(invalid());
	}

	let mut segments: Vec<&str> = parts.filter(|s| !s.is_empty()).collect();
	if segments.first() == Some(&"r") {
		segments.remove(0);
	}
	if segments.len() != 2 || !valid_segment(segments[0]) || !valid_segment(segments[1]) {
		return Err(invalid());
	}

	Ok(ParsedUrl {
		host: host.to_string(),
		port,
		secure,
		owner: segments[0].to_string(),
		workspace: segments[1].to_string(),
	})
}

/// The canonical browser-facing URL of a workspace.
pub fn workspace_url(secure: bool, host: &str, owner: &str, workspace: &str) -> String {
	let protocol = if secure { "https" } else { "http" };
	format!("{}://{}/{}/{}", protocol, host, owner, workspace)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_parse_workspace_url() {
		let parsed = parse_workspace_url("https://example.com/alice/project").unwrap();
		assert_eq!(parsed.host, "example.com");
		assert_eq!(parsed.port, DEFAULT_PORT);
		assert!(parsed.secure);
		assert_eq!(parsed.owner, "alice");
		assert_eq!(parsed.workspace, "project");
	}

	#[test]
	fn test_parse_url_with_r_prefix() {
		let parsed = parse_workspace_url("https://example.com/r/bob/notes-2").unwrap();
		assert_eq!(parsed.owner, "bob");
		assert_eq!(parsed.workspace, "notes-2");
	}

	#[test]
	fn test_parse_http_url_uses_insecure_port() {
		let parsed = parse_workspace_url("http://dev.local/o/w").unwrap();
		assert!(!parsed.secure);
		assert_eq!(parsed.port, DEFAULT_INSECURE_PORT);
	}

	#[test]
	fn test_parse_url_with_explicit_port() {
		let parsed = parse_workspace_url("https://dev.local:9443/o/w").unwrap();
		assert_eq!(parsed.port, 9443);
	}

	#[test]
	fn test_invalid_urls() {
		assert!(parse_workspace_url("example.com/a/b").is_err());
		assert!(parse_workspace_url("https://example.com/only-owner").is_err());
		assert!(parse_workspace_url("https://example.com/a/b/c/d").is_err());
		assert!(parse_workspace_url("https:///a/b").is_err());
		assert!(parse_workspace_url("https://h/bad segment/w").is_err());
	}

	#[test]
	fn test_descriptor_round_trip() {
		let tmp = TempDir::new().unwrap();
		let mut desc = Descriptor::default();
		desc.url = Some("https://example.com/alice/project".to_string());
		desc.hooks.insert("*.css".to_string(), "make minify".to_string());
		desc.save(tmp.path()).unwrap();

		let loaded = Descriptor::load(tmp.path()).unwrap();
		assert_eq!(loaded.url.as_deref(), Some("https://example.com/alice/project"));
		assert_eq!(loaded.hooks["*.css"], "make minify");
	}

	#[test]
	fn test_descriptor_preserves_unknown_fields() {
		let tmp = TempDir::new().unwrap();
		std::fs::write(
			tmp.path().join(DESCRIPTOR_FILE),
			r#"{"url":"https://h/a/b","editor":{"tabs":4}}"#,
		)
		.unwrap();

		let loaded = Descriptor::load(tmp.path()).unwrap();
		loaded.save(tmp.path()).unwrap();
		let reloaded = Descriptor::load(tmp.path()).unwrap();
		assert!(reloaded.extra.contains_key("editor"));
	}

	#[test]
	fn test_missing_descriptor_is_empty() {
		let tmp = TempDir::new().unwrap();
		let desc = Descriptor::load(tmp.path()).unwrap();
		assert!(desc.url.is_none());
		assert!(desc.hooks.is_empty());
	}

	#[test]
	fn test_workspace_url_format() {
		assert_eq!(workspace_url(true, "h.com", "o", "w"), "https://h.com/o/w");
		assert_eq!(workspace_url(false, "h.com", "o", "w"), "http://h.com/o/w");
	}
}

// vim: ts=4
