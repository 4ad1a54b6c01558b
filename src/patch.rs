//! Patch engine: diff creation and application
//!
//! Text buffers diff to unified-patch text. Binary buffers go through an
//! injected [`BinaryDiff`] backend; wiring in [`UnsupportedDiff`] turns
//! every binary diff into a capability-unavailable error, which callers
//! log and skip rather than treat as fatal.
//!
//! Applying is strict: hunks either apply exactly or the whole operation
//! fails, so a successful apply is always clean. Callers must still
//! verify the result checksum against the peer-declared one and treat a
//! mismatch like a failed apply (re-fetch, commit nothing).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use diffy::Patch;

use crate::buffer::Encoding;
use crate::error::PatchError;
use crate::util::md5_hex;

/// Diff backend capable of binary input.
pub trait BinaryDiff {
	/// Can this backend produce and apply binary patches at all?
	fn available(&self) -> bool;

	fn make(&self, old: &[u8], new: &[u8]) -> Result<String, PatchError>;

	fn apply(&self, base: &[u8], patch: &str) -> Result<Vec<u8>, PatchError>;
}

/// Byte-level backend: unified patch over raw bytes, base64-wrapped so it
/// survives the JSON wire format.
pub struct ByteDiff;

impl BinaryDiff for ByteDiff {
	fn available(&self) -> bool {
		true
	}

	fn make(&self, old: &[u8], new: &[u8]) -> Result<String, PatchError> {
		let patch = diffy::create_patch_bytes(old, new);
		Ok(BASE64.encode(patch.to_bytes()))
	}

	fn apply(&self, base: &[u8], patch: &str) -> Result<Vec<u8>, PatchError> {
		let raw = BASE64
			.decode(patch)
			.map_err(|e| PatchError::ParseFailed { message: e.to_string() })?;
		let patch = Patch::from_bytes(&raw)
			.map_err(|e| PatchError::ParseFailed { message: e.to_string() })?;
		if patch.hunks().is_empty() {
			return Ok(base.to_vec());
		}
		diffy::apply_bytes(base, &patch)
			.map_err(|e| PatchError::ApplyFailed { message: e.to_string() })
	}
}

/// Explicit no-op backend for builds without binary diff support.
pub struct UnsupportedDiff;

impl BinaryDiff for UnsupportedDiff {
	fn available(&self) -> bool {
		false
	}

	fn make(&self, _old: &[u8], _new: &[u8]) -> Result<String, PatchError> {
		Err(PatchError::CapabilityUnavailable { what: "binary diff".to_string() })
	}

	fn apply(&self, _base: &[u8], _patch: &str) -> Result<Vec<u8>, PatchError> {
		Err(PatchError::CapabilityUnavailable { what: "binary diff".to_string() })
	}
}

/// Result of a successful patch application.
#[derive(Debug)]
pub struct Applied {
	pub content: Vec<u8>,
	/// True when every hunk applied without fallback matching. The strict
	/// backends used here never fall back, so any `Ok` is clean.
	pub clean: bool,
}

/// Diff creation and application for both encodings.
pub struct PatchEngine {
	binary: Box<dyn BinaryDiff + Send>,
}

impl PatchEngine {
	/// Engine with full binary support.
	pub fn new() -> PatchEngine {
		PatchEngine { binary: Box::new(ByteDiff) }
	}

	/// Engine that refuses binary patches.
	pub fn without_binary() -> PatchEngine {
		PatchEngine { binary: Box::new(UnsupportedDiff) }
	}

	pub fn binary_available(&self) -> bool {
		self.binary.available()
	}

	/// Serialize the difference between two content revisions.
	pub fn make_patch(
		&self,
		old: &[u8],
		new: &[u8],
		encoding: Encoding,
	) -> Result<String, PatchError> {
		match encoding {
			Encoding::Utf8 => {
				let old = String::from_utf8_lossy(old);
				let new = String::from_utf8_lossy(new);
				Ok(diffy::create_patch(&old, &new).to_string())
			}
			Encoding::Base64 => self.binary.make(old, new),
		}
	}

	/// Apply a serialized patch to a base revision. An empty patch is a
	/// successful no-op.
	pub fn apply_patch(
		&self,
		base: &[u8],
		patch_text: &str,
		encoding: Encoding,
	) -> Result<Applied, PatchError> {
		if patch_text.is_empty() {
			return Ok(Applied { content: base.to_vec(), clean: true });
		}
		match encoding {
			Encoding::Utf8 => {
				let patch = Patch::from_str(patch_text)
					.map_err(|e| PatchError::ParseFailed { message: e.to_string() })?;
				if patch.hunks().is_empty() {
					return Ok(Applied { content: base.to_vec(), clean: true });
				}
				let base = String::from_utf8_lossy(base);
				let applied = diffy::apply(&base, &patch)
					.map_err(|e| PatchError::ApplyFailed { message: e.to_string() })?;
				Ok(Applied { content: applied.into_bytes(), clean: true })
			}
			Encoding::Base64 => {
				let content = self.binary.apply(base, patch_text)?;
				Ok(Applied { content, clean: true })
			}
		}
	}
}

impl Default for PatchEngine {
	fn default() -> Self {
		PatchEngine::new()
	}
}

/// Compare a result's checksum with the peer-declared one.
pub fn verify_checksum(content: &[u8], declared: &str) -> Result<(), PatchError> {
	let actual = md5_hex(content);
	if actual == declared {
		Ok(())
	} else {
		Err(PatchError::ChecksumMismatch { expected: declared.to_string(), actual })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_text_patch_round_trip() {
		let engine = PatchEngine::new();
		let old = b"hello\nworld\n";
		let new = b"hello\nbrave new world\n";

		let patch = engine.make_patch(old, new, Encoding::Utf8).unwrap();
		let applied = engine.apply_patch(old, &patch, Encoding::Utf8).unwrap();

		assert!(applied.clean);
		assert_eq!(applied.content, new);
		assert!(verify_checksum(&applied.content, &md5_hex(new)).is_ok());
	}

	#[test]
	fn test_binary_patch_round_trip() {
		let engine = PatchEngine::new();
		let old = [0u8, 1, 2, 3, 255, 254, b'\n'];
		let new = [0u8, 9, 9, 3, 255, 254, b'\n'];

		let patch = engine.make_patch(&old, &new, Encoding::Base64).unwrap();
		let applied = engine.apply_patch(&old, &patch, Encoding::Base64).unwrap();

		assert_eq!(applied.content, new);
		assert!(verify_checksum(&applied.content, &md5_hex(&new)).is_ok());
	}

	#[test]
	fn test_empty_patch_is_noop() {
		let engine = PatchEngine::new();
		let applied = engine.apply_patch(b"unchanged\n", "", Encoding::Utf8).unwrap();
		assert!(applied.clean);
		assert_eq!(applied.content, b"unchanged\n");
	}

	#[test]
	fn test_garbage_patch_is_parse_error() {
		let engine = PatchEngine::new();
		let err = engine.apply_patch(b"base\n", "not a patch at all", Encoding::Utf8).unwrap_err();
		assert!(matches!(err, PatchError::ParseFailed { .. }));
	}

	#[test]
	fn test_mismatched_base_fails_apply() {
		let engine = PatchEngine::new();
		let patch = engine.make_patch(b"one\ntwo\nthree\n", b"one\nTWO\nthree\n", Encoding::Utf8).unwrap();

		let err = engine
			.apply_patch(b"completely\ndifferent\ncontent\n", &patch, Encoding::Utf8)
			.unwrap_err();
		assert!(matches!(err, PatchError::ApplyFailed { .. }));
	}

	#[test]
	fn test_unsupported_binary_backend() {
		let engine = PatchEngine::without_binary();
		assert!(!engine.binary_available());

		let err = engine.make_patch(&[0, 1], &[1, 0], Encoding::Base64).unwrap_err();
		assert!(matches!(err, PatchError::CapabilityUnavailable { .. }));

		// Text patches keep working without the binary backend
		assert!(engine.make_patch(b"a\n", b"b\n", Encoding::Utf8).is_ok());
	}

	#[test]
	fn test_checksum_verification() {
		assert!(verify_checksum(b"hello", &md5_hex(b"hello")).is_ok());
		let err = verify_checksum(b"hello", &md5_hex(b"other")).unwrap_err();
		assert!(matches!(err, PatchError::ChecksumMismatch { .. }));
	}
}

// vim: ts=4
