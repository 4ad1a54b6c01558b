//! Patch Integrity Tests
//!
//! A generated patch applied to its original must produce content whose
//! checksum equals the one declared alongside the patch; anything less
//! must surface as an error, never as a partial result.

use roomsync::buffer::Encoding;
use roomsync::error::PatchError;
use roomsync::patch::{verify_checksum, PatchEngine};
use roomsync::util::md5_hex;

#[test]
fn test_declared_checksum_matches_applied_result() {
	let engine = PatchEngine::new();
	let cases: &[(&[u8], &[u8])] = &[
		(b"hello\n", b"hello world\n"),
		(b"", b"fresh content\n"),
		(b"line1\nline2\nline3\n", b"line1\nline3\n"),
		(b"tabs\tand spaces\n", b"tabs and\tspaces\n"),
	];

	for (old, new) in cases {
		let patch = engine.make_patch(old, new, Encoding::Utf8).unwrap();
		let declared_md5 = md5_hex(new);

		let applied = engine.apply_patch(old, &patch, Encoding::Utf8).unwrap();
		assert!(applied.clean);
		assert_eq!(md5_hex(&applied.content), declared_md5);
		assert!(verify_checksum(&applied.content, &declared_md5).is_ok());
	}
}

#[test]
fn test_binary_patch_checksum_holds() {
	let engine = PatchEngine::new();
	let old: Vec<u8> = (0..=255).collect();
	let mut new = old.clone();
	new[10] = 0xAA;
	new.extend_from_slice(&[1, 2, 3]);

	let patch = engine.make_patch(&old, &new, Encoding::Base64).unwrap();
	let applied = engine.apply_patch(&old, &patch, Encoding::Base64).unwrap();
	assert_eq!(md5_hex(&applied.content), md5_hex(&new));
}

#[test]
fn test_corrupt_patch_never_produces_content() {
	let engine = PatchEngine::new();
	let err = engine.apply_patch(b"base\n", "@@ garbage @@", Encoding::Utf8).unwrap_err();
	assert!(matches!(err, PatchError::ParseFailed { .. } | PatchError::ApplyFailed { .. }));
}

#[test]
fn test_stale_base_fails_instead_of_merging() {
	let engine = PatchEngine::new();
	let patch = engine
		.make_patch(b"alpha\nbeta\ngamma\n", b"alpha\nBETA\ngamma\n", Encoding::Utf8)
		.unwrap();

	// The base moved on; applying must fail rather than guess
	let result = engine.apply_patch(b"entirely\nunrelated\n", &patch, Encoding::Utf8);
	assert!(result.is_err());
}

#[test]
fn test_checksum_mismatch_is_reported() {
	let err = verify_checksum(b"content", "0000000000000000000000000000000000000000").unwrap_err();
	match err {
		PatchError::ChecksumMismatch { expected, actual } => {
			assert_ne!(expected, actual);
			assert_eq!(actual, md5_hex(b"content"));
		}
		other => panic!("expected checksum mismatch, got {:?}", other),
	}
}

#[test]
fn test_unsupported_backend_is_not_fatal() {
	let engine = PatchEngine::without_binary();
	let err = engine.make_patch(&[0, 1, 2], &[2, 1, 0], Encoding::Base64).unwrap_err();
	assert!(matches!(err, PatchError::CapabilityUnavailable { .. }));
}

// vim: ts=4
