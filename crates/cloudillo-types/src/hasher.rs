//! Content-addressing helpers shared by `BlobStore` and the action engine.
//!
//! Files are addressed by the SHA-256 of their canonical bytes (§3 invariant 6);
//! actions are addressed by the SHA-256 of their signed token (§3, `actionId`).

use sha2::{Digest, Sha256};

/// Hashes `bytes` and returns the lowercase hex digest.
pub fn hash_hex(bytes: &[u8]) -> Box<str> {
	let digest = Sha256::digest(bytes);
	hex_encode(&digest).into()
}

/// Hashes `bytes` and prefixes the digest so the id carries its entity kind on
/// the wire (`f1~...` for files, `a1~...` for actions), matching the format
/// actions and file ids are documented with (§3).
pub fn content_id(prefix: &str, bytes: &[u8]) -> Box<str> {
	format!("{prefix}~{}", hash_hex(bytes)).into()
}

/// Verifies that `bytes` hashes to the id's trailing digest, regardless of prefix.
pub fn verify_content_id(id: &str, bytes: &[u8]) -> bool {
	let digest = id.rsplit('~').next().unwrap_or(id);
	digest == &*hash_hex(bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
	use std::fmt::Write;
	let mut s = String::with_capacity(bytes.len() * 2);
	for b in bytes {
		let _ = write!(s, "{b:02x}");
	}
	s
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn content_id_round_trips_through_verification() {
		let bytes = b"hello cloudillo";
		let id = content_id("f1", bytes);
		assert!(id.starts_with("f1~"));
		assert!(verify_content_id(&id, bytes));
		assert!(!verify_content_id(&id, b"tampered"));
	}

	#[test]
	fn same_bytes_hash_identically() {
		assert_eq!(hash_hex(b"abc"), hash_hex(b"abc"));
		assert_ne!(hash_hex(b"abc"), hash_hex(b"abd"));
	}
}

// vim: ts=4
