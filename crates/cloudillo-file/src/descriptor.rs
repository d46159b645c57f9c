//! File-id derivation (§3 invariant 6: `fileId == hash(bytes)` for a file's
//! canonical variant).

use cloudillo_types::hasher::{content_id, verify_content_id};
use cloudillo_types::meta_adapter::{CreateFile, FileTp};

/// Derives a file's canonical id from its original bytes.
pub fn derive_file_id(bytes: &[u8]) -> Box<str> {
	content_id("f", bytes)
}

/// True if `bytes` actually hashes to `file_id`'s trailing digest. Used to
/// reject an upload whose announced id disagrees with its content.
pub fn verify_file_id(file_id: &str, bytes: &[u8]) -> bool {
	verify_content_id(file_id, bytes)
}

/// Builds the metadata row for a freshly uploaded file.
pub fn new_file(
	owner_tag: &str,
	content_type: &str,
	file_name: &str,
	bytes: &[u8],
	tags: Vec<Box<str>>,
) -> CreateFile {
	CreateFile {
		file_id: derive_file_id(bytes),
		owner_tag: owner_tag.into(),
		content_type: content_type.into(),
		file_name: file_name.into(),
		file_tp: Some(FileTp::Blob),
		tags,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn derived_id_round_trips_through_verify() {
		let bytes = b"hello cloudillo";
		let id = derive_file_id(bytes);
		assert!(verify_file_id(&id, bytes));
		assert!(!verify_file_id(&id, b"tampered"));
	}

	#[test]
	fn same_bytes_always_derive_the_same_id() {
		assert_eq!(derive_file_id(b"abc"), derive_file_id(b"abc"));
	}
}

// vim: ts=4
