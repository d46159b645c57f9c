//! Visibility filtering for file listings — mirrors the action subsystem's
//! issuer/audience rule (`cloudillo-action/src/filter.rs`), applied to file
//! ownership and status instead.

use cloudillo_types::meta_adapter::{FileStatus, FileView};

/// A deleted file never appears in a listing; a pending (not yet confirmed)
/// upload is visible only to its own owner.
pub fn filter_files_by_visibility(subject_id_tag: &str, files: Vec<FileView>) -> Vec<FileView> {
	files
		.into_iter()
		.filter(|f| match f.status {
			FileStatus::Deleted => false,
			FileStatus::Pending => f.owner_tag.as_ref() == subject_id_tag,
			FileStatus::Immutable | FileStatus::Mutable => true,
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use cloudillo_types::prelude::*;

	fn file(owner_tag: &str, status: FileStatus) -> FileView {
		FileView {
			file_id: "f1~x".into(),
			owner_tag: owner_tag.into(),
			content_type: Some("image/png".into()),
			file_name: "pic.png".into(),
			created_at: Timestamp::now(),
			status,
			file_tp: cloudillo_types::meta_adapter::FileTp::Blob,
			tags: vec![],
		}
	}

	#[test]
	fn deleted_files_are_never_visible() {
		let files = vec![file("alice.example.com", FileStatus::Deleted)];
		assert!(filter_files_by_visibility("alice.example.com", files).is_empty());
	}

	#[test]
	fn pending_files_are_visible_only_to_their_owner() {
		let files = vec![file("alice.example.com", FileStatus::Pending)];
		assert!(filter_files_by_visibility("bob.example.com", files.clone()).is_empty());
		assert_eq!(filter_files_by_visibility("alice.example.com", files).len(), 1);
	}

	#[test]
	fn immutable_files_are_visible_to_everyone() {
		let files = vec![file("alice.example.com", FileStatus::Immutable)];
		assert_eq!(filter_files_by_visibility("bob.example.com", files).len(), 1);
	}
}

// vim: ts=4
