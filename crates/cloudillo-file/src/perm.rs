//! Access-level resolution for file resources (§4.7 capability checks).
//!
//! A file's owner always has full (`Admin`) access. Anyone else needs an
//! `AuthCtx` scoped to this exact file id (minted via a ref token, §3
//! `RefData`) carrying a sufficient access level.

use cloudillo_types::auth_adapter::AuthCtx;
use cloudillo_types::meta_adapter::FileView;
use cloudillo_types::types::Access;

use crate::prelude::*;

pub fn resolve_access(auth: &AuthCtx, file: &FileView) -> Access {
	if auth.id_tag.as_ref() == file.owner_tag.as_ref() {
		return Access::Admin;
	}
	match &auth.resource {
		Some(res) if res.as_ref() == file.file_id.as_ref() => auth.access,
		_ => Access::None,
	}
}

pub fn check_access(auth: &AuthCtx, file: &FileView, required: Access) -> ClResult<()> {
	if resolve_access(auth, file).satisfies(required) {
		Ok(())
	} else {
		Err(Error::Denied)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cloudillo_types::meta_adapter::{FileStatus, FileTp};

	fn ctx(id_tag: &str, resource: Option<&str>, access: Access) -> AuthCtx {
		AuthCtx {
			tn_id: TnId(1),
			id_tag: id_tag.into(),
			roles: Box::new([]),
			resource: resource.map(Into::into),
			access,
		}
	}

	fn file() -> FileView {
		FileView {
			file_id: "f1~x".into(),
			owner_tag: "alice.example.com".into(),
			content_type: None,
			file_name: "a.bin".into(),
			created_at: Timestamp::now(),
			status: FileStatus::Immutable,
			file_tp: FileTp::Blob,
			tags: vec![],
		}
	}

	#[test]
	fn owner_always_has_admin_access() {
		let auth = ctx("alice.example.com", None, Access::None);
		assert_eq!(resolve_access(&auth, &file()), Access::Admin);
	}

	#[test]
	fn scoped_ref_grants_its_access_level() {
		let auth = ctx("bob.example.com", Some("f1~x"), Access::Read);
		assert_eq!(resolve_access(&auth, &file()), Access::Read);
		assert!(check_access(&auth, &file(), Access::Read).is_ok());
		assert!(check_access(&auth, &file(), Access::Write).is_err());
	}

	#[test]
	fn ref_scoped_to_a_different_resource_grants_nothing() {
		let auth = ctx("bob.example.com", Some("f1~other"), Access::Admin);
		assert_eq!(resolve_access(&auth, &file()), Access::None);
	}
}

// vim: ts=4
