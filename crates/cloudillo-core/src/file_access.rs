//! File access level helpers.
//!
//! Determines a caller's `Access` to a file from two sources: ownership
//! (owner always has `Write`), or an `FSHR` action the owner issued to the
//! caller (`WRITE` subtype grants `Write`, anything else grants `Read`).
//! Resource-scoped tokens are matched by the caller against `AuthCtx.resource`
//! before this helper runs; it only adjudicates ownership and shares.

use crate::prelude::*;
use cloudillo_types::meta_adapter::FileView;
use cloudillo_types::types::Access;

pub struct FileAccessResult {
	pub file_view: FileView,
	pub access: Access,
}

pub enum FileAccessError {
	NotFound,
	AccessDenied,
	Internal(String),
}

pub struct FileAccessCtx<'a> {
	pub user_id_tag: &'a str,
}

/// Access level for `user_id_tag` on a file owned by `owner_id_tag`.
pub async fn get_access_level(app: &App, tn_id: TnId, file_id: &str, owner_id_tag: &str, ctx: &FileAccessCtx<'_>) -> Access {
	if ctx.user_id_tag == owner_id_tag {
		return Access::Write;
	}

	let action_key = format!("FSHR:{}:{}", file_id, ctx.user_id_tag);
	match app.meta_adapter.get_action_by_key(tn_id, &action_key).await {
		Ok(Some(action)) if matches!(action.typ, cloudillo_types::action_types::ActionKind::Fshr) => {
			if action.sub_typ.as_deref() == Some("WRITE") { Access::Write } else { Access::Read }
		}
		_ => Access::None,
	}
}

/// Loads a file and checks `ctx`'s access to it, for WebSocket and HTTP handlers alike.
pub async fn check_file_access(
	app: &App,
	tn_id: TnId,
	file_id: &str,
	ctx: &FileAccessCtx<'_>,
) -> Result<FileAccessResult, FileAccessError> {
	let file_view = match app.meta_adapter.read_file(tn_id, file_id).await {
		Ok(Some(f)) => f,
		Ok(None) => return Err(FileAccessError::NotFound),
		Err(e) => return Err(FileAccessError::Internal(e.to_string())),
	};

	let access = get_access_level(app, tn_id, file_id, &file_view.owner_tag, ctx).await;
	if access == Access::None {
		return Err(FileAccessError::AccessDenied);
	}

	Ok(FileAccessResult { file_view, access })
}

// vim: ts=4
