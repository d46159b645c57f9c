//! File tag management handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cloudillo_core::extract::Auth;
use cloudillo_types::types::Access;

use crate::perm;
use crate::prelude::*;

const TAG_FORBIDDEN_CHARS: &[char] = &[' ', ',', '#', '\t', '\n'];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTagsQuery {
	pub prefix: Option<String>,
}

#[derive(Serialize)]
pub struct ListTagsResponse {
	pub tags: Vec<Box<str>>,
}

/// GET /tag - every tag used across the tenant's files.
pub async fn list_tags(
	State(app): State<App>,
	Auth(auth): Auth,
	Query(q): Query<ListTagsQuery>,
) -> ClResult<Json<ListTagsResponse>> {
	let tags = app.meta_adapter.list_tags(auth.tn_id, q.prefix.as_deref()).await?;
	Ok(Json(ListTagsResponse { tags }))
}

fn validate_tag(tag: &str) -> ClResult<()> {
	if tag.is_empty() || tag.chars().any(|c| TAG_FORBIDDEN_CHARS.contains(&c)) {
		return Err(Error::BadInput(format!("'{}' is not a valid tag", tag)));
	}
	Ok(())
}

/// PUT /store/:fileId/tag/:tag - add a tag to a file. Only the file's owner,
/// or a caller holding write-scoped access, may retag it.
pub async fn put_file_tag(
	State(app): State<App>,
	Auth(auth): Auth,
	Path((file_id, tag)): Path<(String, String)>,
) -> ClResult<StatusCode> {
	validate_tag(&tag)?;
	let file = app.meta_adapter.read_file(auth.tn_id, &file_id).await?.ok_or(Error::NotFound)?;
	perm::check_access(&auth, &file, Access::Write)?;

	app.meta_adapter.add_tag(auth.tn_id, &file_id, &tag).await?;
	info!(user = %auth.id_tag, %file_id, %tag, "tag added");
	Ok(StatusCode::NO_CONTENT)
}

/// DELETE /store/:fileId/tag/:tag - remove a tag from a file.
pub async fn delete_file_tag(
	State(app): State<App>,
	Auth(auth): Auth,
	Path((file_id, tag)): Path<(String, String)>,
) -> ClResult<StatusCode> {
	let file = app.meta_adapter.read_file(auth.tn_id, &file_id).await?.ok_or(Error::NotFound)?;
	perm::check_access(&auth, &file, Access::Write)?;

	app.meta_adapter.remove_tag(auth.tn_id, &file_id, &tag).await?;
	info!(user = %auth.id_tag, %file_id, %tag, "tag removed");
	Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_tag_is_rejected() {
		assert!(validate_tag("").is_err());
	}

	#[test]
	fn tag_with_whitespace_is_rejected() {
		assert!(validate_tag("a b").is_err());
	}

	#[test]
	fn plain_tag_is_accepted() {
		assert!(validate_tag("vacation-2024").is_ok());
	}
}

// vim: ts=4
