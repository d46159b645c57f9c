//! File management (PATCH, DELETE) handlers.

use axum::{extract::{Path, State}, Json};
use serde::Serialize;

use crate::prelude::*;
use cloudillo_core::extract::Auth;
use cloudillo_types::meta_adapter::UpdateFileOptions;

#[derive(Serialize)]
pub struct PatchFileResponse {
	#[serde(rename = "fileId")]
	pub file_id: String,
}

/// PATCH /file/:fileId - rename, retag, or retype a file's content-type.
pub async fn patch_file(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(file_id): Path<String>,
	Json(opts): Json<UpdateFileOptions>,
) -> ClResult<Json<PatchFileResponse>> {
	app.meta_adapter.update_file_data(auth.tn_id, &file_id, &opts).await?;
	info!("user {} patched file {}", auth.id_tag, file_id);
	Ok(Json(PatchFileResponse { file_id }))
}

#[derive(Serialize)]
pub struct DeleteFileResponse {
	#[serde(rename = "fileId")]
	pub file_id: String,
}

/// DELETE /file/:fileId - permanently remove file metadata and its blob variants.
pub async fn delete_file(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(file_id): Path<String>,
) -> ClResult<Json<DeleteFileResponse>> {
	app.meta_adapter.read_file(auth.tn_id, &file_id).await?.ok_or(Error::NotFound)?;

	let variants = app.meta_adapter.list_file_variants(auth.tn_id, &file_id).await?;
	for variant in &variants {
		app.blob_adapter.delete_blob(auth.tn_id, &file_id, &variant.variant).await?;
	}
	app.meta_adapter.delete_file(auth.tn_id, &file_id).await?;

	info!("user {} deleted file {}", auth.id_tag, file_id);
	Ok(Json(DeleteFileResponse { file_id }))
}

// vim: ts=4
