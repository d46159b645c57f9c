//! HTTP routes for the file subsystem: listing, upload, download and
//! metadata/deletion (the latter two live in `management.rs`), §4.5, §6.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;

use cloudillo_core::extract::{Auth, OptionalAuth};
use cloudillo_types::auth_adapter::AuthCtx;
use cloudillo_types::blob_adapter::WriteBlobOptions;
use cloudillo_types::meta_adapter::{FileStatus, ListFileOptions};
use cloudillo_types::types::Access;

use crate::descriptor;
use crate::filter::filter_files_by_visibility;
use crate::perm;
use crate::preset;
use crate::prelude::*;
use crate::variant::Variant;

/// Uploaded bodies above this size are rejected before they're ever buffered.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(serde::Serialize)]
pub struct FileListResponse {
	pub files: Vec<cloudillo_types::meta_adapter::FileView>,
}

/// GET /store - list files visible to the caller.
pub async fn list_files(
	State(app): State<App>,
	tn_id: TnId,
	OptionalAuth(maybe_auth): OptionalAuth,
	Query(opts): Query<ListFileOptions>,
) -> ClResult<Json<FileListResponse>> {
	let subject_id_tag = maybe_auth.as_ref().map(|a| a.id_tag.as_ref()).unwrap_or("");
	let files = app.meta_adapter.list_files(tn_id, &opts).await?;
	let files = filter_files_by_visibility(subject_id_tag, files);
	Ok(Json(FileListResponse { files }))
}

/// GET /store/:fileId/meta - a single file's metadata.
pub async fn get_file_meta(
	State(app): State<App>,
	tn_id: TnId,
	OptionalAuth(maybe_auth): OptionalAuth,
	Path(file_id): Path<String>,
) -> ClResult<Json<cloudillo_types::meta_adapter::FileView>> {
	let file = app.meta_adapter.read_file(tn_id, &file_id).await?.ok_or(Error::NotFound)?;
	let auth = maybe_auth.unwrap_or_else(|| anonymous_ctx(tn_id));
	perm::check_access(&auth, &file, Access::Read)?;
	Ok(Json(file))
}

#[derive(serde::Serialize)]
pub struct UploadResponse {
	#[serde(rename = "fileId")]
	pub file_id: String,
}

/// POST /store/:preset/:fileName - upload a new file under a named preset.
///
/// The caller never chooses the file id: it's derived from the uploaded
/// bytes (§3 invariant 6), so two identical uploads collapse onto the same
/// row instead of creating duplicates.
pub async fn post_upload(
	State(app): State<App>,
	tn_id: TnId,
	Auth(auth): Auth,
	Path((preset_name, file_name)): Path<(String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> ClResult<(StatusCode, Json<UploadResponse>)> {
	if body.len() > MAX_UPLOAD_BYTES {
		return Err(Error::BadInput("upload exceeds the maximum allowed size".into()));
	}

	let preset = preset::find(&preset_name)?;
	let content_type = headers
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or("application/octet-stream");
	preset::check_content_type(preset, content_type)?;

	let mut create = descriptor::new_file(&auth.id_tag, content_type, &file_name, &body, vec![]);
	create.tags.extend(preset.default_tags.iter().map(|t| Box::<str>::from(*t)));

	app.blob_adapter
		.write_blob(
			tn_id,
			&create.file_id,
			&Variant::RAW_ORIG.to_string(),
			&body,
			WriteBlobOptions::default(),
		)
		.await?;
	app.meta_adapter.create_file(tn_id, &create).await?;

	info!(file_id = %create.file_id, user = %auth.id_tag, "file uploaded");
	Ok((StatusCode::CREATED, Json(UploadResponse { file_id: create.file_id.to_string() })))
}

async fn serve_variant(
	app: &App,
	tn_id: TnId,
	auth: &AuthCtx,
	file_id: &str,
	label: &str,
) -> ClResult<Response> {
	let file = app.meta_adapter.read_file(tn_id, file_id).await?.ok_or(Error::NotFound)?;
	if file.status == FileStatus::Deleted {
		return Err(Error::NotFound);
	}
	perm::check_access(auth, &file, Access::Read)?;

	let stream = app.blob_adapter.open_blob(tn_id, file_id, label).await?;
	let content_type = file.content_type.as_deref().unwrap_or("application/octet-stream").to_string();
	let response = Response::builder().status(StatusCode::OK).header(header::CONTENT_TYPE, content_type);
	Ok(response.body(Body::from_stream(stream))?)
}

/// GET /store/:fileId - download a file's canonical (original) content.
pub async fn get_file(
	State(app): State<App>,
	tn_id: TnId,
	Auth(auth): Auth,
	Path(file_id): Path<String>,
) -> ClResult<Response> {
	serve_variant(&app, tn_id, &auth, &file_id, &Variant::RAW_ORIG.to_string()).await
}

/// GET /store/:fileId/:label - download a specific variant (e.g. `vis.sd`).
///
/// Split from `get_file` rather than an optional path segment: axum routes
/// the two shapes to distinct handlers, not one handler with an `Option`.
pub async fn get_file_variant(
	State(app): State<App>,
	tn_id: TnId,
	Auth(auth): Auth,
	Path((file_id, label)): Path<(String, String)>,
) -> ClResult<Response> {
	serve_variant(&app, tn_id, &auth, &file_id, &label).await
}

/// Identity used to resolve ownership-only access for anonymous metadata
/// reads; carries no ref scope, so `perm::resolve_access` only ever grants
/// it anything when the file happens to have no owner restriction.
fn anonymous_ctx(tn_id: TnId) -> AuthCtx {
	AuthCtx { tn_id, id_tag: "".into(), roles: Box::new([]), resource: None, access: Access::None }
}

// vim: ts=4
