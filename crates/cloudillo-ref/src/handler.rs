//! HTTP routes for ref-based guest capability exchange: `/ref` (GET, POST),
//! `/ref/{refId}` (GET, DELETE) (§3, §4.5, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cloudillo_core::extract::Auth;
use cloudillo_types::meta_adapter::{CreateRefOptions, RefData};
use cloudillo_types::types::Access;

use crate::prelude::*;

#[derive(Debug, Serialize)]
pub struct RefResponse {
	#[serde(rename = "refId")]
	pub ref_id: Box<str>,
	#[serde(rename = "resourceId")]
	pub resource_id: Box<str>,
	pub access: Access,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
	#[serde(rename = "expiresAt")]
	pub expires_at: Option<Timestamp>,
	pub quota: Option<u32>,
	pub uses: u32,
}

impl From<RefData> for RefResponse {
	fn from(data: RefData) -> Self {
		Self {
			ref_id: data.ref_id,
			resource_id: data.resource_id,
			access: data.access,
			created_at: data.created_at,
			expires_at: data.expires_at,
			quota: data.quota,
			uses: data.uses,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct CreateRefRequest {
	#[serde(rename = "resourceId")]
	pub resource_id: String,
	pub access: Access,
	#[serde(rename = "expiresAt")]
	pub expires_at: Option<Timestamp>,
	pub quota: Option<u32>,
}

/// GET /ref - list refs owned by the authenticated tenant.
pub async fn list_refs(
	State(app): State<App>,
	Auth(auth): Auth,
) -> ClResult<Json<Vec<RefResponse>>> {
	let refs = app.meta_adapter.list_refs(auth.tn_id).await?;
	Ok(Json(refs.into_iter().map(RefResponse::from).collect()))
}

/// POST /ref - mint a new ref.
pub async fn create_ref(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(body): Json<CreateRefRequest>,
) -> ClResult<(StatusCode, Json<RefResponse>)> {
	if body.resource_id.is_empty() {
		return Err(Error::BadInput("resourceId is required".into()));
	}
	if let Some(expires_at) = body.expires_at {
		if expires_at.0 <= Timestamp::now().0 {
			return Err(Error::BadInput("expiresAt must be in the future".into()));
		}
	}

	let ref_id = cloudillo_types::utils::random_id()?;
	let opts = CreateRefOptions {
		resource_id: body.resource_id.into(),
		access: body.access,
		expires_at: body.expires_at,
		quota: body.quota,
	};

	let ref_data = app.meta_adapter.create_ref(auth.tn_id, &ref_id, &opts).await.map_err(|e| {
		warn!(error = %e, tn_id = %auth.tn_id.0, "failed to create ref");
		e
	})?;

	Ok((StatusCode::CREATED, Json(RefResponse::from(ref_data))))
}

/// GET /ref/{refId} - fetch a single ref's metadata.
pub async fn get_ref(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(ref_id): Path<String>,
) -> ClResult<Json<RefResponse>> {
	let ref_data = app.meta_adapter.get_ref(auth.tn_id, &ref_id).await?.ok_or(Error::NotFound)?;
	Ok(Json(RefResponse::from(ref_data)))
}

/// DELETE /ref/{refId} - revoke a ref before it expires or is fully redeemed.
pub async fn delete_ref(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(ref_id): Path<String>,
) -> ClResult<StatusCode> {
	app.meta_adapter.get_ref(auth.tn_id, &ref_id).await?.ok_or(Error::NotFound)?;
	app.meta_adapter.delete_ref(auth.tn_id, &ref_id).await.map_err(|e| {
		warn!(error = %e, tn_id = %auth.tn_id.0, ref_id = %ref_id, "failed to delete ref");
		e
	})?;
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4
