//! Internal helper for minting refs from other crates (e.g. invite/share
//! flows) without going through the HTTP layer.

use crate::prelude::*;
use cloudillo_types::meta_adapter::{CreateRefOptions, RefData};
use cloudillo_types::types::{Access, Timestamp};
use cloudillo_types::utils;

/// Parameters for creating a ref internally.
pub struct CreateRefInternalParams<'a> {
	/// The id_tag for constructing the resulting URL.
	pub id_tag: &'a str,
	/// Resource the ref grants access to (opaque to this crate).
	pub resource_id: &'a str,
	/// Access level granted by redeeming the ref.
	pub access: Access,
	/// Optional expiration timestamp.
	pub expires_at: Option<Timestamp>,
	/// Maximum number of redemptions (`None` = unlimited).
	pub quota: Option<u32>,
}

/// Creates a ref programmatically and returns its id and the shareable URL.
pub async fn create_ref_internal(
	app: &App,
	tn_id: TnId,
	params: CreateRefInternalParams<'_>,
) -> ClResult<(Box<str>, String)> {
	let ref_id: Box<str> = utils::random_id()?.into();

	let opts = CreateRefOptions {
		resource_id: params.resource_id.into(),
		access: params.access,
		expires_at: params.expires_at,
		quota: params.quota,
	};

	let ref_data: RefData = app.meta_adapter.create_ref(tn_id, &ref_id, &opts).await.map_err(|e| {
		warn!(error = %e, tn_id = ?tn_id, "failed to create ref");
		e
	})?;

	let url = format!("https://{}/ref/{}", params.id_tag, ref_data.ref_id);

	info!(tn_id = ?tn_id, ref_id = %ref_data.ref_id, url = %url, "created ref");

	Ok((ref_data.ref_id, url))
}

// vim: ts=4
