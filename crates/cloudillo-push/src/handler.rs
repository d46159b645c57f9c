//! HTTP routes for push subscription management (§10.5).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cloudillo_core::extract::Auth;
use cloudillo_types::meta_adapter::PushSubscription;

use crate::prelude::*;

/// Request body for creating a push subscription, matching the browser's
/// `PushSubscription.toJSON()` shape.
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
	pub subscription: BrowserSubscription,
}

#[derive(Debug, Deserialize)]
pub struct BrowserSubscription {
	pub endpoint: String,
	pub keys: BrowserSubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct BrowserSubscriptionKeys {
	pub p256dh: String,
	pub auth: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
	pub sub_id: Box<str>,
}

/// POST /api/notification/subscription
///
/// Registers a push notification subscription for the authenticated user.
pub async fn post_subscription(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(body): Json<CreateSubscriptionRequest>,
) -> ClResult<(StatusCode, Json<SubscriptionResponse>)> {
	let sub_id: Box<str> =
		cloudillo_types::hasher::content_id("ps", body.subscription.endpoint.as_bytes());

	let subscription = PushSubscription {
		sub_id: sub_id.clone(),
		endpoint: body.subscription.endpoint.into(),
		p256dh: body.subscription.keys.p256dh.into(),
		auth: body.subscription.keys.auth.into(),
		created_at: cloudillo_types::types::Timestamp::now(),
	};

	app.meta_adapter.create_subscription(auth.tn_id, &subscription).await?;

	tracing::debug!(tn_id = %auth.tn_id.0, sub_id = %sub_id, "push subscription created");

	Ok((StatusCode::CREATED, Json(SubscriptionResponse { sub_id })))
}

/// DELETE /api/notification/subscription/{subId}
pub async fn delete_subscription(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(sub_id): Path<String>,
) -> ClResult<StatusCode> {
	app.meta_adapter.delete_subscription(auth.tn_id, &sub_id).await?;
	tracing::debug!(tn_id = %auth.tn_id.0, sub_id = %sub_id, "push subscription deleted");
	Ok(StatusCode::NO_CONTENT)
}

/// GET /api/notification/vapid-public-key
///
/// Returns the VAPID public key for this tenant, generating one on first use.
pub async fn get_vapid_public_key(
	State(app): State<App>,
	Auth(auth): Auth,
) -> ClResult<Json<serde_json::Value>> {
	let public_key = match app.auth_adapter.read_vapid_public_key(auth.tn_id).await {
		Ok(key) => key,
		Err(Error::NotFound) => {
			tracing::info!(tn_id = %auth.tn_id.0, "creating VAPID key on demand");
			app.auth_adapter.create_vapid_key(auth.tn_id).await?.public_key
		}
		Err(e) => return Err(e),
	};

	Ok(Json(serde_json::json!({ "vapidPublicKey": public_key })))
}

// vim: ts=4
