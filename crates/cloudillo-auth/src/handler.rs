//! Login/logout/password and token-issuance HTTP routes (§4.1, §6).

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::net::SocketAddr;
use std::time::Duration;

use cloudillo_core::rate_limit::{PenaltyReason, RateLimitApi};
use cloudillo_core::{Auth, IdTag, OptionalAuth};
use cloudillo_types::auth_adapter::{self, AccessToken, AuthLogin, ProxyToken};

use crate::prelude::*;

/// Response body shared by every endpoint that hands back a fresh session.
#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct Login {
	#[serde(rename = "tnId")]
	tn_id: TnId,
	#[serde(rename = "idTag")]
	id_tag: String,
	roles: Option<Vec<String>>,
	token: String,
	name: String,
	#[serde(rename = "profilePic")]
	profile_pic: Option<String>,
}

/// Builds a `Login` response from a freshly-issued session, enriching it with
/// the tenant's display profile.
pub async fn return_login(app: &App, auth: AuthLogin) -> ClResult<(StatusCode, Json<Login>)> {
	let profile = app.meta_adapter.read_profile(auth.tn_id, &auth.id_tag).await.ok();
	let (name, profile_pic) = match profile {
		Some(p) => (
			p.name.map(|n| n.to_string()).unwrap_or_else(|| auth.id_tag.to_string()),
			p.profile_pic.map(|p| p.to_string()),
		),
		None => (auth.id_tag.to_string(), None),
	};

	let login = Login {
		tn_id: auth.tn_id,
		id_tag: auth.id_tag.to_string(),
		roles: auth.roles.map(|roles| roles.iter().map(|r| r.to_string()).collect()),
		token: auth.token.to_string(),
		name,
		profile_pic,
	};

	Ok((StatusCode::OK, Json(login)))
}

/// POST /auth/login
#[derive(Debug, Deserialize)]
pub struct LoginReq {
	#[serde(rename = "idTag")]
	id_tag: String,
	password: String,
}

pub async fn post_login(
	State(app): State<App>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	Json(req): Json<LoginReq>,
) -> ClResult<(StatusCode, Json<Login>)> {
	match app.auth_adapter.check_tenant_password(&req.id_tag, &req.password).await {
		Ok(login) => return_login(&app, login).await,
		Err(_) => {
			if let Err(e) = app.rate_limiter.penalize(&addr.ip(), PenaltyReason::AuthFailure, 1) {
				warn!(error = %e, ip = %addr.ip(), "failed to record auth penalty");
			}
			tokio::time::sleep(Duration::from_secs(1)).await;
			Err(Error::Denied)
		}
	}
}

/// GET /auth/login-token - refresh a session from an existing one.
pub async fn get_login_token(
	State(app): State<App>,
	OptionalAuth(auth): OptionalAuth,
) -> ClResult<(StatusCode, Json<Option<Login>>)> {
	let Some(auth) = auth else {
		return Ok((StatusCode::OK, Json(None)));
	};

	let login = app.auth_adapter.create_tenant_login(&auth.id_tag).await?;
	let (_, Json(data)) = return_login(&app, login).await?;
	Ok((StatusCode::OK, Json(Some(data))))
}

/// POST /logout
pub async fn post_logout(Auth(auth): Auth) -> ClResult<StatusCode> {
	info!(id_tag = %auth.id_tag, "user logged out");
	Ok(StatusCode::NO_CONTENT)
}

/// POST /password - change the authenticated user's password.
#[derive(Debug, Deserialize)]
pub struct PasswordReq {
	#[serde(rename = "currentPassword")]
	current_password: String,
	#[serde(rename = "newPassword")]
	new_password: String,
}

pub async fn post_password(
	State(app): State<App>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	Auth(auth): Auth,
	Json(req): Json<PasswordReq>,
) -> ClResult<StatusCode> {
	if req.new_password.trim().len() < 8 {
		return Err(Error::BadInput("password must be at least 8 characters".into()));
	}
	if req.new_password == req.current_password {
		return Err(Error::BadInput("new password must differ from the current one".into()));
	}

	if app.auth_adapter.check_tenant_password(&auth.id_tag, &req.current_password).await.is_err() {
		if let Err(e) = app.rate_limiter.penalize(&addr.ip(), PenaltyReason::AuthFailure, 1) {
			warn!(error = %e, ip = %addr.ip(), "failed to record auth penalty");
		}
		tokio::time::sleep(Duration::from_secs(1)).await;
		return Err(Error::Denied);
	}

	app.auth_adapter.update_tenant_password(&auth.id_tag, &req.new_password).await?;
	info!(id_tag = %auth.id_tag, "password changed");
	Ok(StatusCode::NO_CONTENT)
}

/// GET /access-token - mint a browser-session access token (§4.1), either
/// scoped to the caller's own session or redeemed from a ref (glossary:
/// "consumed by getAccessTokenByRef").
#[derive(Debug, Deserialize)]
pub struct GetAccessTokenQuery {
	#[serde(rename = "resourceId")]
	resource_id: Option<String>,
	#[serde(rename = "refId")]
	ref_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenRes {
	token: String,
}

pub async fn get_access_token(
	State(app): State<App>,
	tn_id: TnId,
	IdTag(own_id_tag): IdTag,
	OptionalAuth(maybe_auth): OptionalAuth,
	Query(query): Query<GetAccessTokenQuery>,
) -> ClResult<(StatusCode, Json<AccessTokenRes>)> {
	let (subject, access, resource_id) = if let Some(ref_id) = query.ref_id {
		let ref_data =
			app.meta_adapter.get_ref(tn_id, &ref_id).await?.ok_or(Error::NotFound)?;
		if let Some(expires_at) = ref_data.expires_at {
			if expires_at.0 <= Timestamp::now().0 {
				return Err(Error::NotFound);
			}
		}
		if let Some(quota) = ref_data.quota {
			if ref_data.uses >= quota {
				return Err(Error::NotFound);
			}
		}
		app.meta_adapter.increment_ref_uses(tn_id, &ref_id).await?;
		(None, ref_data.access, Some(ref_data.resource_id.to_string()))
	} else {
		let auth = maybe_auth.ok_or(Error::AuthMissing)?;
		(Some(auth.id_tag.to_string()), auth.access, query.resource_id)
	};

	let token = app
		.auth_adapter
		.issue_access_token(
			tn_id,
			&AccessToken {
				t: &own_id_tag,
				u: subject.as_deref().unwrap_or(&own_id_tag),
				r: None,
				res: resource_id.as_deref(),
				acc: Some(access),
				sub: subject.as_deref(),
				exp: Timestamp::from_now(auth_adapter::ACCESS_TOKEN_EXPIRY),
			},
		)
		.await?;

	Ok((StatusCode::OK, Json(AccessTokenRes { token: token.to_string() })))
}

/// GET /proxy-token - mint an outbound federation capability for the
/// authenticated user, scoped to a target peer (§4.3).
#[derive(Debug, Deserialize)]
pub struct ProxyTokenQuery {
	#[serde(rename = "idTag")]
	id_tag: String,
}

pub async fn get_proxy_token(
	State(app): State<App>,
	Auth(auth): Auth,
	Query(query): Query<ProxyTokenQuery>,
) -> ClResult<(StatusCode, Json<AccessTokenRes>)> {
	let token = app
		.auth_adapter
		.issue_proxy_token(
			auth.tn_id,
			&ProxyToken { t: &auth.id_tag, u: &auth.id_tag, p: &query.id_tag, exp: Timestamp::from_now(300) },
		)
		.await?;

	Ok((StatusCode::OK, Json(AccessTokenRes { token: token.to_string() })))
}

// vim: ts=4
