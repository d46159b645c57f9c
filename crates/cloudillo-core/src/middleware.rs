//! Shared types for Axum permission-check middleware factories, plus the
//! tenant-resolution/auth middleware every route runs behind.

use axum::extract::State;
use axum::http::header;
use axum::{extract::Request, middleware::Next, response::Response};
use std::future::Future;
use std::pin::Pin;

use crate::app::App;
use crate::extract::{Auth, IdTag};
use cloudillo_types::extract::TnIdResolver;
use cloudillo_types::prelude::*;

pub type PermissionCheckOutput = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;

/// A function from `(App, Auth, Request, Next)` to a boxed future; the shape every
/// `axum::middleware::from_fn_with_state` permission layer in this crate produces.
pub type PermissionCheckFactory =
	Box<dyn Fn(axum::extract::State<App>, Auth, Request, axum::middleware::Next) -> PermissionCheckOutput + Send + Sync>;

/// Minimal request context a permission check needs beyond the extractors.
pub struct PermissionCheckInput {
	pub resource_type: &'static str,
	pub action: &'static str,
}

/// Derives the tenant `idTag` this request targets from the `Host` header,
/// stripping the API-subdomain prefix the webserver layer prepends for
/// tenant-scoped API traffic (`cl-o.{idTag}`).
fn host_id_tag(request: &Request) -> Option<Box<str>> {
	let host = request.headers().get(header::HOST)?.to_str().ok()?;
	let host = host.split(':').next().unwrap_or(host);
	Some(host.strip_prefix("cl-o.").unwrap_or(host).into())
}

/// Resolves the tenant from the `Host` header and, if an `Authorization:
/// Bearer` header carries a valid access token for that tenant, attaches
/// `Auth` to the request extensions. Runs ahead of every route; `Auth`'s own
/// `FromRequestParts` impl is what actually rejects unauthenticated requests
/// to protected handlers, so a missing/invalid token here is not itself an
/// error - it just means the request proceeds anonymous.
pub async fn tenant_auth(State(app): State<App>, mut request: Request, next: Next) -> Result<Response, Error> {
	let Some(id_tag) = host_id_tag(&request) else {
		return Err(Error::BadInput("missing Host header".into()));
	};
	request.extensions_mut().insert(IdTag(id_tag.clone()));

	if let Some(token) = request
		.headers()
		.get(header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
	{
		if let Ok(tn_id) = app.resolve_tn_id(&id_tag).await {
			if let Ok(ctx) = app.auth_adapter.verify_access_token(tn_id, token).await {
				request.extensions_mut().insert(Auth(ctx));
			}
		}
	}

	Ok(next.run(request).await)
}

// vim: ts=4
