//! HTTP routes for the action subsystem: local CRUD plus the federation
//! inbox (§4.2, §6).

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::net::SocketAddr;

use cloudillo_core::extract::{Auth, IdTag, OptionalAuth, OptionalRequestId};
use cloudillo_types::action_types::CreateAction;
use cloudillo_types::meta_adapter;

use crate::filter::filter_actions_by_visibility;
use crate::prelude::*;

#[derive(serde::Serialize)]
pub struct ActionListResponse {
	pub actions: Vec<meta_adapter::ActionView>,
	#[serde(rename = "reqId", skip_serializing_if = "Option::is_none")]
	pub req_id: Option<String>,
}

pub async fn list_actions(
	State(app): State<App>,
	tn_id: TnId,
	OptionalAuth(maybe_auth): OptionalAuth,
	OptionalRequestId(req_id): OptionalRequestId,
	Query(opts): Query<meta_adapter::ListActionOptions>,
) -> ClResult<Json<ActionListResponse>> {
	let subject_id_tag = maybe_auth.as_ref().map(|a| a.id_tag.as_ref()).unwrap_or("");
	let actions = app.meta_adapter.list_actions(tn_id, &opts).await?;
	let actions = filter_actions_by_visibility(subject_id_tag, actions);
	Ok(Json(ActionListResponse { actions, req_id }))
}

pub async fn post_action(
	State(app): State<App>,
	tn_id: TnId,
	IdTag(id_tag): IdTag,
	Json(request): Json<CreateAction>,
) -> ClResult<(StatusCode, Json<meta_adapter::ActionView>)> {
	let view = crate::task::create_action(&app, tn_id, &id_tag, request).await?;
	Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_action_by_id(
	State(app): State<App>,
	tn_id: TnId,
	Path(action_id): Path<String>,
) -> ClResult<Json<meta_adapter::ActionView>> {
	let action = app.meta_adapter.get_action(tn_id, &action_id).await?.ok_or(Error::NotFound)?;
	Ok(Json(action))
}

pub async fn post_action_accept(
	State(app): State<App>,
	tn_id: TnId,
	Auth(auth): Auth,
	Path(action_id): Path<String>,
) -> ClResult<StatusCode> {
	app.meta_adapter.get_action(tn_id, &action_id).await?.ok_or(Error::NotFound)?;
	app.meta_adapter.update_action_status(tn_id, &action_id, crate::status::ACCEPTED).await?;
	info!(action_id = %action_id, user = %auth.id_tag, "action accepted");
	Ok(StatusCode::OK)
}

pub async fn post_action_reject(
	State(app): State<App>,
	tn_id: TnId,
	Auth(auth): Auth,
	Path(action_id): Path<String>,
) -> ClResult<StatusCode> {
	app.meta_adapter.get_action(tn_id, &action_id).await?.ok_or(Error::NotFound)?;
	app.meta_adapter.update_action_status(tn_id, &action_id, crate::status::REJECTED).await?;
	info!(action_id = %action_id, user = %auth.id_tag, "action rejected");
	Ok(StatusCode::OK)
}

pub async fn delete_action(
	State(app): State<App>,
	tn_id: TnId,
	Auth(auth): Auth,
	Path(action_id): Path<String>,
) -> ClResult<StatusCode> {
	let action = app.meta_adapter.get_action(tn_id, &action_id).await?.ok_or(Error::NotFound)?;
	if action.issuer.as_ref() != auth.id_tag.as_ref() {
		return Err(Error::Denied);
	}
	app.meta_adapter.update_action_status(tn_id, &action_id, crate::status::DELETED).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct Inbox {
	token: Box<str>,
}

/// `POST /inbox`: accepts a signed action token from a peer instance,
/// queues it for verification off the request path, and returns
/// immediately (§4.2, §4.3).
pub async fn post_inbox(
	State(app): State<App>,
	tn_id: TnId,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	Json(inbox): Json<Inbox>,
) -> ClResult<StatusCode> {
	let remote_addr: Option<Box<str>> = Some(addr.ip().to_string().into());
	let task = crate::task::ActionVerifierTask::new(tn_id, inbox.token, remote_addr);
	app.scheduler.task(task).now().await?;
	Ok(StatusCode::ACCEPTED)
}

// vim: ts=4
