//! Action creation and inbound verification (§4.2): builds, signs, stores,
//! forwards and federates a new action; verifies and ingests one arriving
//! at `/inbox`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use cloudillo_core::scheduler::{RetryPolicy, Task, TaskId};
use cloudillo_types::action_types::{
	ActionKind, ActionTokenPayload, CentiTimestamp, CreateAction, MAX_BROADCAST_FANOUT,
};
use cloudillo_types::hasher::content_id;
use cloudillo_types::meta_adapter::{self, ListProfileOptions, ProfileStatus};

use crate::delivery::ActionDeliveryTask;
use crate::helpers;
use crate::prelude::*;

/// Creates, signs, stores and forwards a new action on behalf of `issuer`
/// (§4.2 steps 1-6). Idempotent on the action's derived key: a repeat call
/// with the same `(kind, issuer, audience[, parent])` returns the existing
/// action instead of minting a duplicate.
pub async fn create_action(
	app: &App,
	tn_id: TnId,
	issuer: &str,
	request: CreateAction,
) -> ClResult<meta_adapter::ActionView> {
	let kind = ActionKind::parse(&request.typ)
		.ok_or_else(|| Error::BadInput(format!("unknown action type '{}'", request.typ)))?;

	let audience = match request.audience_tag.clone() {
		Some(a) => Some(a),
		None => helpers::resolve_parent_audience(app.meta_adapter.as_ref(), tn_id, request.parent_id.as_deref())
			.await,
	};
	let root_id =
		helpers::resolve_root_id(app.meta_adapter.as_ref(), tn_id, request.parent_id.as_deref()).await;

	let key = helpers::derive_key(kind, issuer, audience.as_deref(), request.parent_id.as_deref());

	if let Some(ref key) = key {
		if let Some(existing) = app.meta_adapter.get_action_by_key(tn_id, key).await? {
			if let Some(view) = app.meta_adapter.get_action(tn_id, existing.action_id.as_ref()).await? {
				return Ok(view);
			}
		}
	}

	let unsigned = ActionTokenPayload {
		iss: issuer.into(),
		k: key.clone().unwrap_or_else(|| cloudillo_types::utils::random_id().unwrap_or_default().into()),
		t: kind.as_str().into(),
		st: request.sub_typ.clone(),
		c: request.content.clone(),
		p: request.parent_id.clone(),
		a: root_id.clone(),
		aud: audience.clone(),
		sub: request.subject.clone(),
		iat: CentiTimestamp::now(),
		exp: request.expires_at,
		// Filled in by the adapter, which holds the signing key (§4.2 wire format).
		kid: "".into(),
		sig: "".into(),
	};

	let token = app.auth_adapter.sign_action_token(tn_id, &unsigned).await?;
	let action_id = content_id("a", token.as_bytes());

	let stored = meta_adapter::Action {
		action_id: action_id.as_ref(),
		typ: kind,
		sub_typ: request.sub_typ.as_deref(),
		issuer_tag: issuer,
		parent_id: request.parent_id.as_deref(),
		root_id: root_id.as_deref(),
		audience_tag: audience.as_deref(),
		subject: request.subject.as_deref(),
		token: token.as_ref(),
		status: crate::status::NEW,
		created_at: Timestamp::now(),
		expires_at: request.expires_at.map(Timestamp),
	};
	app.meta_adapter.create_action(tn_id, &stored, key.as_deref()).await?;

	let view = app
		.meta_adapter
		.get_action(tn_id, action_id.as_ref())
		.await?
		.ok_or_else(|| Error::Internal("action vanished immediately after creation".into()))?;

	crate::forward::forward_action(app, tn_id, &view).await;
	schedule_delivery(app, tn_id, issuer, &view).await?;

	Ok(view)
}

/// Schedules federation delivery for a freshly created action (§4.2 step 6,
/// §4.4 fan-out). `Post` actions with no explicit audience broadcast to
/// every follower, bounded by `MAX_BROADCAST_FANOUT`; everything else goes
/// to its single audience, if remote.
async fn schedule_delivery(
	app: &App,
	tn_id: TnId,
	issuer: &str,
	action: &meta_adapter::ActionView,
) -> ClResult<()> {
	let targets: Vec<Box<str>> = if action.typ.as_ref() == ActionKind::Post.as_str() && action.audience.is_none() {
		let followers = app
			.meta_adapter
			.list_profiles(tn_id, &ListProfileOptions { status: Some(&[ProfileStatus::Follower]), ..Default::default() })
			.await?;
		if followers.len() > MAX_BROADCAST_FANOUT {
			warn!(
				action_id = %action.action_id,
				total = followers.len(),
				cap = MAX_BROADCAST_FANOUT,
				"broadcast fanout exceeds cap, dropping excess followers"
			);
		}
		followers.into_iter().take(MAX_BROADCAST_FANOUT).map(|p| p.id_tag).collect()
	} else {
		match &action.audience {
			Some(aud) if aud.as_ref() != issuer => vec![aud.clone()],
			_ => Vec::new(),
		}
	};

	for target in targets {
		let task = ActionDeliveryTask::new(tn_id, action.action_id.clone(), target.clone(), target);
		app.scheduler.task(task).with_retry(RetryPolicy::default()).now().await?;
	}
	Ok(())
}

/// Verifies a raw action token arriving at `/inbox` and, if it checks out,
/// stores it locally (§4.2 steps 1-5: signature, freshness, issuer trust,
/// idempotent store, causal-chain fields).
pub async fn ingest_remote_action(
	app: &App,
	tn_id: TnId,
	token: &str,
	remote_addr: Option<IpAddr>,
) -> ClResult<()> {
	let payload = crate::verify_action_token(app, tn_id, token, remote_addr.as_ref()).await?;

	let kind = ActionKind::parse(&payload.t)
		.ok_or_else(|| Error::BadInput(format!("unknown action type '{}'", payload.t)))?;

	if !kind.allow_unknown() {
		let known = app.meta_adapter.read_profile(tn_id, &payload.iss).await.is_ok();
		if !known {
			return Err(Error::Denied);
		}
	}

	let action_id = content_id("a", token.as_bytes());
	if app.meta_adapter.get_action(tn_id, action_id.as_ref()).await?.is_some() {
		return Ok(()); // already ingested, idempotent
	}

	let key = helpers::derive_key(kind, &payload.iss, payload.aud.as_deref(), payload.p.as_deref());
	let stored = meta_adapter::Action {
		action_id: action_id.as_ref(),
		typ: kind,
		sub_typ: payload.st.as_deref(),
		issuer_tag: payload.iss.as_ref(),
		parent_id: payload.p.as_deref(),
		root_id: payload.a.as_deref(),
		audience_tag: payload.aud.as_deref(),
		subject: payload.sub.as_deref(),
		token,
		status: crate::status::NEW,
		created_at: Timestamp::now(),
		expires_at: payload.exp.map(Timestamp),
	};
	app.meta_adapter.create_action(tn_id, &stored, key.as_deref()).await?;

	if let Some(view) = app.meta_adapter.get_action(tn_id, action_id.as_ref()).await? {
		crate::forward::forward_action(app, tn_id, &view).await;
	}

	Ok(())
}

/// Scheduler wrapper around [`create_action`], for callers that want
/// retry-safe, queued creation instead of an inline synchronous call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionCreatorTask {
	tn_id: TnId,
	issuer: Box<str>,
	request: CreateAction,
}

impl ActionCreatorTask {
	pub fn new(tn_id: TnId, issuer: Box<str>, request: CreateAction) -> Arc<Self> {
		Arc::new(Self { tn_id, issuer, request })
	}
}

#[async_trait]
impl Task<App> for ActionCreatorTask {
	fn kind() -> &'static str {
		"action.create"
	}

	fn kind_of(&self) -> &'static str {
		Self::kind()
	}

	fn build(_id: TaskId, ctx: &str) -> ClResult<Arc<dyn Task<App>>> {
		let task: ActionCreatorTask = serde_json::from_str(ctx)?;
		Ok(Arc::new(task))
	}

	fn serialize(&self) -> String {
		serde_json::to_string(self).unwrap_or_else(|e| {
			error!("failed to serialize ActionCreatorTask: {}", e);
			"{}".to_string()
		})
	}

	async fn run(&self, app: &App) -> ClResult<()> {
		create_action(app, self.tn_id, &self.issuer, self.request.clone()).await?;
		Ok(())
	}
}

/// Scheduler wrapper around [`ingest_remote_action`], used so the `/inbox`
/// handler can return immediately and let verification (which may need a
/// live federation key fetch) happen off the request path.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionVerifierTask {
	tn_id: TnId,
	token: Box<str>,
	remote_addr: Option<Box<str>>,
}

impl ActionVerifierTask {
	pub fn new(tn_id: TnId, token: Box<str>, remote_addr: Option<Box<str>>) -> Arc<Self> {
		Arc::new(Self { tn_id, token, remote_addr })
	}
}

#[async_trait]
impl Task<App> for ActionVerifierTask {
	fn kind() -> &'static str {
		"action.verify"
	}

	fn kind_of(&self) -> &'static str {
		Self::kind()
	}

	fn build(_id: TaskId, ctx: &str) -> ClResult<Arc<dyn Task<App>>> {
		let task: ActionVerifierTask = serde_json::from_str(ctx)?;
		Ok(Arc::new(task))
	}

	fn serialize(&self) -> String {
		serde_json::to_string(self).unwrap_or_else(|e| {
			error!("failed to serialize ActionVerifierTask: {}", e);
			"{}".to_string()
		})
	}

	async fn run(&self, app: &App) -> ClResult<()> {
		let remote_addr = self.remote_addr.as_deref().and_then(|a| IpAddr::from_str(a).ok());
		ingest_remote_action(app, self.tn_id, &self.token, remote_addr).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn broadcast_fanout_cap_matches_spec_constant() {
		assert_eq!(MAX_BROADCAST_FANOUT, 1000);
	}
}

// vim: ts=4
