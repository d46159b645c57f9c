//! HTTP routes for reading and updating settings (`/api/settings/*`).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::app::App;
use crate::extract::Auth;
use cloudillo_types::prelude::*;

use super::types::{PermissionLevel, Setting, SettingValue};

fn caller_permission(auth: &Auth) -> PermissionLevel {
	if auth.0.roles.iter().any(|r| r.as_ref() == "admin") {
		PermissionLevel::Admin
	} else {
		PermissionLevel::User
	}
}

pub async fn get_setting(
	State(app): State<App>,
	Auth(ctx): Auth,
	Path(key): Path<String>,
) -> ClResult<Json<Setting>> {
	let setting = app.settings.get(ctx.tn_id, &key).await?;
	Ok(Json(setting))
}

pub async fn list_settings(State(app): State<App>, Auth(ctx): Auth) -> ClResult<Json<Vec<Setting>>> {
	let mut out = Vec::new();
	for def in app.settings_registry.all() {
		if def.key.ends_with(".*") {
			continue;
		}
		out.push(app.settings.get(ctx.tn_id, &def.key).await?);
	}
	Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct PutSettingBody {
	pub value: SettingValue,
}

pub async fn put_setting(
	State(app): State<App>,
	auth: Auth,
	Path(key): Path<String>,
	Json(body): Json<PutSettingBody>,
) -> ClResult<()> {
	let permission = caller_permission(&auth);
	app.settings.set(auth.0.tn_id, &key, body.value, permission).await
}

// vim: ts=4
