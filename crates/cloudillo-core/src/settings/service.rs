//! Runtime settings access: resolves a key through the frozen schema and a
//! per-tenant override store, backed by `AuthStore::read_var`/`update_var`
//! (the same per-tenant key-value slot the auth adapter already exposes).

use std::sync::Arc;

use cloudillo_types::auth_adapter::AuthStore;
use cloudillo_types::prelude::*;

use super::types::{FrozenSettingsRegistry, PermissionLevel, Setting, SettingValue};

/// Global-scope settings have no tenant; they're stored under this
/// reserved id so they still fit the per-tenant `read_var`/`update_var` slot.
const GLOBAL_TN_ID: TnId = TnId(0);

const VAR_PREFIX: &str = "setting:";

pub struct SettingsService {
	registry: Arc<FrozenSettingsRegistry>,
	auth_adapter: Arc<dyn AuthStore>,
}

impl SettingsService {
	pub fn new(registry: Arc<FrozenSettingsRegistry>, auth_adapter: Arc<dyn AuthStore>) -> Self {
		Self { registry, auth_adapter }
	}

	/// Resolves `key` for `tn_id`: stored override if present, else the
	/// definition's default. Errors if no definition covers the key.
	pub async fn get(&self, tn_id: TnId, key: &str) -> ClResult<Setting> {
		let def = self
			.registry
			.lookup(key)
			.ok_or_else(|| Error::BadInput(format!("unknown setting '{}'", key)))?;
		let storage_tn = if def.scope == super::types::SettingScope::Global { GLOBAL_TN_ID } else { tn_id };

		let var = format!("{}{}", VAR_PREFIX, key);
		let value = match self.auth_adapter.read_var(storage_tn, &var).await {
			Ok(raw) => {
				let template = def.default.clone().unwrap_or(SettingValue::String(Box::default()));
				SettingValue::decode(&raw, &template)
			}
			Err(Error::NotFound) => def
				.default
				.clone()
				.ok_or_else(|| Error::NotFound)?,
			Err(e) => return Err(e),
		};

		Ok(Setting { key: key.into(), value, scope: def.scope })
	}

	/// Writes an override for `key`, enforcing the definition's scope and
	/// minimum permission level against the caller's.
	pub async fn set(
		&self,
		tn_id: TnId,
		key: &str,
		value: SettingValue,
		caller_permission: PermissionLevel,
	) -> ClResult<()> {
		let def = self
			.registry
			.lookup(key)
			.ok_or_else(|| Error::BadInput(format!("unknown setting '{}'", key)))?;
		if caller_permission < def.permission {
			return Err(Error::Denied);
		}
		let storage_tn = if def.scope == super::types::SettingScope::Global { GLOBAL_TN_ID } else { tn_id };
		let var = format!("{}{}", VAR_PREFIX, key);
		self.auth_adapter.update_var(storage_tn, &var, &value.encode()).await
	}

	pub fn registry(&self) -> &FrozenSettingsRegistry {
		&self.registry
	}
}

// vim: ts=4
