//! Settings registry types: the static schema (`SettingsRegistry`) every
//! crate's `register_settings()` builds up at startup, frozen once bootstrap
//! completes so request handlers only ever read it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use cloudillo_types::prelude::*;

/// Whether a setting applies to the whole server or is per-tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingScope {
	Global,
	Tenant,
}

/// Minimum caller privilege required to change a setting. `User` settings
/// are changeable by the tenant owner; `Admin` settings require a server
/// admin role regardless of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionLevel {
	User,
	Admin,
}

/// A typed setting value. Stored overrides are serialized to a string via
/// [`SettingValue::encode`]/[`SettingValue::decode`] so the persistence layer
/// (`AuthStore::read_var`/`update_var`) doesn't need to know about this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
	Bool(bool),
	Int(i64),
	String(Box<str>),
}

impl SettingValue {
	pub fn encode(&self) -> Box<str> {
		match self {
			Self::Bool(b) => if *b { "1" } else { "0" }.into(),
			Self::Int(i) => i.to_string().into(),
			Self::String(s) => s.clone(),
		}
	}

	/// Decodes a stored string back into the shape of `template` (the
	/// definition's default), so type information survives the round trip
	/// through string-only storage.
	pub fn decode(raw: &str, template: &SettingValue) -> SettingValue {
		match template {
			Self::Bool(_) => Self::Bool(raw == "1" || raw.eq_ignore_ascii_case("true")),
			Self::Int(_) => Self::Int(raw.parse().unwrap_or_default()),
			Self::String(_) => Self::String(raw.into()),
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}
}

/// A registered setting's schema: key, default, and who may change it.
/// `key` may end in `.*` to match any suffix (e.g. `ui.*` covers arbitrary
/// client-defined UI preferences without a per-key definition).
#[derive(Debug, Clone)]
pub struct SettingDefinition {
	pub key: Box<str>,
	pub description: Box<str>,
	pub default: Option<SettingValue>,
	pub scope: SettingScope,
	pub permission: PermissionLevel,
	/// Wildcard definitions have no single default; callers must supply a
	/// value on first write.
	pub optional: bool,
}

impl SettingDefinition {
	pub fn builder(key: impl Into<Box<str>>) -> SettingDefinitionBuilder {
		SettingDefinitionBuilder {
			key: key.into(),
			description: Box::default(),
			default: None,
			scope: SettingScope::Tenant,
			permission: PermissionLevel::User,
			optional: false,
		}
	}

	/// True if `key` is covered by this definition (exact match, or prefix
	/// match for a `prefix.*` wildcard definition).
	pub fn matches(&self, key: &str) -> bool {
		match self.key.strip_suffix(".*") {
			Some(prefix) => key.starts_with(prefix) && key.as_bytes().get(prefix.len()) == Some(&b'.'),
			None => self.key.as_ref() == key,
		}
	}
}

pub struct SettingDefinitionBuilder {
	key: Box<str>,
	description: Box<str>,
	default: Option<SettingValue>,
	scope: SettingScope,
	permission: PermissionLevel,
	optional: bool,
}

impl SettingDefinitionBuilder {
	pub fn description(mut self, description: impl Into<Box<str>>) -> Self {
		self.description = description.into();
		self
	}

	pub fn default(mut self, value: SettingValue) -> Self {
		self.default = Some(value);
		self
	}

	pub fn scope(mut self, scope: SettingScope) -> Self {
		self.scope = scope;
		self
	}

	pub fn permission(mut self, permission: PermissionLevel) -> Self {
		self.permission = permission;
		self
	}

	pub fn optional(mut self, optional: bool) -> Self {
		self.optional = optional;
		self
	}

	pub fn build(self) -> ClResult<SettingDefinition> {
		if self.default.is_none() && !self.optional {
			return Err(Error::Internal(format!(
				"setting '{}' needs a default or must be marked optional()",
				self.key
			)));
		}
		Ok(SettingDefinition {
			key: self.key,
			description: self.description,
			default: self.default,
			scope: self.scope,
			permission: self.permission,
			optional: self.optional,
		})
	}
}

/// A resolved setting, as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct Setting {
	pub key: Box<str>,
	pub value: SettingValue,
	pub scope: SettingScope,
}

/// The mutable registry every crate's `register_settings()` populates
/// during bootstrap. Frozen into a [`FrozenSettingsRegistry`] afterwards.
#[derive(Debug, Default)]
pub struct SettingsRegistry {
	definitions: HashMap<Box<str>, SettingDefinition>,
}

impl SettingsRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, definition: SettingDefinition) -> ClResult<()> {
		if self.definitions.contains_key(&definition.key) {
			return Err(Error::Internal(format!("setting '{}' already registered", definition.key)));
		}
		self.definitions.insert(definition.key.clone(), definition);
		Ok(())
	}

	pub fn freeze(self) -> FrozenSettingsRegistry {
		FrozenSettingsRegistry { definitions: self.definitions }
	}
}

/// Read-only view of the settings schema, shared across the running server.
#[derive(Debug)]
pub struct FrozenSettingsRegistry {
	definitions: HashMap<Box<str>, SettingDefinition>,
}

impl FrozenSettingsRegistry {
	/// Looks up the definition governing `key`: an exact match first, then
	/// the longest matching `prefix.*` wildcard.
	pub fn lookup(&self, key: &str) -> Option<&SettingDefinition> {
		if let Some(exact) = self.definitions.get(key) {
			return Some(exact);
		}
		self.definitions
			.values()
			.filter(|d| d.key.ends_with(".*") && d.matches(key))
			.max_by_key(|d| d.key.len())
	}

	pub fn all(&self) -> impl Iterator<Item = &SettingDefinition> {
		self.definitions.values()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_definition_matches_any_suffix() {
		let def = SettingDefinition::builder("ui.*").optional(true).build().unwrap();
		assert!(def.matches("ui.theme"));
		assert!(!def.matches("uiwidget"));
		assert!(!def.matches("app.theme"));
	}

	#[test]
	fn build_requires_default_unless_optional() {
		assert!(SettingDefinition::builder("x").build().is_err());
		assert!(SettingDefinition::builder("x").optional(true).build().is_ok());
		assert!(SettingDefinition::builder("x").default(SettingValue::Bool(true)).build().is_ok());
	}

	#[test]
	fn frozen_registry_prefers_exact_match_over_wildcard() {
		let mut registry = SettingsRegistry::new();
		registry.register(SettingDefinition::builder("ui.*").optional(true).build().unwrap()).unwrap();
		registry
			.register(
				SettingDefinition::builder("ui.theme")
					.default(SettingValue::String("dark".into()))
					.build()
					.unwrap(),
			)
			.unwrap();
		let frozen = registry.freeze();
		assert_eq!(frozen.lookup("ui.theme").unwrap().key.as_ref(), "ui.theme");
		assert_eq!(frozen.lookup("ui.font").unwrap().key.as_ref(), "ui.*");
	}

	#[test]
	fn value_round_trips_through_string_encoding() {
		let v = SettingValue::Int(42);
		assert_eq!(SettingValue::decode(&v.encode(), &v), v);
	}
}

// vim: ts=4
