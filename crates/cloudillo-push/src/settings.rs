//! Push notification settings registration

use crate::prelude::*;
use cloudillo_core::settings::types::{
	PermissionLevel, SettingDefinition, SettingScope, SettingValue, SettingsRegistry,
};

/// Register the per-tenant notification-type toggles listed in the crate's
/// top-level documentation.
pub fn register_settings(registry: &mut SettingsRegistry) -> ClResult<()> {
	registry.register(
		SettingDefinition::builder("notify.push")
			.description("Master switch for push notifications")
			.default(SettingValue::Bool(true))
			.scope(SettingScope::Tenant)
			.permission(PermissionLevel::User)
			.build()?,
	)?;

	for (key, description) in [
		("notify.push.message", "Push notifications for direct messages"),
		("notify.push.connection", "Push notifications for connection requests"),
		("notify.push.file_share", "Push notifications for file shares"),
		("notify.push.follow", "Push notifications for new followers"),
		("notify.push.comment", "Push notifications for comments on posts"),
		("notify.push.reaction", "Push notifications for reactions to posts"),
		("notify.push.mention", "Push notifications for @mentions"),
		("notify.push.post", "Push notifications for posts from followed users"),
	] {
		registry.register(
			SettingDefinition::builder(key)
				.description(description)
				.default(SettingValue::Bool(true))
				.scope(SettingScope::Tenant)
				.permission(PermissionLevel::User)
				.build()?,
		)?;
	}

	Ok(())
}

// vim: ts=4
