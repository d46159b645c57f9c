//! File subsystem. File storage, metadata, documents, etc.

#![allow(dead_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod descriptor;
pub mod filter;
pub mod handler;
pub mod management;
pub mod perm;
pub mod preset;
pub mod settings;
pub mod tag;
pub mod variant;

mod prelude;

use prelude::*;

pub fn register_settings(
	registry: &mut cloudillo_core::settings::SettingsRegistry,
) -> ClResult<()> {
	settings::register_settings(registry)
}

/// No background tasks of its own; variant generation (resize/transcode) is
/// out of scope (§ Non-goals: rendering/transcoding of specific document
/// types) so there's nothing for the scheduler to register here.
pub fn init(_app: &App) -> ClResult<()> {
	Ok(())
}

// vim: ts=4
