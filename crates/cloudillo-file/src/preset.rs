//! Named upload presets (§4.5): a preset maps a client-facing upload slot to
//! an accepted content-type class and a set of default tags, so the upload
//! route can validate content-type without the caller choosing it by hand.

use crate::prelude::*;
use crate::variant::VariantClass;

pub struct Preset {
	pub name: &'static str,
	pub class: VariantClass,
	pub default_tags: &'static [&'static str],
}

pub const PRESETS: &[Preset] = &[
	Preset { name: "avatar", class: VariantClass::Visual, default_tags: &["profile", "avatar"] },
	Preset { name: "cover", class: VariantClass::Visual, default_tags: &["profile", "cover"] },
	Preset { name: "post", class: VariantClass::Visual, default_tags: &["post"] },
	Preset { name: "video", class: VariantClass::Video, default_tags: &["post"] },
	Preset { name: "audio", class: VariantClass::Audio, default_tags: &["post"] },
	Preset { name: "doc", class: VariantClass::Document, default_tags: &["document"] },
	Preset { name: "raw", class: VariantClass::Raw, default_tags: &[] },
];

/// Looks up a preset by name, returning `Error::NotFound` for an unknown one
/// rather than silently falling back to `raw`.
pub fn find(name: &str) -> ClResult<&'static Preset> {
	PRESETS.iter().find(|p| p.name == name).ok_or(Error::NotFound)
}

/// Rejects an upload whose content-type doesn't belong to the preset's class.
/// The `raw` preset accepts anything.
pub fn check_content_type(preset: &Preset, content_type: &str) -> ClResult<()> {
	if preset.class == VariantClass::Raw {
		return Ok(());
	}
	match VariantClass::from_content_type(content_type) {
		Some(class) if class == preset.class => Ok(()),
		_ => Err(Error::BadInput(format!(
			"preset '{}' does not accept content-type '{}'",
			preset.name, content_type
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_preset_is_not_found() {
		assert!(matches!(find("bogus"), Err(Error::NotFound)));
	}

	#[test]
	fn avatar_preset_rejects_video() {
		let preset = find("avatar").unwrap();
		assert!(check_content_type(preset, "image/png").is_ok());
		assert!(check_content_type(preset, "video/mp4").is_err());
	}

	#[test]
	fn raw_preset_accepts_anything() {
		let preset = find("raw").unwrap();
		assert!(check_content_type(preset, "application/octet-stream").is_ok());
	}
}

// vim: ts=4
