//! Visibility filtering for actions.
//!
//! An action is visible to a subject if the subject is its issuer, is named
//! in its `audience`, or the action carries no audience at all (public).

use cloudillo_types::meta_adapter::ActionView;

use crate::prelude::*;

pub fn filter_actions_by_visibility(subject_id_tag: &str, actions: Vec<ActionView>) -> Vec<ActionView> {
	actions
		.into_iter()
		.filter(|action| {
			action.issuer.as_ref() == subject_id_tag
				|| action.audience.is_none()
				|| action.audience.as_deref() == Some(subject_id_tag)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn action(issuer: &str, audience: Option<&str>) -> ActionView {
		ActionView {
			action_id: "a1~x".into(),
			typ: "POST".into(),
			sub_typ: None,
			parent_id: None,
			root_id: None,
			issuer: issuer.into(),
			audience: audience.map(Into::into),
			subject: None,
			created_at: Timestamp::now(),
			expires_at: None,
			status: 'A',
		}
	}

	#[test]
	fn public_actions_pass_through_to_everyone() {
		let actions = vec![action("alice.example.com", None)];
		let visible = filter_actions_by_visibility("bob.example.com", actions);
		assert_eq!(visible.len(), 1);
	}

	#[test]
	fn direct_actions_are_hidden_from_non_audience() {
		let actions = vec![action("alice.example.com", Some("carol.example.com"))];
		let visible = filter_actions_by_visibility("bob.example.com", actions);
		assert!(visible.is_empty());
	}

	#[test]
	fn issuer_always_sees_their_own_actions() {
		let actions = vec![action("alice.example.com", Some("carol.example.com"))];
		let visible = filter_actions_by_visibility("alice.example.com", actions);
		assert_eq!(visible.len(), 1);
	}
}

// vim: ts=4
