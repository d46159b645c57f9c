//! Shared helpers for action creation: idempotency keys and causal-chain
//! resolution (parent audience, root id).

use cloudillo_types::action_types::{ActionKind, KeyGen};
use cloudillo_types::meta_adapter::MetaAdapter;

use crate::prelude::*;

/// Idempotency key (`k`) for a new action, derived from its `KeyGen` strategy.
/// `Auto` actions get a random key - the caller is expected to supply one.
pub fn derive_key(kind: ActionKind, issuer: &str, audience: Option<&str>, parent_id: Option<&str>) -> Option<Box<str>> {
	match kind.key_gen() {
		KeyGen::Auto => None,
		KeyGen::ConnPair => Some(format!("CONN:{}:{}", issuer, audience.unwrap_or_default()).into()),
		KeyGen::FollowPair => Some(format!("FLLW:{}:{}", issuer, audience.unwrap_or_default()).into()),
		KeyGen::Parent | KeyGen::CommentParent => {
			parent_id.map(|p| format!("p:{}", p).into())
		}
	}
}

/// Audience inherited from the parent action, for threaded replies that
/// don't specify one explicitly (MSG within a thread, CMNT on a shared POST).
///
/// Falls back to the parent's issuer so the reply still routes somewhere.
pub async fn resolve_parent_audience<M: MetaAdapter + ?Sized>(
	meta_adapter: &M,
	tn_id: TnId,
	parent_id: Option<&str>,
) -> Option<Box<str>> {
	let parent_id = parent_id?;
	let parent = meta_adapter.get_action(tn_id, parent_id).await.ok()??;
	parent.audience.or(Some(parent.issuer))
}

/// Root id of the thread a new action under `parent_id` belongs to (§4.2
/// causal closure): the parent's own root if it has one, else the parent
/// itself.
pub async fn resolve_root_id<M: MetaAdapter + ?Sized>(
	meta_adapter: &M,
	tn_id: TnId,
	parent_id: Option<&str>,
) -> Option<Box<str>> {
	let parent_id = parent_id?;
	let parent = meta_adapter.get_action(tn_id, parent_id).await.ok()??;
	parent.root_id.or_else(|| Some(parent_id.into()))
}

/// Audience to deliver/display under, defaulting to the issuer for
/// self-directed actions (e.g. a POST with no audience).
pub fn effective_audience<'a>(audience: Option<&'a str>, issuer: &'a str) -> &'a str {
	audience.unwrap_or(issuer)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auto_keygen_actions_get_no_derived_key() {
		assert_eq!(derive_key(ActionKind::Post, "alice", None, None), None);
	}

	#[test]
	fn conn_key_pairs_issuer_and_audience() {
		assert_eq!(
			derive_key(ActionKind::Conn, "alice", Some("bob"), None),
			Some("CONN:alice:bob".into())
		);
	}

	#[test]
	fn fllw_key_pairs_issuer_and_audience() {
		assert_eq!(
			derive_key(ActionKind::Fllw, "alice", Some("bob"), None),
			Some("FLLW:alice:bob".into())
		);
	}

	#[test]
	fn cmnt_key_is_derived_from_parent() {
		assert_eq!(derive_key(ActionKind::Cmnt, "alice", None, Some("p1")), Some("p:p1".into()));
	}

	#[test]
	fn effective_audience_falls_back_to_issuer() {
		assert_eq!(effective_audience(None, "alice"), "alice");
		assert_eq!(effective_audience(Some("bob"), "alice"), "bob");
	}
}

// vim: ts=4
