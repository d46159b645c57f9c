//! The action-type registry and the signed action-token wire format.
//!
//! Action types are a compile-time-closed tagged variant (`ActionKind`), not a
//! runtime string-keyed registry: adding a new action means adding an enum
//! variant and extending the `match` arms below, never registering a handler
//! at startup.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::types::TnId;

pub use crate::auth_adapter::ACCESS_TOKEN_EXPIRY;

/// Action lifecycle status, stored as a single character (§3 DATA MODEL).
pub mod status {
	/// New - just created or received, no hook opinion yet.
	pub const NEW: char = 'N';
	/// Candidate - a hook decided the local user must accept or reject.
	pub const CANDIDATE: char = 'C';
	/// Accepted - active/approved, the unified "good standing" state.
	pub const ACCEPTED: char = 'A';
	/// Rejected - the user (or a permanent federation failure) rejected it.
	pub const REJECTED: char = 'R';
	/// Deleted - explicit deletion or rescission (`CONN:DEL`).
	pub const DELETED: char = 'D';
}

/// Upper bound on how many follower instances a single `broadcast=true` action
/// enqueues deliveries to (§4.2 "Fan-out budget"). The remainder is logged and
/// dropped, never silently truncated.
pub const MAX_BROADCAST_FANOUT: usize = 1000;

/// How an action's idempotency key (`k`) is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGen {
	/// A fresh random slot, no collision semantics across actions of this type.
	Auto,
	/// `CONN:{iss}:{aud}` - one live connection request per ordered pair.
	ConnPair,
	/// `FLLW:{iss}:{aud}` - one live follow per ordered pair.
	FollowPair,
	/// `p:{parentId}` - keyed by parent, used by `POST` replies.
	Parent,
	/// The comment's own parent id (`p`), same derivation as `Parent` but kept
	/// distinct so `CMNT`'s key collisions read clearly in logs.
	CommentParent,
}

/// The nine action types registered by the core engine (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
	/// Content post, broadcast to followers.
	Post,
	/// Direct message, single audience.
	Msg,
	/// Connection request/rescission (`st=DEL` rescinds).
	Conn,
	/// One-way follow.
	Fllw,
	/// File share; content carries fileName/contentType.
	Fshr,
	/// References a subject action without creating a hierarchy edge.
	Repost,
	/// Subject-addressed acknowledgment of a prior action.
	Ack,
	/// Emoji-style reaction.
	React,
	/// Threaded comment, keyed by parent.
	Cmnt,
}

impl ActionKind {
	pub const ALL: [ActionKind; 9] = [
		ActionKind::Post,
		ActionKind::Msg,
		ActionKind::Conn,
		ActionKind::Fllw,
		ActionKind::Fshr,
		ActionKind::Repost,
		ActionKind::Ack,
		ActionKind::React,
		ActionKind::Cmnt,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			ActionKind::Post => "POST",
			ActionKind::Msg => "MSG",
			ActionKind::Conn => "CONN",
			ActionKind::Fllw => "FLLW",
			ActionKind::Fshr => "FSHR",
			ActionKind::Repost => "REPOST",
			ActionKind::Ack => "ACK",
			ActionKind::React => "REACT",
			ActionKind::Cmnt => "CMNT",
		}
	}

	pub fn parse(s: &str) -> Option<ActionKind> {
		// `t` on the wire may carry a subtype after a colon ("REACT:LIKE"); only
		// the part before the colon selects the ActionKind.
		let base = s.split(':').next().unwrap_or(s);
		ActionKind::ALL.into_iter().find(|k| k.as_str() == base)
	}

	/// How this type derives its idempotency key, when the creator doesn't
	/// supply one explicitly.
	pub fn key_gen(self) -> KeyGen {
		match self {
			ActionKind::Conn => KeyGen::ConnPair,
			ActionKind::Fllw => KeyGen::FollowPair,
			ActionKind::Cmnt => KeyGen::CommentParent,
			ActionKind::Post
			| ActionKind::Msg
			| ActionKind::Fshr
			| ActionKind::Repost
			| ActionKind::Ack
			| ActionKind::React => KeyGen::Auto,
		}
	}

	/// Whether an inbound action of this type is accepted before its issuer is
	/// a known/trusted profile.
	pub fn allow_unknown(self) -> bool {
		matches!(self, ActionKind::Conn | ActionKind::Fllw)
	}

	/// Whether outbound delivery fans out to every follower instead of the
	/// single `aud` target.
	pub fn broadcast(self) -> bool {
		matches!(self, ActionKind::Post)
	}
}

impl std::fmt::Display for ActionKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Centisecond-precision Unix timestamp used only for the action token's `iat`
/// claim: `floor(epoch_ms/10)/100`, i.e. seconds with two fractional digits.
/// Kept separate from the general-purpose `Timestamp` (whole seconds) so the
/// wire format's unusual precision doesn't leak into ordinary clock use.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct CentiTimestamp(pub f64);

impl CentiTimestamp {
	pub fn now() -> Self {
		let epoch_ms = std::time::SystemTime::now()
			.duration_since(std::time::SystemTime::UNIX_EPOCH)
			.unwrap_or_default()
			.as_millis() as i64;
		Self::from_epoch_ms(epoch_ms)
	}

	pub fn from_epoch_ms(epoch_ms: i64) -> Self {
		CentiTimestamp((epoch_ms / 10) as f64 / 100.0)
	}
}

impl Serialize for CentiTimestamp {
	fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_f64(self.0)
	}
}

impl<'de> Deserialize<'de> for CentiTimestamp {
	fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		Ok(CentiTimestamp(f64::deserialize(d)?))
	}
}

/// The signed action-token payload, single-letter field schema preserved
/// verbatim for wire compatibility with other implementations (§6, §9).
#[skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionTokenPayload {
	/// Issuer - idTag of the action creator.
	pub iss: Box<str>,
	/// Idempotency key.
	pub k: Box<str>,
	/// Type, optionally with a subtype suffix ("REACT:LIKE").
	pub t: Box<str>,
	/// Subtype, when not folded into `t`.
	pub st: Option<Box<str>>,
	/// Content - action-specific payload.
	pub c: Option<serde_json::Value>,
	/// Parent action id (threading).
	pub p: Option<Box<str>>,
	/// Attachments, `"flags:fileId[,fileId…]"`.
	pub a: Option<Box<str>>,
	/// Audience idTag.
	pub aud: Option<Box<str>>,
	/// Subject - action/resource id referenced without creating a hierarchy edge.
	pub sub: Option<Box<str>>,
	/// Issued-at, centisecond precision.
	pub iat: CentiTimestamp,
	/// Expiry, whole seconds.
	pub exp: Option<i64>,
	/// Signing key id (for key rotation).
	pub kid: Box<str>,
	/// Detached signature over the canonical encoding of the other fields.
	pub sig: Box<str>,
}

/// Request to create a new outbound action, as accepted by `ActionEngine::create_action`.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CreateAction {
	#[serde(rename = "type")]
	pub typ: Box<str>,
	#[serde(rename = "subType")]
	pub sub_typ: Option<Box<str>>,
	#[serde(rename = "parentId")]
	pub parent_id: Option<Box<str>>,
	#[serde(rename = "audienceTag")]
	pub audience_tag: Option<Box<str>>,
	pub content: Option<serde_json::Value>,
	pub attachments: Option<Vec<Box<str>>>,
	pub subject: Option<Box<str>>,
	#[serde(rename = "expiresAt")]
	pub expires_at: Option<i64>,
}

/// Minimal fields needed to evaluate the fan-out budget for a broadcast delivery.
#[derive(Debug, Clone)]
pub struct FanoutTarget {
	pub tn_id: TnId,
	pub follower_id_tag: Box<str>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_kind_parses_base_type_ignoring_subtype() {
		assert_eq!(ActionKind::parse("REACT:LIKE"), Some(ActionKind::React));
		assert_eq!(ActionKind::parse("POST"), Some(ActionKind::Post));
		assert_eq!(ActionKind::parse("BOGUS"), None);
	}

	#[test]
	fn only_post_broadcasts() {
		for kind in ActionKind::ALL {
			assert_eq!(kind.broadcast(), kind == ActionKind::Post);
		}
	}

	#[test]
	fn conn_and_fllw_allow_unknown_issuers() {
		assert!(ActionKind::Conn.allow_unknown());
		assert!(ActionKind::Fllw.allow_unknown());
		assert!(!ActionKind::Post.allow_unknown());
	}

	#[test]
	fn centisecond_truncation_matches_spec_formula() {
		// floor(epoch_ms/10)/100
		let ts = CentiTimestamp::from_epoch_ms(1_690_000_000_123);
		assert_eq!(ts.0, (1_690_000_000_123_i64 / 10) as f64 / 100.0);
	}
}

// vim: ts=4
