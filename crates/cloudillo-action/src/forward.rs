//! Forwards a newly stored action to locally connected WebSocket clients
//! (§4.4 "publish to the MessageBus ACTION channel for live UI updates").

use serde_json::json;

use cloudillo_core::ws_broadcast::{BroadcastMessage, DeliveryResult};
use cloudillo_types::meta_adapter::ActionView;

use crate::prelude::*;

/// Outcome of a forward attempt, used by the caller to decide whether a
/// push notification is owed (§4.4 "offline handler").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
	Delivered(usize),
	RecipientOffline,
	NoLocalRecipient,
}

fn action_message(action: &ActionView) -> BroadcastMessage {
	BroadcastMessage::new(
		"ACTION",
		json!({
			"actionId": action.action_id,
			"type": action.typ,
			"subType": action.sub_typ,
			"parentId": action.parent_id,
			"rootId": action.root_id,
			"issuer": action.issuer,
			"audience": action.audience,
			"subject": action.subject,
			"createdAt": action.created_at.0,
			"status": action.status.to_string(),
		}),
		action.issuer.as_ref(),
	)
}

/// Forwards `action` to its audience's live connections on this tenant, and
/// to the issuer's own connections so other open tabs see the echo.
pub async fn forward_action(app: &App, tn_id: TnId, action: &ActionView) -> ForwardOutcome {
	let Some(recipient) = action.audience.as_deref().or(Some(action.issuer.as_ref())) else {
		return ForwardOutcome::NoLocalRecipient;
	};

	let msg = action_message(action);
	match app.broadcast.send_to_user(tn_id, recipient, msg).await {
		DeliveryResult::Delivered(n) => ForwardOutcome::Delivered(n),
		DeliveryResult::UserOffline => ForwardOutcome::RecipientOffline,
	}
}

// vim: ts=4
